use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;

fn harden_secret_file_permissions(path: &str) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/stride.db?mode=rwc".into(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,
}

fn default_jwt_expiry() -> u64 {
    86_400
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: generate_random_hex(64),
            jwt_expiry_seconds: default_jwt_expiry(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Global switch for the email fallback. Per-user preferences are
    /// applied after this.
    #[serde(default = "default_true")]
    pub email_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            email_enabled: true,
        }
    }
}

/// Generate a commented config file template with the given values filled in.
fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# Stride Server Configuration
# Generated automatically on first run. Edit as needed.

[server]
bind_address = "{bind_address}"

[database]
url = "{db_url}"
max_connections = {max_connections}

[auth]
jwt_secret = "{jwt_secret}"
jwt_expiry_seconds = {jwt_expiry}

[notifications]
# Global switch for the email fallback; user preferences still apply.
email_enabled = {email_enabled}
"#,
        bind_address = config.server.bind_address,
        db_url = config.database.url,
        max_connections = config.database.max_connections,
        jwt_secret = config.auth.jwt_secret,
        jwt_expiry = config.auth.jwt_expiry_seconds,
        email_enabled = config.notifications.email_enabled,
    )
}

fn looks_like_placeholder_secret(secret: &str) -> bool {
    let lowered = secret.to_ascii_lowercase();
    ["changeme", "change-me", "secret", "placeholder", "example"]
        .iter()
        .any(|needle| lowered.contains(needle))
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("Config file not found at '{}', generating defaults...", path);
            let config = Config::default();

            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }

            let template = generate_config_template(&config);
            fs::write(path, &template)?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };
        let _ = harden_secret_file_permissions(path);

        // Environment variable overrides
        if let Ok(value) = std::env::var("STRIDE_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("STRIDE_DATABASE_URL") {
            config.database.url = value;
        }
        if let Ok(value) = std::env::var("STRIDE_DATABASE_MAX_CONNECTIONS") {
            if let Ok(parsed) = value.parse::<u32>() {
                config.database.max_connections = parsed;
            }
        }
        if let Ok(value) = std::env::var("STRIDE_JWT_SECRET") {
            config.auth.jwt_secret = value;
        }
        if let Ok(value) = std::env::var("STRIDE_JWT_EXPIRY_SECONDS") {
            if let Ok(parsed) = value.parse::<u64>() {
                config.auth.jwt_expiry_seconds = parsed;
            }
        }
        if let Ok(value) = std::env::var("STRIDE_EMAIL_NOTIFICATIONS_ENABLED") {
            if let Ok(parsed) = value.parse::<bool>() {
                config.notifications.email_enabled = parsed;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let jwt_secret = self.auth.jwt_secret.trim();
        if jwt_secret.len() < 32 || looks_like_placeholder_secret(jwt_secret) {
            anyhow::bail!(
                "Invalid auth.jwt_secret: use a strong random secret (at least 32 characters) and never leave placeholder values"
            );
        }
        Ok(())
    }
}

fn generate_random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..16u8);
            char::from(if idx < 10 { b'0' + idx } else { b'a' + idx - 10 })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_template_parses_back() {
        let config = Config::default();
        let template = generate_config_template(&config);
        let parsed: Config = toml::from_str(&template).expect("template should be valid toml");
        assert_eq!(parsed.server.bind_address, config.server.bind_address);
        assert_eq!(parsed.auth.jwt_secret, config.auth.jwt_secret);
        assert_eq!(parsed.database.max_connections, 10);
        assert!(parsed.notifications.email_enabled);
    }

    #[test]
    fn default_secret_is_strong_enough() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.auth.jwt_secret.len(), 64);
    }

    #[test]
    fn placeholder_secrets_are_rejected() {
        let mut config = Config::default();
        config.auth.jwt_secret = "please-change-me-please-change-me-please".into();
        assert!(config.validate().is_err());
    }
}
