use crate::error::CoreError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use stride_models::user::{Identity, Role};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub name: String,
    pub roles: Vec<Role>,
    pub exp: usize,
    pub iat: usize,
}

pub fn create_token(
    identity: &Identity,
    secret: &str,
    expiry_secs: u64,
) -> Result<String, CoreError> {
    let now = chrono::Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: identity.id,
        email: identity.email.clone(),
        name: identity.name.clone(),
        roles: identity.roles.clone(),
        iat: now,
        exp: now + expiry_secs as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| CoreError::Integrity(format!("token encoding failed: {e}")))
}

/// Session verifier: validates a bearer credential and produces the bound
/// identity. Pure; rejects missing, malformed and expired tokens alike.
pub fn verify_token(token: &str, secret: &str) -> Result<Identity, CoreError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(CoreError::Unauthenticated);
    }
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| Identity {
        id: data.claims.sub,
        email: data.claims.email,
        name: data.claims.name,
        roles: data.claims.roles,
    })
    .map_err(|_| CoreError::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            id: 42,
            email: "coach@example.com".into(),
            name: "Coach".into(),
            roles: vec![Role::Trainer],
        }
    }

    #[test]
    fn round_trip_preserves_identity() {
        let token = create_token(&identity(), "secret", 3600).unwrap();
        let verified = verify_token(&token, "secret").unwrap();
        assert_eq!(verified.id, 42);
        assert_eq!(verified.email, "coach@example.com");
        assert!(verified.has_role(Role::Trainer));
    }

    #[test]
    fn rejects_wrong_secret_and_empty_token() {
        let token = create_token(&identity(), "secret", 3600).unwrap();
        assert!(matches!(
            verify_token(&token, "other"),
            Err(CoreError::Unauthenticated)
        ));
        assert!(matches!(
            verify_token("  ", "secret"),
            Err(CoreError::Unauthenticated)
        ));
    }

    #[test]
    fn rejects_expired_token() {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: 1,
            email: "x@example.com".into(),
            name: "X".into(),
            roles: vec![Role::Client],
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(matches!(
            verify_token(&token, "secret"),
            Err(CoreError::Unauthenticated)
        ));
    }
}
