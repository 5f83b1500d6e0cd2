pub mod auth;
pub mod error;
pub mod events;
pub mod ids;
pub mod mailer;
pub mod messaging;
pub mod notify;

pub use error::CoreError;

use events::EventBus;
use mailer::EmailQueue;
use std::sync::Arc;
use stride_db::DbPool;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub email_notifications_enabled: bool,
}

/// Shared handle threaded through every request handler and gateway
/// session.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub event_bus: EventBus,
    pub mailer: EmailQueue,
    pub config: Arc<AppConfig>,
    pub shutdown: Arc<Notify>,
}

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Normalizes pagination inputs into `(page, per_page, offset)`.
pub(crate) fn page_window(page: Option<u32>, per_page: Option<u32>) -> (u32, u32, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = (page as i64 - 1) * per_page as i64;
    (page, per_page, offset)
}

/// Records an audit entry without blocking the caller. Audit failures are
/// logged and swallowed.
pub(crate) fn audit(
    state: &AppState,
    user_id: i64,
    action: &'static str,
    entity: &'static str,
    entity_id: Option<i64>,
) {
    let db = state.db.clone();
    tokio::spawn(async move {
        if let Err(err) = stride_db::audit_log::record(
            &db,
            ids::generate(),
            user_id,
            action,
            Some(entity),
            entity_id,
            None,
        )
        .await
        {
            tracing::warn!(error = %err, action, "audit record failed");
        }
    });
}
