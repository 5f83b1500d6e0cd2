use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserSummary;

pub const MAX_MESSAGE_CONTENT_LEN: usize = 4000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub name: String,
}

/// A message as sent to clients, with the sender resolved to a summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub thread_id: i64,
    pub sender: UserSummary,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
}

/// Per-recipient read marker for a single message. Distinct from the
/// participant-level `last_read_at` cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub message_id: i64,
    pub user_id: i64,
    pub read_at: Option<DateTime<Utc>>,
}
