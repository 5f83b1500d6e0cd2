use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::user::UserSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Owner,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user: UserSummary,
    pub role: ParticipantRole,
    pub last_read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub participants: Vec<Participant>,
}

/// Full thread view returned by `get_thread`: participants plus a bounded
/// window of the most recent messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadDetail {
    #[serde(flatten)]
    pub thread: Thread,
    pub messages: Vec<Message>,
}

/// One row of the thread list, annotated for inbox rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadListItem {
    #[serde(flatten)]
    pub thread: Thread,
    pub last_message: Option<Message>,
    pub unread: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadPage {
    pub items: Vec<ThreadListItem>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}
