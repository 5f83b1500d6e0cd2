use serde::{Deserialize, Serialize};

// Server -> client event names (wire contract).
pub const EVENT_MESSAGE_NEW: &str = "message:new";
pub const EVENT_NOTIFICATION_NEW: &str = "notification:new";
pub const EVENT_AUTH_ERROR: &str = "auth:error";

// Client -> server event names.
pub const CLIENT_AUTH: &str = "auth";
pub const CLIENT_AUTH_REFRESH: &str = "auth:refresh";
pub const CLIENT_MESSAGE_SEND: &str = "message:send";
pub const CLIENT_THREAD_READ: &str = "thread:read";
pub const CLIENT_NOTIFICATION_READ: &str = "notification:read";
pub const CLIENT_PING: &str = "ping";

/// Every frame on the gateway, both directions. Client-invokable events
/// are acknowledged with `event = "<name>:ack"` carrying the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Client-chosen correlation id echoed back on the ack frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl GatewayFrame {
    pub fn event(event: &str, data: serde_json::Value) -> Self {
        Self {
            event: event.to_string(),
            data: Some(data),
            id: None,
        }
    }

    pub fn ack(event: &str, id: Option<u64>, data: serde_json::Value) -> Self {
        Self {
            event: format!("{event}:ack"),
            data: Some(data),
            id,
        }
    }
}
