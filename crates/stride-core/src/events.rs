use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub event: String,
    pub payload: serde_json::Value,
    /// When set, only deliver this event to the specified user ids. `None`
    /// means every connected session (system-wide broadcast).
    pub target_user_ids: Option<Vec<i64>>,
}

impl ServerEvent {
    pub fn is_for(&self, user_id: i64) -> bool {
        match &self.target_user_ids {
            Some(targets) => targets.contains(&user_id),
            None => true,
        }
    }
}

/// Broadcast-based event bus for realtime fan-out. In-process and
/// best-effort by design: the store is the source of truth, and publishing
/// with no live receivers is a documented no-op.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: ServerEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn dispatch_to_user(&self, user_id: i64, event: &str, payload: serde_json::Value) {
        self.publish(ServerEvent {
            event: event.to_string(),
            payload,
            target_user_ids: Some(vec![user_id]),
        });
    }

    pub fn dispatch_to_users(&self, user_ids: Vec<i64>, event: &str, payload: serde_json::Value) {
        self.publish(ServerEvent {
            event: event.to_string(),
            payload,
            target_user_ids: Some(user_ids),
        });
    }

    pub fn broadcast_all(&self, event: &str, payload: serde_json::Value) {
        self.publish(ServerEvent {
            event: event.to_string(),
            payload,
            target_user_ids: None,
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn targeted_events_filter_by_user() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.dispatch_to_user(7, "notification:new", json!({"id": 1}));
        let event = rx.recv().await.unwrap();
        assert!(event.is_for(7));
        assert!(!event.is_for(8));

        bus.broadcast_all("maintenance", json!({}));
        let event = rx.recv().await.unwrap();
        assert!(event.is_for(7));
        assert!(event.is_for(8));
    }

    #[test]
    fn publish_without_receivers_is_a_noop() {
        let bus = EventBus::new(8);
        bus.dispatch_to_user(1, "message:new", json!({}));
    }
}
