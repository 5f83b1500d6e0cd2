use stride_core::events::ServerEvent;
use stride_models::user::Identity;

/// Per-connection session state. The bound identity is mutable on purpose:
/// a live re-authentication swaps it in place, which retargets event
/// filtering for the rest of the connection without tearing it down.
pub struct Session {
    pub connection_id: String,
    identity: Identity,
}

impl Session {
    pub fn new(identity: Identity) -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            identity,
        }
    }

    pub fn user_id(&self) -> i64 {
        self.identity.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The personal room this session currently listens on.
    pub fn room(&self) -> String {
        format!("user:{}", self.identity.id)
    }

    /// Swaps the bound identity and returns the previous user id. Callers
    /// must rebind before acking the refresh, so no event can be delivered
    /// against a stale binding.
    pub fn rebind(&mut self, identity: Identity) -> i64 {
        let previous = self.identity.id;
        self.identity = identity;
        previous
    }

    pub fn should_receive(&self, event: &ServerEvent) -> bool {
        event.is_for(self.identity.id)
    }
}
