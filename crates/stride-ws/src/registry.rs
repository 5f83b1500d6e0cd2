use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

const MAX_GLOBAL_CONNECTIONS_DEFAULT: usize = 2_000;
const MAX_CONNECTIONS_PER_USER_DEFAULT: usize = 5;

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// Tracks live gateway connections: a global count for the capacity cap and
/// a per-user count so one account cannot hold the whole gateway.
pub struct ConnectionRegistry {
    global: AtomicUsize,
    per_user: DashMap<i64, usize>,
    max_global: usize,
    max_per_user: usize,
}

static SHARED: OnceLock<ConnectionRegistry> = OnceLock::new();

impl ConnectionRegistry {
    pub fn with_caps(max_global: usize, max_per_user: usize) -> Self {
        Self {
            global: AtomicUsize::new(0),
            per_user: DashMap::new(),
            max_global,
            max_per_user,
        }
    }

    /// The process-wide registry, caps tunable via environment.
    pub fn shared() -> &'static ConnectionRegistry {
        SHARED.get_or_init(|| {
            Self::with_caps(
                env_usize("STRIDE_WS_MAX_CONNECTIONS", MAX_GLOBAL_CONNECTIONS_DEFAULT),
                env_usize(
                    "STRIDE_WS_MAX_CONNECTIONS_PER_USER",
                    MAX_CONNECTIONS_PER_USER_DEFAULT,
                ),
            )
        })
    }

    pub fn try_acquire_global(&self) -> bool {
        let mut current = self.global.load(Ordering::SeqCst);
        loop {
            if current >= self.max_global {
                return false;
            }
            match self.global.compare_exchange(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn release_global(&self) {
        self.global.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn try_acquire_user(&self, user_id: i64) -> bool {
        let mut count = self.per_user.entry(user_id).or_insert(0);
        if *count >= self.max_per_user {
            return false;
        }
        *count += 1;
        true
    }

    pub fn release_user(&self, user_id: i64) {
        if let Some(mut count) = self.per_user.get_mut(&user_id) {
            if *count <= 1 {
                drop(count);
                self.per_user.remove(&user_id);
            } else {
                *count -= 1;
            }
        }
    }

    /// Moves one connection slot between users, for live re-authentication.
    /// Acquires the new slot first; on failure the old binding stays intact.
    pub fn rebind_user(&self, from: i64, to: i64) -> bool {
        if from == to {
            return true;
        }
        if !self.try_acquire_user(to) {
            return false;
        }
        self.release_user(from);
        true
    }

    pub fn global_count(&self) -> usize {
        self.global.load(Ordering::SeqCst)
    }

    pub fn user_count(&self, user_id: i64) -> usize {
        self.per_user.get(&user_id).map(|c| *c).unwrap_or(0)
    }
}

/// Holds the slots for one connection and gives them back on drop, whatever
/// path the session takes out of the handler.
pub struct ConnectionGuard {
    registry: &'static ConnectionRegistry,
    user_id: Option<i64>,
    global_acquired: bool,
}

impl ConnectionGuard {
    pub fn new(registry: &'static ConnectionRegistry) -> Self {
        Self {
            registry,
            user_id: None,
            global_acquired: false,
        }
    }

    pub fn acquire_global(&mut self) -> bool {
        if self.registry.try_acquire_global() {
            self.global_acquired = true;
            true
        } else {
            false
        }
    }

    pub fn acquire_user(&mut self, user_id: i64) -> bool {
        if self.registry.try_acquire_user(user_id) {
            self.user_id = Some(user_id);
            true
        } else {
            false
        }
    }

    pub fn rebind(&mut self, to: i64) -> bool {
        match self.user_id {
            Some(from) => {
                if self.registry.rebind_user(from, to) {
                    self.user_id = Some(to);
                    true
                } else {
                    false
                }
            }
            None => self.acquire_user(to),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(user_id) = self.user_id.take() {
            self.registry.release_user(user_id);
        }
        if self.global_acquired {
            self.registry.release_global();
        }
    }
}
