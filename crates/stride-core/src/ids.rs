use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch: 2025-01-01T00:00:00Z
const STRIDE_EPOCH: u64 = 1_735_689_600_000;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);
static WORKER_ID: OnceLock<u16> = OnceLock::new();

fn worker_id() -> u16 {
    *WORKER_ID.get_or_init(|| {
        std::env::var("STRIDE_WORKER_ID")
            .ok()
            .and_then(|v| v.trim().parse::<u16>().ok())
            .map(|v| v & 0x3FF)
            .unwrap_or(0)
    })
}

/// Generate a snowflake ID.
/// Format: 42 bits timestamp | 10 bits worker | 12 bits sequence
pub fn generate() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as u64;
    let timestamp = now - STRIDE_EPOCH;
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) & 0xFFF;
    let id = (timestamp << 22) | ((worker_id() as u64 & 0x3FF) << 12) | seq;
    id as i64
}

/// Extract the Unix timestamp (ms) from a snowflake.
pub fn timestamp_millis(id: i64) -> u64 {
    ((id as u64) >> 22) + STRIDE_EPOCH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_within_a_burst() {
        let a = generate();
        let b = generate();
        assert!(b > a);
    }

    #[test]
    fn timestamp_round_trips() {
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let id = generate();
        let ts = timestamp_millis(id);
        assert!(ts >= before && ts <= before + 1_000);
    }
}
