//! Id generation.
//!
//! Capture ids only need to be unique for the lifetime of the running
//! process (§3, HttpTransaction identity); a v4 UUID rendered as a simple
//! string satisfies that without pulling in a dependency on wall-clock
//! ordering.

use uuid::Uuid;

/// Generate a fresh, process-lifetime-unique capture id.
pub fn new_capture_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time in milliseconds since the Unix epoch, the timestamp unit
/// used throughout the data model (§3, §6: "integer milliseconds").
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_ids_are_unique() {
        let a = new_capture_id();
        let b = new_capture_id();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }
}
