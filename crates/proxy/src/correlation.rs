//! Request/response correlation (§4.D "Request/response correlation").
//!
//! Each request is assigned an internal capture id immediately on accept.
//! A concurrent map keyed by the upstream connection's own request id (the
//! only key the HTTP/1.1 client connection API gives us per in-flight
//! request) holds the internal id and the capture start time, so the
//! response side can find its way back to the right `HttpTransaction` row
//! without the two ends of the exchange sharing any other state.

use dashmap::DashMap;

/// One open correlation entry.
#[derive(Debug, Clone)]
pub struct CorrelationEntry {
    pub internal_id: String,
    pub capture_start_ms: i64,
}

/// Concurrent correlation map; entries are single-writer (the task that
/// inserted them is the only one that removes them), so no entry is ever
/// mutated by more than one task (§5 "Shared state").
#[derive(Clone, Default)]
pub struct CorrelationMap {
    inner: std::sync::Arc<DashMap<String, CorrelationEntry>>,
}

impl CorrelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, upstream_request_id: String, entry: CorrelationEntry) {
        self.inner.insert(upstream_request_id, entry);
    }

    /// Look up and remove an entry in one step, so the map stays bounded
    /// (§4.D: "On success, the map entry is removed").
    pub fn take(&self, upstream_request_id: &str) -> Option<CorrelationEntry> {
        self.inner.remove(upstream_request_id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop all entries (§4.D "Cancellation & shutdown": "Correlation map
    /// is cleared").
    pub fn clear(&self) {
        self.inner.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_removes_entry() {
        let map = CorrelationMap::new();
        map.insert(
            "upstream-1".into(),
            CorrelationEntry { internal_id: "cap-1".into(), capture_start_ms: 1000 },
        );
        assert_eq!(map.len(), 1);

        let entry = map.take("upstream-1").unwrap();
        assert_eq!(entry.internal_id, "cap-1");
        assert!(map.is_empty());
    }

    #[test]
    fn missing_key_take_is_none() {
        let map = CorrelationMap::new();
        assert!(map.take("nope").is_none());
    }

    #[test]
    fn clear_drops_all_entries() {
        let map = CorrelationMap::new();
        map.insert("a".into(), CorrelationEntry { internal_id: "1".into(), capture_start_ms: 0 });
        map.insert("b".into(), CorrelationEntry { internal_id: "2".into(), capture_start_ms: 0 });
        map.clear();
        assert!(map.is_empty());
    }
}
