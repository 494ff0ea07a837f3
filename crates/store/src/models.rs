//! Data model (§3).
//!
//! `HeaderList` is the canonical, order-preserving representation used for
//! every header set in this crate; `HeaderList::as_map` derives the "map
//! view" the spec also requires (values grouped to preserve duplicates).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use traffic_mcp_common::BodyPayload;

/// An ordered sequence of header name/value pairs, preserving duplicates
/// and original case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderList(pub Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Map view: header name (as first seen) -> all values in order.
    pub fn as_map(&self) -> HashMap<String, Vec<String>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in &self.0 {
            map.entry(name.clone()).or_default().push(value.clone());
        }
        map
    }

    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Serialize a `HeaderList` to the JSON form persisted in the store (§6,
/// "headers are JSON-encoded").
pub fn headers_to_json(headers: &HeaderList) -> String {
    serde_json::to_string(&headers.0).unwrap_or_else(|_| "[]".to_string())
}

/// Parse the JSON form back into a `HeaderList`. A malformed column yields
/// an empty header list rather than propagating a parse error — the row
/// itself is still valid, only this hydration step is lossy.
pub fn headers_from_json(raw: &str) -> HeaderList {
    serde_json::from_str::<Vec<(String, String)>>(raw)
        .map(HeaderList)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpScheme {
    Http,
    Https,
}

impl HttpScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpScheme::Http => "http",
            HttpScheme::Https => "https",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "http" => Some(HttpScheme::Http),
            "https" => Some(HttpScheme::Https),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsScheme {
    Ws,
    Wss,
}

impl WsScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            WsScheme::Ws => "ws",
            WsScheme::Wss => "wss",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ws" => Some(WsScheme::Ws),
            "wss" => Some(WsScheme::Wss),
            _ => None,
        }
    }
}

/// The response sub-record of an `HttpTransaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponseRecord {
    pub status_code: u16,
    pub status_message: String,
    pub headers: HeaderList,
    pub body: Option<BodyPayload>,
    pub body_size: u64,
    pub response_time_ms: u64,
}

/// One captured request, optionally paired with its response (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTransaction {
    pub id: String,
    pub timestamp_ms: i64,
    pub method: String,
    pub url: String,
    pub host: String,
    pub path: String,
    pub query: String,
    pub scheme: HttpScheme,
    pub request_headers: HeaderList,
    pub request_body: Option<BodyPayload>,
    pub request_body_size: u64,
    pub content_type: Option<String>,
    pub user_agent: Option<String>,
    pub client_addr: String,
    pub upstream_addr: Option<String>,
    pub error_message: Option<String>,
    pub response: Option<HttpResponseRecord>,
}

impl HttpTransaction {
    /// §3 invariant: exactly one of (response present) / (error message
    /// present) for a *completed* transaction; a transaction in flight may
    /// have neither.
    pub fn is_complete(&self) -> bool {
        self.response.is_some() || self.error_message.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketUpgradeResponse {
    pub status: u16,
    pub headers: HeaderList,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebSocketLifecycle {
    pub established_at_ms: i64,
    pub closed_at_ms: Option<i64>,
    pub close_code: Option<u16>,
    pub close_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConnection {
    pub id: String,
    pub timestamp_ms: i64,
    pub url: String,
    pub host: String,
    pub scheme: WsScheme,
    pub request_headers: HeaderList,
    pub response: Option<WebSocketUpgradeResponse>,
    pub lifecycle: WebSocketLifecycle,
    pub client_addr: String,
    pub destination: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(Direction::Inbound),
            "outbound" => Some(Direction::Outbound),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsMessageType {
    Text,
    Binary,
    Ping,
    Pong,
    Close,
}

impl WsMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WsMessageType::Text => "text",
            WsMessageType::Binary => "binary",
            WsMessageType::Ping => "ping",
            WsMessageType::Pong => "pong",
            WsMessageType::Close => "close",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(WsMessageType::Text),
            "binary" => Some(WsMessageType::Binary),
            "ping" => Some(WsMessageType::Ping),
            "pong" => Some(WsMessageType::Pong),
            "close" => Some(WsMessageType::Close),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessage {
    pub id: String,
    pub connection_id: String,
    pub timestamp_ms: i64,
    pub direction: Direction,
    pub message_type: WsMessageType,
    pub payload: Option<BodyPayload>,
    pub byte_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_list_preserves_duplicates_and_order() {
        let mut headers = HeaderList::new();
        headers.push("Set-Cookie", "a=1");
        headers.push("Set-Cookie", "b=2");
        headers.push("X-Trace", "abc");

        assert_eq!(headers.0.len(), 3);
        let map = headers.as_map();
        assert_eq!(map.get("Set-Cookie").unwrap(), &vec!["a=1", "b=2"]);
    }

    #[test]
    fn headers_json_round_trip() {
        let mut headers = HeaderList::new();
        headers.push("Content-Type", "application/json");
        let json = headers_to_json(&headers);
        let parsed = headers_from_json(&json);
        assert_eq!(parsed, headers);
    }

    #[test]
    fn malformed_header_json_yields_empty_list() {
        let parsed = headers_from_json("not json");
        assert!(parsed.is_empty());
    }

    #[test]
    fn transaction_completeness_invariant() {
        let mut txn = HttpTransaction {
            id: "1".into(),
            timestamp_ms: 0,
            method: "GET".into(),
            url: "http://x/".into(),
            host: "x".into(),
            path: "/".into(),
            query: String::new(),
            scheme: HttpScheme::Http,
            request_headers: HeaderList::new(),
            request_body: None,
            request_body_size: 0,
            content_type: None,
            user_agent: None,
            client_addr: "127.0.0.1:1".into(),
            upstream_addr: None,
            error_message: None,
            response: None,
        };
        assert!(!txn.is_complete());
        txn.error_message = Some("boom".into());
        assert!(txn.is_complete());
    }
}
