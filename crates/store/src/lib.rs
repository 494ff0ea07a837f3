//! Embedded relational persistence (§4.B).
//!
//! Single writer, many readers: `rusqlite` + WAL journal mode, wrapped in an
//! `r2d2` pool so every caller borrows a pooled connection rather than
//! sharing one handle behind a lock. Schema creation is idempotent; FTS5
//! virtual tables are kept coherent with the base tables by triggers
//! (`schema.rs`), not application code.

pub mod error;
pub mod maintenance;
pub mod models;
pub mod pool;
mod read;
mod schema;
mod stats;
mod write;

pub use error::{StoreError, StoreResult};
pub use models::*;
pub use read::{
    ConnectionStatusFilter, HttpListFilter, HttpSchemeFilter, SortField, SortFieldOpt, SortOrder,
    WsListFilter, WsSchemeFilter,
};
pub use stats::{HttpAggregates, WsAggregates};

use std::path::Path;

use pool::Pool;

/// The persistence engine. Cheap to clone (an `Arc`-backed pool
/// internally); the interception engine holds one write handle, the query
/// façade holds a read handle, both typically via `Store::clone()`.
#[derive(Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    /// Open (creating if absent) the database at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self {
            pool: pool::open(path)?,
        })
    }

    /// Open a private in-memory store, for tests.
    #[cfg(any(test, feature = "test-util"))]
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self {
            pool: pool::open_in_memory()?,
        })
    }

    fn conn(&self) -> StoreResult<pool::PooledConnection> {
        Ok(self.pool.get()?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::*;
    use traffic_mcp_common::BodyPayload;

    pub(crate) fn sample_transaction(id: &str, ts: i64) -> HttpTransaction {
        let mut headers = HeaderList::new();
        headers.push("Host", "example.com");
        HttpTransaction {
            id: id.to_string(),
            timestamp_ms: ts,
            method: "GET".into(),
            url: "http://example.com/ping".into(),
            host: "example.com".into(),
            path: "/ping".into(),
            query: String::new(),
            scheme: HttpScheme::Http,
            request_headers: headers,
            request_body: None,
            request_body_size: 0,
            content_type: None,
            user_agent: Some("test-agent".into()),
            client_addr: "127.0.0.1:5555".into(),
            upstream_addr: Some("127.0.0.1:9".into()),
            error_message: None,
            response: None,
        }
    }

    #[test]
    fn open_in_memory_creates_schema() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='http_traffic'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn store_then_update_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let txn = sample_transaction("t1", 1000);
        store.store_http_transaction(&txn).unwrap();

        let response = HttpResponseRecord {
            status_code: 200,
            status_message: "OK".into(),
            headers: HeaderList::new(),
            body: BodyPayload::text("pong"),
            body_size: 4,
            response_time_ms: 12,
        };
        store.update_http_response("t1", &response).unwrap();

        let fetched = store.get_http_transaction("t1").unwrap().unwrap();
        assert_eq!(fetched.response.unwrap().status_code, 200);
    }
}
