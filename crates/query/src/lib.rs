//! Query/search façade (§4.F): a thin reader over the store providing
//! filtered list queries, point lookup, full-text search with LIKE
//! fallback, and aggregate statistics.

mod aggregates;
mod detail;
mod error;
mod list;
mod search;

pub use aggregates::{StatsWindow, TrafficStats};
pub use detail::TrafficDetail;
pub use error::{QueryError, QueryResult};
pub use list::{ListQuery, Order, Protocol, SortBy};
pub use search::{SearchField, SearchQuery};

use serde::Serialize;
use traffic_mcp_store::{HttpTransaction, Store, WebSocketConnection};

/// Default and maximum page sizes (§4.F "pagination (limit default 100,
/// max 1000; offset)").
pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 1000;

/// One row of a (possibly mixed-protocol) result set.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrafficRecord {
    Http(HttpTransaction),
    WebSocket(WebSocketConnection),
}

impl TrafficRecord {
    pub fn timestamp_ms(&self) -> i64 {
        match self {
            TrafficRecord::Http(t) => t.timestamp_ms,
            TrafficRecord::WebSocket(c) => c.timestamp_ms,
        }
    }
}

/// The façade itself: a cheap-to-clone reader over a [`Store`] handle.
#[derive(Clone)]
pub struct QueryFacade {
    store: Store,
}

impl QueryFacade {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Clamp/validate a requested page size and offset (§4.F).
    fn resolve_pagination(limit: Option<u32>, offset: Option<u32>) -> QueryResult<(u32, u32)> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if limit == 0 {
            return Err(QueryError::InvalidArgument("limit must be at least 1".into()));
        }
        if limit > MAX_LIMIT {
            return Err(QueryError::InvalidArgument(format!(
                "limit {limit} exceeds the maximum of {MAX_LIMIT}"
            )));
        }
        Ok((limit, offset.unwrap_or(0)))
    }
}
