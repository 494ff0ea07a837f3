//! Filtered list query (§4.F).

use traffic_mcp_store::{
    ConnectionStatusFilter, HttpListFilter, HttpSchemeFilter, SortField, SortFieldOpt, SortOrder,
    WsListFilter, WsSchemeFilter,
};

use crate::{QueryError, QueryFacade, QueryResult, TrafficRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
    Ws,
    Wss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Timestamp,
    Url,
    Method,
    Status,
    ResponseTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Active,
    Closed,
}

/// Inputs to [`QueryFacade::list`] (§4.F filtered list query).
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub host: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<u16>,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub min_response_time_ms: Option<u64>,
    pub max_response_time_ms: Option<u64>,
    pub protocol: Option<Protocol>,
    pub connection_status: Option<ConnectionStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort_by: Option<SortBy>,
    pub order: Option<Order>,
}

fn to_store_sort(sort_by: Option<SortBy>, order: Option<Order>) -> SortFieldOpt {
    let field = match sort_by.unwrap_or(SortBy::Timestamp) {
        SortBy::Timestamp => SortField::Timestamp,
        SortBy::Url => SortField::Url,
        SortBy::Method => SortField::Method,
        SortBy::Status => SortField::Status,
        SortBy::ResponseTime => SortField::ResponseTime,
    };
    let order = match order.unwrap_or(Order::Desc) {
        Order::Asc => SortOrder::Asc,
        Order::Desc => SortOrder::Desc,
    };
    SortFieldOpt { field, order }
}

impl QueryFacade {
    /// Run a filtered, sorted, paginated list query over HTTP and/or
    /// WebSocket traffic (§4.F).
    ///
    /// When `protocol` names an HTTP scheme, only `http_traffic` is
    /// queried (in SQL, not post-filter). When it names a WS scheme, only
    /// `websocket_connections` is queried. When unset, both tables are
    /// queried in full and merged, re-sorted by timestamp in memory, and
    /// *then* paginated — §9 notes this is the source's own behavior and
    /// is O(n) on the combined result set.
    pub fn list(&self, query: &ListQuery) -> QueryResult<Vec<TrafficRecord>> {
        let (limit, offset) = Self::resolve_pagination(query.limit, query.offset)?;
        if let (Some(min), Some(max)) = (query.min_response_time_ms, query.max_response_time_ms) {
            if min > max {
                return Err(QueryError::InvalidArgument(
                    "min_response_time_ms must not exceed max_response_time_ms".into(),
                ));
            }
        }
        if let (Some(start), Some(end)) = (query.start_ts, query.end_ts) {
            if start > end {
                return Err(QueryError::InvalidArgument("start must not be after end".into()));
            }
        }

        let sort = to_store_sort(query.sort_by, query.order);

        match query.protocol {
            Some(Protocol::Http) | Some(Protocol::Https) => {
                let filter = self.http_filter(query, limit, offset, sort);
                let rows = self.store.list_http(&filter)?;
                Ok(rows.into_iter().map(TrafficRecord::Http).collect())
            }
            Some(Protocol::Ws) | Some(Protocol::Wss) => {
                let filter = self.ws_filter(query, limit, offset, sort);
                let rows = self.store.list_websocket_connections(&filter)?;
                Ok(rows.into_iter().map(TrafficRecord::WebSocket).collect())
            }
            None => {
                // Unbounded fetch on both sides, merged and re-sorted in
                // memory before pagination (§9 "mixed-scheme pagination").
                let http_filter = self.http_filter(query, u32::MAX, 0, sort);
                let ws_filter = self.ws_filter(query, u32::MAX, 0, sort);

                let mut combined: Vec<TrafficRecord> = self
                    .store
                    .list_http(&http_filter)?
                    .into_iter()
                    .map(TrafficRecord::Http)
                    .chain(
                        self.store
                            .list_websocket_connections(&ws_filter)?
                            .into_iter()
                            .map(TrafficRecord::WebSocket),
                    )
                    .collect();

                match sort.order {
                    SortOrder::Asc => combined.sort_by_key(|r| r.timestamp_ms()),
                    SortOrder::Desc => combined.sort_by_key(|r| std::cmp::Reverse(r.timestamp_ms())),
                }

                let start = offset as usize;
                let end = start.saturating_add(limit as usize);
                Ok(combined.into_iter().skip(start).take(end - start).collect())
            }
        }
    }

    fn http_filter(&self, query: &ListQuery, limit: u32, offset: u32, sort: SortFieldOpt) -> HttpListFilter {
        HttpListFilter {
            host: query.host.clone(),
            method: query.method.clone(),
            path: query.path.clone(),
            status_code: query.status_code,
            start_ts: query.start_ts,
            end_ts: query.end_ts,
            min_response_time_ms: query.min_response_time_ms,
            max_response_time_ms: query.max_response_time_ms,
            scheme: match query.protocol {
                Some(Protocol::Http) => Some(HttpSchemeFilter::Http),
                Some(Protocol::Https) => Some(HttpSchemeFilter::Https),
                _ => None,
            },
            limit,
            offset,
            sort,
        }
    }

    fn ws_filter(&self, query: &ListQuery, limit: u32, offset: u32, sort: SortFieldOpt) -> WsListFilter {
        WsListFilter {
            host: query.host.clone(),
            start_ts: query.start_ts,
            end_ts: query.end_ts,
            scheme: match query.protocol {
                Some(Protocol::Ws) => Some(WsSchemeFilter::Ws),
                Some(Protocol::Wss) => Some(WsSchemeFilter::Wss),
                _ => None,
            },
            status: match query.connection_status {
                Some(ConnectionStatus::Active) => Some(ConnectionStatusFilter::Active),
                Some(ConnectionStatus::Closed) => Some(ConnectionStatusFilter::Closed),
                None => None,
            },
            limit,
            offset,
            sort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traffic_mcp_store::Store;

    fn sample_store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn rejects_zero_limit() {
        let facade = QueryFacade::new(sample_store());
        let err = facade
            .list(&ListQuery { limit: Some(0), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_limit_over_max() {
        let facade = QueryFacade::new(sample_store());
        let err = facade
            .list(&ListQuery { limit: Some(1001), ..Default::default() })
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument(_)));
    }
}
