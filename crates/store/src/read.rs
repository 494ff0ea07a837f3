//! Read operations (§4.B, §4.F).
//!
//! The filter/sort/pagination primitives live here as thin, parameterized
//! SQL builders; the query façade crate owns the policy on top (protocol
//! branching, FTS-expression construction, aggregate assembly) and calls
//! into these.

use rusqlite::Row;
use traffic_mcp_common::BodyPayload;

use crate::error::StoreResult;
use crate::models::*;
use crate::Store;

/// Column to order a list query by (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Timestamp,
    Url,
    Method,
    Status,
    ResponseTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Which side of the `http_traffic` table to constrain to, if any (§4.F:
/// "If scheme is http/https, query HTTP table only").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpSchemeFilter {
    Http,
    Https,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsSchemeFilter {
    Ws,
    Wss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatusFilter {
    Active,
    Closed,
}

/// Inputs to a filtered HTTP list query (§4.F).
#[derive(Debug, Clone, Default)]
pub struct HttpListFilter {
    pub host: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<u16>,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub min_response_time_ms: Option<u64>,
    pub max_response_time_ms: Option<u64>,
    pub scheme: Option<HttpSchemeFilter>,
    pub limit: u32,
    pub offset: u32,
    pub sort: SortFieldOpt,
}

#[derive(Debug, Clone, Copy)]
pub struct SortFieldOpt {
    pub field: SortField,
    pub order: SortOrder,
}

impl Default for SortFieldOpt {
    fn default() -> Self {
        Self {
            field: SortField::Timestamp,
            order: SortOrder::Desc,
        }
    }
}

/// Inputs to a filtered WebSocket list query (§4.F).
#[derive(Debug, Clone, Default)]
pub struct WsListFilter {
    pub host: Option<String>,
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub scheme: Option<WsSchemeFilter>,
    pub status: Option<ConnectionStatusFilter>,
    pub limit: u32,
    pub offset: u32,
    pub sort: SortFieldOpt,
}

fn http_sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Timestamp => "timestamp_ms",
        SortField::Url => "url",
        SortField::Method => "method",
        SortField::Status => "status_code",
        SortField::ResponseTime => "response_time_ms",
    }
}

fn ws_sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Timestamp => "timestamp_ms",
        SortField::Url => "url",
        // WS connections have no method/status_code/response_time columns;
        // the query façade falls back to timestamp for those on this side.
        SortField::Method | SortField::Status | SortField::ResponseTime => "timestamp_ms",
    }
}

fn http_transaction_from_row(row: &Row) -> rusqlite::Result<HttpTransaction> {
    let scheme_str: String = row.get("scheme")?;
    let status_code: Option<u16> = row.get("status_code")?;
    let response = if let Some(status_code) = status_code {
        Some(HttpResponseRecord {
            status_code,
            status_message: row.get::<_, Option<String>>("status_message")?.unwrap_or_default(),
            headers: headers_from_json(&row.get::<_, Option<String>>("response_headers")?.unwrap_or_default()),
            body: BodyPayload::from_storage_string(row.get::<_, Option<String>>("response_body")?.as_deref()),
            body_size: row.get::<_, Option<i64>>("response_body_size")?.unwrap_or(0) as u64,
            response_time_ms: row.get::<_, Option<i64>>("response_time_ms")?.unwrap_or(0) as u64,
        })
    } else {
        None
    };

    Ok(HttpTransaction {
        id: row.get("id")?,
        timestamp_ms: row.get("timestamp_ms")?,
        method: row.get("method")?,
        url: row.get("url")?,
        host: row.get("host")?,
        path: row.get("path")?,
        query: row.get("query")?,
        scheme: HttpScheme::parse(&scheme_str).unwrap_or(HttpScheme::Http),
        request_headers: headers_from_json(&row.get::<_, String>("request_headers")?),
        request_body: BodyPayload::from_storage_string(row.get::<_, Option<String>>("request_body")?.as_deref()),
        request_body_size: row.get::<_, i64>("request_body_size")? as u64,
        content_type: row.get("content_type")?,
        user_agent: row.get("user_agent")?,
        client_addr: row.get("client_addr")?,
        upstream_addr: row.get("upstream_addr")?,
        error_message: row.get("error_message")?,
        response,
    })
}

fn ws_connection_from_row(row: &Row) -> rusqlite::Result<WebSocketConnection> {
    let scheme_str: String = row.get("scheme")?;
    let response_status: Option<i64> = row.get("response_status")?;
    let response = response_status.map(|status| WebSocketUpgradeResponse {
        status: status as u16,
        headers: headers_from_json(&row.get::<_, Option<String>>("response_headers").unwrap_or(None).unwrap_or_default()),
    });

    Ok(WebSocketConnection {
        id: row.get("id")?,
        timestamp_ms: row.get("timestamp_ms")?,
        url: row.get("url")?,
        host: row.get("host")?,
        scheme: WsScheme::parse(&scheme_str).unwrap_or(WsScheme::Ws),
        request_headers: headers_from_json(&row.get::<_, String>("request_headers")?),
        response,
        lifecycle: WebSocketLifecycle {
            established_at_ms: row.get("established_at_ms")?,
            closed_at_ms: row.get("closed_at_ms")?,
            close_code: row.get::<_, Option<i64>>("close_code")?.map(|v| v as u16),
            close_reason: row.get("close_reason")?,
        },
        client_addr: row.get("client_addr")?,
        destination: row.get("destination")?,
    })
}

fn ws_message_from_row(row: &Row) -> rusqlite::Result<WebSocketMessage> {
    let direction: String = row.get("direction")?;
    let message_type: String = row.get("message_type")?;
    Ok(WebSocketMessage {
        id: row.get("id")?,
        connection_id: row.get("connection_id")?,
        timestamp_ms: row.get("timestamp_ms")?,
        direction: Direction::parse(&direction).unwrap_or(Direction::Outbound),
        message_type: WsMessageType::parse(&message_type).unwrap_or(WsMessageType::Text),
        payload: BodyPayload::from_storage_string(row.get::<_, Option<String>>("payload")?.as_deref()),
        byte_size: row.get::<_, i64>("byte_size")? as u64,
    })
}

impl Store {
    /// Point lookup by id (HTTP side). Returns `Ok(None)` on miss rather
    /// than `NotFound` — the façade decides whether a miss here should fall
    /// through to the WebSocket table (§4.F "Point lookup by id").
    pub fn get_http_transaction(&self, id: &str) -> StoreResult<Option<HttpTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM http_traffic WHERE id = ?1")?;
        let mut rows = stmt.query(rusqlite::params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(http_transaction_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Point lookup by id (WebSocket side), without messages — the detail
    /// path fetches those separately (§4.F).
    pub fn get_websocket_connection(&self, id: &str) -> StoreResult<Option<WebSocketConnection>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM websocket_connections WHERE id = ?1")?;
        let mut rows = stmt.query(rusqlite::params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(ws_connection_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// All messages of a connection, ordered by timestamp (§3 invariant:
    /// "totally ordered by timestamp").
    pub fn get_websocket_messages(&self, connection_id: &str) -> StoreResult<Vec<WebSocketMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM websocket_messages WHERE connection_id = ?1 ORDER BY timestamp_ms ASC",
        )?;
        let rows = stmt.query_map(rusqlite::params![connection_id], ws_message_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Filtered, sorted, paginated HTTP list query (§4.F). Protocol
    /// filtering happens in SQL, not after the fact.
    pub fn list_http(&self, filter: &HttpListFilter) -> StoreResult<Vec<HttpTransaction>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(host) = &filter.host {
            clauses.push("host LIKE ?".into());
            params.push(Box::new(format!("%{host}%")));
        }
        if let Some(method) = &filter.method {
            clauses.push("method = ?".into());
            params.push(Box::new(method.clone()));
        }
        if let Some(path) = &filter.path {
            clauses.push("path LIKE ?".into());
            params.push(Box::new(format!("%{path}%")));
        }
        if let Some(status) = filter.status_code {
            clauses.push("status_code = ?".into());
            params.push(Box::new(status));
        }
        if let Some(start) = filter.start_ts {
            clauses.push("timestamp_ms >= ?".into());
            params.push(Box::new(start));
        }
        if let Some(end) = filter.end_ts {
            clauses.push("timestamp_ms <= ?".into());
            params.push(Box::new(end));
        }
        if let Some(min) = filter.min_response_time_ms {
            clauses.push("response_time_ms >= ?".into());
            params.push(Box::new(min as i64));
        }
        if let Some(max) = filter.max_response_time_ms {
            clauses.push("response_time_ms <= ?".into());
            params.push(Box::new(max as i64));
        }
        match filter.scheme {
            Some(HttpSchemeFilter::Http) => clauses.push("scheme = 'http'".into()),
            Some(HttpSchemeFilter::Https) => clauses.push("scheme = 'https'".into()),
            None => {}
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM http_traffic {where_sql} ORDER BY {} {} LIMIT ? OFFSET ?",
            http_sort_column(filter.sort.field),
            filter.sort.order.as_sql(),
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), http_transaction_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Filtered, sorted, paginated WebSocket list query (§4.F).
    pub fn list_websocket_connections(&self, filter: &WsListFilter) -> StoreResult<Vec<WebSocketConnection>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(host) = &filter.host {
            clauses.push("host LIKE ?".into());
            params.push(Box::new(format!("%{host}%")));
        }
        if let Some(start) = filter.start_ts {
            clauses.push("timestamp_ms >= ?".into());
            params.push(Box::new(start));
        }
        if let Some(end) = filter.end_ts {
            clauses.push("timestamp_ms <= ?".into());
            params.push(Box::new(end));
        }
        match filter.scheme {
            Some(WsSchemeFilter::Ws) => clauses.push("scheme = 'ws'".into()),
            Some(WsSchemeFilter::Wss) => clauses.push("scheme = 'wss'".into()),
            None => {}
        }
        match filter.status {
            Some(ConnectionStatusFilter::Active) => clauses.push("closed_at_ms IS NULL".into()),
            Some(ConnectionStatusFilter::Closed) => clauses.push("closed_at_ms IS NOT NULL".into()),
            None => {}
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM websocket_connections {where_sql} ORDER BY {} {} LIMIT ? OFFSET ?",
            ws_sort_column(filter.sort.field),
            filter.sort.order.as_sql(),
        );
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), ws_connection_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Full-text search against the HTTP virtual table. `match_expr` is the
    /// already-quoted/escaped FTS5 MATCH expression (§4.F escaping rules
    /// are the façade's job); results ranked by relevance, capped at 1000.
    pub fn search_http_fts(&self, match_expr: &str) -> StoreResult<Vec<HttpTransaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.* FROM http_traffic t
             JOIN http_traffic_fts f ON t.rowid = f.rowid
             WHERE http_traffic_fts MATCH ?1
             ORDER BY rank LIMIT 1000",
        )?;
        let rows = stmt.query_map(rusqlite::params![match_expr], http_transaction_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Full-text search against the WebSocket virtual table.
    pub fn search_ws_fts(&self, match_expr: &str) -> StoreResult<Vec<WebSocketConnection>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.* FROM websocket_connections c
             JOIN websocket_traffic_fts f ON c.rowid = f.rowid
             WHERE websocket_traffic_fts MATCH ?1
             ORDER BY rank LIMIT 1000",
        )?;
        let rows = stmt.query_map(rusqlite::params![match_expr], ws_connection_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// LIKE (or, if `regex` is set, `REGEXP`) fallback search over raw
    /// columns, used when FTS returns nothing or raises an error (§4.F).
    /// `columns` must be a fixed, non-user-supplied set of column names.
    pub fn search_http_like(&self, pattern: &str, columns: &[&str], regex: bool) -> StoreResult<Vec<HttpTransaction>> {
        let op = if regex { "REGEXP" } else { "LIKE" };
        let like_value = if regex { pattern.to_string() } else { format!("%{pattern}%") };
        let clause = columns
            .iter()
            .map(|c| format!("{c} {op} ?1"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!("SELECT * FROM http_traffic WHERE {clause} LIMIT 1000");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![like_value], http_transaction_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// LIKE/REGEXP fallback search over the WebSocket connections table.
    pub fn search_ws_like(&self, pattern: &str, columns: &[&str], regex: bool) -> StoreResult<Vec<WebSocketConnection>> {
        let op = if regex { "REGEXP" } else { "LIKE" };
        let like_value = if regex { pattern.to_string() } else { format!("%{pattern}%") };
        let clause = columns
            .iter()
            .map(|c| format!("{c} {op} ?1"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!("SELECT * FROM websocket_connections WHERE {clause} LIMIT 1000");
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![like_value], ws_connection_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_transaction;

    #[test]
    fn list_http_filters_by_method() {
        let store = Store::open_in_memory().unwrap();
        store.store_http_transaction(&sample_transaction("a", 1)).unwrap();
        let mut other = sample_transaction("b", 2);
        other.method = "POST".into();
        store.store_http_transaction(&other).unwrap();

        let filter = HttpListFilter {
            method: Some("POST".into()),
            limit: 100,
            ..Default::default()
        };
        let results = store.list_http(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }

    #[test]
    fn list_http_pagination_is_stable_and_exhaustive() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..10 {
            store.store_http_transaction(&sample_transaction(&format!("t{i}"), i)).unwrap();
        }

        let all = store
            .list_http(&HttpListFilter {
                limit: 100,
                sort: SortFieldOpt { field: SortField::Timestamp, order: SortOrder::Asc },
                ..Default::default()
            })
            .unwrap();

        let mut paged = Vec::new();
        let page_size = 3;
        let mut offset = 0;
        loop {
            let page = store
                .list_http(&HttpListFilter {
                    limit: page_size,
                    offset,
                    sort: SortFieldOpt { field: SortField::Timestamp, order: SortOrder::Asc },
                    ..Default::default()
                })
                .unwrap();
            if page.is_empty() {
                break;
            }
            paged.extend(page);
            offset += page_size;
        }

        assert_eq!(all.len(), paged.len());
        for (a, b) in all.iter().zip(paged.iter()) {
            assert_eq!(a.id, b.id);
        }
    }

    #[test]
    fn scheme_filter_is_sound() {
        let store = Store::open_in_memory().unwrap();
        store.store_http_transaction(&sample_transaction("h1", 1)).unwrap();
        let mut https_txn = sample_transaction("h2", 2);
        https_txn.scheme = HttpScheme::Https;
        store.store_http_transaction(&https_txn).unwrap();

        let results = store
            .list_http(&HttpListFilter {
                scheme: Some(HttpSchemeFilter::Https),
                limit: 100,
                ..Default::default()
            })
            .unwrap();
        assert!(results.iter().all(|t| t.scheme == HttpScheme::Https));
    }
}
