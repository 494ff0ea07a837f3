//! Aggregate statistics queries (§4.F "Aggregates").
//!
//! These run directly against the base tables rather than building on
//! `list_http`/`list_websocket_connections`, since `GROUP BY` and `COUNT`
//! are cheaper to let SQLite do than to replicate in memory over an
//! unbounded result set.
//!
//! The HTTP window and the WebSocket-message window are independent: the
//! message count is filtered by the *message's own* timestamp, not by
//! whether its parent connection falls inside the window. This preserves
//! the source's `average messages per connection` quirk (§9): the total
//! can include messages whose parent connection is outside the active
//! filter window.

use crate::error::StoreResult;
use crate::Store;

#[derive(Debug, Clone, Default)]
pub struct HttpAggregates {
    pub total: u64,
    pub earliest_ts: Option<i64>,
    pub latest_ts: Option<i64>,
    pub method_counts: Vec<(String, u64)>,
    pub status_counts: Vec<(u16, u64)>,
    pub top_hosts: Vec<(String, u64)>,
    pub avg_response_time_ms: Option<f64>,
    /// Count of rows with `status_code >= 400`.
    pub error_count: u64,
    /// Count of rows with a non-null `status_code` (the error-rate
    /// denominator, §4.F).
    pub responded_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct WsAggregates {
    pub total_connections: u64,
    pub total_messages: u64,
    pub protocol_counts: Vec<(String, u64)>,
    pub active_count: u64,
    pub earliest_ts: Option<i64>,
    pub latest_ts: Option<i64>,
}

fn window_clause(column: &str, start: Option<i64>, end: Option<i64>) -> (String, Vec<i64>) {
    match (start, end) {
        (None, None) => (String::new(), vec![]),
        (Some(s), None) => (format!("WHERE {column} >= ?"), vec![s]),
        (None, Some(e)) => (format!("WHERE {column} <= ?"), vec![e]),
        (Some(s), Some(e)) => (format!("WHERE {column} BETWEEN ? AND ?"), vec![s, e]),
    }
}

impl Store {
    /// Aggregate statistics over `http_traffic`, optionally windowed by
    /// capture timestamp.
    pub fn http_aggregates(&self, start_ts: Option<i64>, end_ts: Option<i64>) -> StoreResult<HttpAggregates> {
        let conn = self.conn()?;
        let (where_sql, params) = window_clause("timestamp_ms", start_ts, end_ts);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let total: i64 = conn.query_row(
            &format!("SELECT count(*) FROM http_traffic {where_sql}"),
            param_refs.as_slice(),
            |r| r.get(0),
        )?;

        let (earliest_ts, latest_ts): (Option<i64>, Option<i64>) = conn.query_row(
            &format!("SELECT min(timestamp_ms), max(timestamp_ms) FROM http_traffic {where_sql}"),
            param_refs.as_slice(),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        let mut method_counts = Vec::new();
        {
            let mut stmt = conn.prepare(&format!(
                "SELECT method, count(*) FROM http_traffic {where_sql} GROUP BY method ORDER BY count(*) DESC"
            ))?;
            let rows = stmt.query_map(param_refs.as_slice(), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64))
            })?;
            for row in rows {
                method_counts.push(row?);
            }
        }

        let mut status_counts = Vec::new();
        {
            let mut stmt = conn.prepare(&format!(
                "SELECT status_code, count(*) FROM http_traffic {where_sql_and} status_code IS NOT NULL GROUP BY status_code ORDER BY status_code",
                where_sql_and = if where_sql.is_empty() { "WHERE".to_string() } else { format!("{where_sql} AND") }
            ))?;
            let rows = stmt.query_map(param_refs.as_slice(), |r| {
                Ok((r.get::<_, i64>(0)? as u16, r.get::<_, i64>(1)? as u64))
            })?;
            for row in rows {
                status_counts.push(row?);
            }
        }

        let mut top_hosts = Vec::new();
        {
            let mut stmt = conn.prepare(&format!(
                "SELECT host, count(*) FROM http_traffic {where_sql} GROUP BY host ORDER BY count(*) DESC LIMIT 10"
            ))?;
            let rows = stmt.query_map(param_refs.as_slice(), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64))
            })?;
            for row in rows {
                top_hosts.push(row?);
            }
        }

        let avg_response_time_ms: Option<f64> = conn.query_row(
            &format!(
                "SELECT avg(response_time_ms) FROM http_traffic {where_sql_and} response_time_ms IS NOT NULL",
                where_sql_and = if where_sql.is_empty() { "WHERE".to_string() } else { format!("{where_sql} AND") }
            ),
            param_refs.as_slice(),
            |r| r.get(0),
        )?;

        let error_count: i64 = conn.query_row(
            &format!(
                "SELECT count(*) FROM http_traffic {where_sql_and} status_code >= 400",
                where_sql_and = if where_sql.is_empty() { "WHERE".to_string() } else { format!("{where_sql} AND") }
            ),
            param_refs.as_slice(),
            |r| r.get(0),
        )?;

        let responded_count: i64 = conn.query_row(
            &format!(
                "SELECT count(*) FROM http_traffic {where_sql_and} status_code IS NOT NULL",
                where_sql_and = if where_sql.is_empty() { "WHERE".to_string() } else { format!("{where_sql} AND") }
            ),
            param_refs.as_slice(),
            |r| r.get(0),
        )?;

        Ok(HttpAggregates {
            total: total as u64,
            earliest_ts,
            latest_ts,
            method_counts,
            status_counts,
            top_hosts,
            avg_response_time_ms,
            error_count: error_count as u64,
            responded_count: responded_count as u64,
        })
    }

    /// Aggregate statistics over WebSocket connections/messages.
    ///
    /// `conn_window` filters `websocket_connections` by upgrade timestamp;
    /// `message_window` (usually the same bounds) filters
    /// `websocket_messages` by its own timestamp independently, per the
    /// quirk documented on [`WsAggregates`].
    pub fn ws_aggregates(
        &self,
        conn_window: (Option<i64>, Option<i64>),
        message_window: (Option<i64>, Option<i64>),
    ) -> StoreResult<WsAggregates> {
        let conn = self.conn()?;

        let (conn_where, conn_params) = window_clause("timestamp_ms", conn_window.0, conn_window.1);
        let conn_param_refs: Vec<&dyn rusqlite::ToSql> =
            conn_params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let total_connections: i64 = conn.query_row(
            &format!("SELECT count(*) FROM websocket_connections {conn_where}"),
            conn_param_refs.as_slice(),
            |r| r.get(0),
        )?;

        let (earliest_ts, latest_ts): (Option<i64>, Option<i64>) = conn.query_row(
            &format!("SELECT min(timestamp_ms), max(timestamp_ms) FROM websocket_connections {conn_where}"),
            conn_param_refs.as_slice(),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        let mut protocol_counts = Vec::new();
        {
            let mut stmt = conn.prepare(&format!(
                "SELECT scheme, count(*) FROM websocket_connections {conn_where} GROUP BY scheme"
            ))?;
            let rows = stmt.query_map(conn_param_refs.as_slice(), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64))
            })?;
            for row in rows {
                protocol_counts.push(row?);
            }
        }

        let active_clause = if conn_where.is_empty() {
            "WHERE closed_at_ms IS NULL".to_string()
        } else {
            format!("{conn_where} AND closed_at_ms IS NULL")
        };
        let active_count: i64 = conn.query_row(
            &format!("SELECT count(*) FROM websocket_connections {active_clause}"),
            conn_param_refs.as_slice(),
            |r| r.get(0),
        )?;

        let (msg_where, msg_params) = window_clause("timestamp_ms", message_window.0, message_window.1);
        let msg_param_refs: Vec<&dyn rusqlite::ToSql> = msg_params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let total_messages: i64 = conn.query_row(
            &format!("SELECT count(*) FROM websocket_messages {msg_where}"),
            msg_param_refs.as_slice(),
            |r| r.get(0),
        )?;

        Ok(WsAggregates {
            total_connections: total_connections as u64,
            total_messages: total_messages as u64,
            protocol_counts,
            active_count: active_count as u64,
            earliest_ts,
            latest_ts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_transaction;

    #[test]
    fn http_aggregates_counts_and_error_rate() {
        let store = Store::open_in_memory().unwrap();
        store.store_http_transaction(&sample_transaction("a", 100)).unwrap();
        store.store_http_transaction(&sample_transaction("b", 200)).unwrap();

        let agg = store.http_aggregates(None, None).unwrap();
        assert_eq!(agg.total, 2);
        assert_eq!(agg.earliest_ts, Some(100));
        assert_eq!(agg.latest_ts, Some(200));
        // Neither transaction has a response yet, so the denominator is 0.
        assert_eq!(agg.responded_count, 0);
    }

    #[test]
    fn ws_aggregates_message_window_is_independent_of_connection_window() {
        let store = Store::open_in_memory().unwrap();
        use crate::models::*;
        let conn_entry = WebSocketConnection {
            id: "c1".into(),
            timestamp_ms: 5000,
            url: "ws://example.com/socket".into(),
            host: "example.com".into(),
            scheme: WsScheme::Ws,
            request_headers: HeaderList::new(),
            response: None,
            lifecycle: WebSocketLifecycle { established_at_ms: 5000, ..Default::default() },
            client_addr: "127.0.0.1:1".into(),
            destination: "127.0.0.1:80".into(),
        };
        store.store_websocket_upgrade(&conn_entry).unwrap();
        // Message timestamp falls outside a [0, 1000] window even though
        // we're about to query messages with that window directly.
        store
            .append_websocket_message(
                "c1",
                &WebSocketMessage {
                    id: "m1".into(),
                    connection_id: "c1".into(),
                    timestamp_ms: 5050,
                    direction: Direction::Outbound,
                    message_type: WsMessageType::Text,
                    payload: traffic_mcp_common::BodyPayload::text("hi"),
                    byte_size: 2,
                },
            )
            .unwrap();

        // Connection window [0, 1000] excludes the connection; message
        // window [5000, 6000] includes the message independently.
        let agg = store.ws_aggregates((Some(0), Some(1000)), (Some(5000), Some(6000))).unwrap();
        assert_eq!(agg.total_connections, 0);
        assert_eq!(agg.total_messages, 1);
    }
}
