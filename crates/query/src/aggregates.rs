//! Aggregate statistics (§4.F "Aggregates").

use serde::Serialize;

use crate::{QueryFacade, QueryResult};

/// An optional time window bounding an aggregate query. Both ends are
/// inclusive, matching [`traffic_mcp_store::HttpAggregates`]'s SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsWindow {
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
}

/// The full statistics bundle (§4.F "Aggregates"), combining the store's
/// raw HTTP/WS aggregates with the two ratios the façade derives from them.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficStats {
    pub total_http: u64,
    pub total_ws_connections: u64,
    pub total_ws_messages: u64,
    pub earliest_ts: Option<i64>,
    pub latest_ts: Option<i64>,
    pub method_counts: Vec<(String, u64)>,
    pub status_counts: Vec<(u16, u64)>,
    pub top_hosts: Vec<(String, u64)>,
    pub avg_response_time_ms: Option<f64>,
    /// 100 * (count of status >= 400) / (count of non-null status).
    pub error_rate_pct: Option<f64>,
    pub ws_protocol_counts: Vec<(String, u64)>,
    pub active_ws_count: u64,
    /// total_ws_messages / total_ws_connections, both drawn from their own
    /// independent windows (§9 quirk, preserved deliberately).
    pub avg_messages_per_connection: Option<f64>,
}

impl QueryFacade {
    /// Compute the full statistics bundle over an optional time window.
    ///
    /// The HTTP window and the WebSocket window are the same bounds, but
    /// the store applies them independently to `websocket_connections` and
    /// `websocket_messages` — so `avg_messages_per_connection` can reflect
    /// messages whose parent connection falls outside the window. This
    /// mirrors the source system and is intentional, not a bug (§9).
    pub fn get_stats(&self, window: StatsWindow) -> QueryResult<TrafficStats> {
        let http = self.store.http_aggregates(window.start_ts, window.end_ts)?;
        let ws = self
            .store
            .ws_aggregates((window.start_ts, window.end_ts), (window.start_ts, window.end_ts))?;

        let error_rate_pct = if http.responded_count > 0 {
            Some(100.0 * http.error_count as f64 / http.responded_count as f64)
        } else {
            None
        };

        let avg_messages_per_connection = if ws.total_connections > 0 {
            Some(ws.total_messages as f64 / ws.total_connections as f64)
        } else {
            None
        };

        Ok(TrafficStats {
            total_http: http.total,
            total_ws_connections: ws.total_connections,
            total_ws_messages: ws.total_messages,
            earliest_ts: [http.earliest_ts, ws.earliest_ts].into_iter().flatten().min(),
            latest_ts: [http.latest_ts, ws.latest_ts].into_iter().flatten().max(),
            method_counts: http.method_counts,
            status_counts: http.status_counts,
            top_hosts: http.top_hosts,
            avg_response_time_ms: http.avg_response_time_ms,
            error_rate_pct,
            ws_protocol_counts: ws.protocol_counts,
            active_ws_count: ws.active_count,
            avg_messages_per_connection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traffic_mcp_store::Store;

    #[test]
    fn empty_store_yields_no_rates() {
        let facade = QueryFacade::new(Store::open_in_memory().unwrap());
        let stats = facade.get_stats(StatsWindow::default()).unwrap();
        assert_eq!(stats.total_http, 0);
        assert!(stats.error_rate_pct.is_none());
        assert!(stats.avg_messages_per_connection.is_none());
    }
}
