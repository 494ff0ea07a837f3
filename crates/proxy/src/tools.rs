//! Tool API to an external collaborator (§6 "Tool API to external
//! collaborator").
//!
//! Each operation is a typed `Args -> ToolResult` pair; none of this is a
//! string-keyed RPC loop. Building and dispatching a JSON-RPC (or any
//! other wire) layer on top of these functions is left to the out-of-scope
//! external collaborator named in §1's Non-goals — this module only needs
//! to give that collaborator a stable, typed surface to call into.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use traffic_mcp_config::ProxyConfig;
use traffic_mcp_query::{ListQuery, QueryFacade, SearchQuery, StatsWindow, TrafficDetail};
use traffic_mcp_store::Store;

use crate::ca::CertificateAuthority;
use crate::health::{HealthReport, HealthSupervisor};
use crate::interceptor::InterceptionEngine;

/// Uniform envelope every operation returns (§6).
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
}

impl ToolResult {
    fn ok(message: impl Into<String>, data: impl Serialize) -> Self {
        Self { success: true, message: message.into(), data: serde_json::to_value(data).ok() }
    }

    fn ok_empty(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), data: None }
    }

    fn err(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), data: None }
    }
}

/// Groups the engine, health supervisor, CA, query façade, and Store handle
/// an external collaborator needs, behind the 14 named operations.
pub struct Tools {
    engine: Arc<InterceptionEngine>,
    health: Arc<HealthSupervisor>,
    ca: Option<Arc<CertificateAuthority>>,
    query: QueryFacade,
    store: Store,
    config: ProxyConfig,
}

impl Tools {
    pub fn new(
        engine: Arc<InterceptionEngine>,
        health: Arc<HealthSupervisor>,
        ca: Option<Arc<CertificateAuthority>>,
        store: Store,
        config: ProxyConfig,
    ) -> Self {
        Self { engine, health, ca, query: QueryFacade::new(store.clone()), store, config }
    }

    pub async fn start_proxy(&self) -> ToolResult {
        match self.engine.start().await {
            Ok(()) => ToolResult::ok("proxy started", self.engine.status()),
            Err(e) => ToolResult::err(format!("failed to start proxy: {e}")),
        }
    }

    pub async fn stop_proxy(&self) -> ToolResult {
        match self.engine.stop().await {
            Ok(()) => ToolResult::ok("proxy stopped", self.engine.status()),
            Err(e) => ToolResult::err(format!("failed to stop proxy: {e}")),
        }
    }

    pub async fn restart_proxy(&self) -> ToolResult {
        match self.engine.restart().await {
            Ok(()) => ToolResult::ok("proxy restarted", self.engine.status()),
            Err(e) => ToolResult::err(format!("failed to restart proxy: {e}")),
        }
    }

    pub fn get_proxy_status(&self) -> ToolResult {
        ToolResult::ok("proxy status", self.engine.status())
    }

    pub fn get_health_status(&self) -> ToolResult {
        let report: HealthReport = self.health.report();
        ToolResult::ok("health status", HealthStatusData {
            state: format!("{:?}", report.state),
            uptime_pct: report.uptime_pct,
            memory_trend_bytes: report.memory_trend_bytes,
            samples_taken: report.samples_taken,
        })
    }

    pub fn get_ca_certificate(&self) -> ToolResult {
        match &self.ca {
            Some(ca) => ToolResult::ok("CA certificate", CaCertificateData {
                certificate_pem: ca.certificate_pem().to_string(),
            }),
            None => ToolResult::err("HTTPS is disabled; no CA certificate is loaded"),
        }
    }

    pub fn query_traffic(&self, query: &ListQuery) -> ToolResult {
        match self.query.list(query) {
            Ok(records) => ToolResult::ok(format!("{} record(s)", records.len()), records),
            Err(e) => ToolResult::err(format!("query_traffic failed: {e}")),
        }
    }

    pub fn get_request_details(&self, id: &str) -> ToolResult {
        match self.query.get_by_id(id) {
            Ok(detail) => ToolResult::ok("request details", detail),
            Err(e) => ToolResult::err(format!("get_request_details failed: {e}")),
        }
    }

    pub fn search_traffic(&self, query: &SearchQuery) -> ToolResult {
        match self.query.search(query) {
            Ok(results) => ToolResult::ok(
                format!("{} HTTP, {} websocket match(es)", results.http.len(), results.websocket.len()),
                results,
            ),
            Err(e) => ToolResult::err(format!("search_traffic failed: {e}")),
        }
    }

    pub fn get_websocket_messages(&self, connection_id: &str) -> ToolResult {
        match self.query.get_by_id(connection_id) {
            Ok(TrafficDetail::WebSocket { messages, .. }) => {
                ToolResult::ok(format!("{} message(s)", messages.len()), messages)
            }
            Ok(TrafficDetail::Http(_)) => {
                ToolResult::err(format!("{connection_id} is an HTTP transaction, not a WebSocket connection"))
            }
            Err(e) => ToolResult::err(format!("get_websocket_messages failed: {e}")),
        }
    }

    pub fn get_traffic_stats(&self, window: StatsWindow) -> ToolResult {
        match self.query.get_stats(window) {
            Ok(stats) => ToolResult::ok("traffic stats", stats),
            Err(e) => ToolResult::err(format!("get_traffic_stats failed: {e}")),
        }
    }

    /// Requires `confirm: true`, per §6 — a caller that omits it gets a
    /// failed result with no data deleted.
    pub fn clear_all_logs(&self, confirm: bool) -> ToolResult {
        if !confirm {
            return ToolResult::err("clear_all_logs requires confirm: true");
        }
        match self.store.clear_all() {
            Ok(()) => ToolResult::ok_empty("all logs cleared"),
            Err(e) => ToolResult::err(format!("clear_all_logs failed: {e}")),
        }
    }

    pub fn clear_logs_by_timerange(&self, start_ts: i64, end_ts: i64) -> ToolResult {
        if start_ts > end_ts {
            return ToolResult::err("start_ts must not be after end_ts");
        }
        match self.store.delete_between(start_ts, end_ts) {
            Ok(()) => ToolResult::ok_empty("logs in range cleared"),
            Err(e) => ToolResult::err(format!("clear_logs_by_timerange failed: {e}")),
        }
    }

    /// Retention-day cleanup; defaults to the configured `retentionDays`
    /// when the caller doesn't override it.
    pub fn cleanup_old_logs(&self, retention_days: Option<u32>) -> ToolResult {
        let days = retention_days.unwrap_or(self.config.storage.retention_days);
        let cutoff_ms = traffic_mcp_common::now_ms() - (days as i64 * 24 * 60 * 60 * 1000);
        match self.store.delete_before(cutoff_ms) {
            Ok(()) => ToolResult::ok("old logs cleaned up", CleanupData { retention_days: days, cutoff_ms }),
            Err(e) => ToolResult::err(format!("cleanup_old_logs failed: {e}")),
        }
    }

    pub fn vacuum_database(&self) -> ToolResult {
        match self.store.vacuum() {
            Ok(()) => ToolResult::ok_empty("database vacuumed"),
            Err(e) => ToolResult::err(format!("vacuum_database failed: {e}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HealthStatusData {
    state: String,
    uptime_pct: f64,
    memory_trend_bytes: i64,
    samples_taken: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CaCertificateData {
    certificate_pem: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CleanupData {
    retention_days: u32,
    cutoff_ms: i64,
}
