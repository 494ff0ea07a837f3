//! Write operations (§4.B).
//!
//! Every write goes through a prepared statement on a pooled connection.
//! The pool gives us a single physical writer in WAL mode with concurrent
//! readers; no application-level lock is taken here.

use traffic_mcp_common::BodyPayload;

use crate::error::{StoreError, StoreResult};
use crate::models::{
    headers_to_json, HttpResponseRecord, HttpTransaction, WebSocketConnection, WebSocketMessage,
};
use crate::Store;

impl Store {
    /// Insert a new transaction row with null response columns (§4.B).
    pub fn store_http_transaction(&self, entry: &HttpTransaction) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO http_traffic (
                id, timestamp_ms, method, url, host, path, query, scheme,
                request_headers, request_body, request_body_size, content_type,
                user_agent, client_addr, upstream_addr, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            rusqlite::params![
                entry.id,
                entry.timestamp_ms,
                entry.method,
                entry.url,
                entry.host,
                entry.path,
                entry.query,
                entry.scheme.as_str(),
                headers_to_json(&entry.request_headers),
                entry.request_body.as_ref().map(BodyPayload::to_storage_string),
                entry.request_body_size as i64,
                entry.content_type,
                entry.user_agent,
                entry.client_addr,
                entry.upstream_addr,
                entry.error_message,
            ],
        )?;
        Ok(())
    }

    /// Attach the response to a previously stored transaction. Exactly one
    /// update; a zero-row update (the row was evicted by retention) is not
    /// an error — the caller may log it.
    pub fn update_http_response(&self, id: &str, response: &HttpResponseRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE http_traffic SET
                status_code = ?2, status_message = ?3, response_headers = ?4,
                response_body = ?5, response_body_size = ?6, response_time_ms = ?7
             WHERE id = ?1",
            rusqlite::params![
                id,
                response.status_code,
                response.status_message,
                headers_to_json(&response.headers),
                response.body.as_ref().map(BodyPayload::to_storage_string),
                response.body_size as i64,
                response.response_time_ms as i64,
            ],
        )?;
        if updated == 0 {
            tracing::warn!(transaction_id = %id, "update_http_response: no matching row (evicted?)");
        }
        Ok(())
    }

    /// Record a transaction-terminal error (§7, `UpstreamError` et al. land
    /// here; abandoned-on-shutdown transactions also use this path with the
    /// literal message `"aborted"`, §5).
    pub fn store_http_error(&self, id: &str, error_message: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE http_traffic SET error_message = ?2 WHERE id = ?1",
            rusqlite::params![id, error_message],
        )?;
        Ok(())
    }

    /// Insert a new WebSocket connection row (§4.B).
    pub fn store_websocket_upgrade(&self, entry: &WebSocketConnection) -> StoreResult<()> {
        let conn = self.conn()?;
        let (response_status, response_headers) = match &entry.response {
            Some(r) => (Some(r.status as i64), Some(headers_to_json(&r.headers))),
            None => (None, None),
        };
        conn.execute(
            "INSERT INTO websocket_connections (
                id, timestamp_ms, url, host, scheme, request_headers,
                response_status, response_headers, established_at_ms,
                closed_at_ms, close_code, close_reason, client_addr, destination
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            rusqlite::params![
                entry.id,
                entry.timestamp_ms,
                entry.url,
                entry.host,
                entry.scheme.as_str(),
                headers_to_json(&entry.request_headers),
                response_status,
                response_headers,
                entry.lifecycle.established_at_ms,
                entry.lifecycle.closed_at_ms,
                entry.lifecycle.close_code,
                entry.lifecycle.close_reason,
                entry.client_addr,
                entry.destination,
            ],
        )?;
        Ok(())
    }

    /// Record the close of a connection; fires once per connection (§3
    /// lifecycle: "mutated on close").
    pub fn update_websocket_close(
        &self,
        id: &str,
        closed_at_ms: i64,
        close_code: Option<u16>,
        close_reason: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE websocket_connections SET closed_at_ms = ?2, close_code = ?3, close_reason = ?4
             WHERE id = ?1",
            rusqlite::params![id, closed_at_ms, close_code, close_reason],
        )?;
        if updated == 0 {
            tracing::warn!(connection_id = %id, "update_websocket_close: no matching row");
        }
        Ok(())
    }

    /// Append one message to a connection. Foreign-keyed; violates
    /// integrity (and returns `IntegrityViolation`) if the parent
    /// connection does not exist.
    pub fn append_websocket_message(
        &self,
        connection_id: &str,
        message: &WebSocketMessage,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO websocket_messages (
                id, connection_id, timestamp_ms, direction, message_type, payload, byte_size
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                message.id,
                connection_id,
                message.timestamp_ms,
                message.direction.as_str(),
                message.message_type.as_str(),
                message.payload.as_ref().map(BodyPayload::to_storage_string),
                message.byte_size as i64,
            ],
        )
        .map_err(|e| match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::IntegrityViolation(format!(
                    "websocket connection {connection_id} does not exist"
                ))
            }
            _ => StoreError::from(e),
        })?;
        Ok(())
    }
}
