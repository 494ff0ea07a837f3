//! Point lookup by id (§4.F "Point lookup by id").

use serde::Serialize;
use traffic_mcp_store::{HttpTransaction, WebSocketConnection, WebSocketMessage};

use crate::{QueryError, QueryFacade, QueryResult};

/// A single record fetched by id, HTTP-shaped or WebSocket-shaped
/// (including its messages, fetched as a follow-up once the connection
/// itself is found).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrafficDetail {
    Http(HttpTransaction),
    WebSocket {
        connection: WebSocketConnection,
        messages: Vec<WebSocketMessage>,
    },
}

impl QueryFacade {
    /// Look an id up first in `http_traffic`, then in
    /// `websocket_connections` (§4.F: "try HTTP table, then WS table").
    /// Neither hit yields `QueryError::NotFound`.
    pub fn get_by_id(&self, id: &str) -> QueryResult<TrafficDetail> {
        if let Some(txn) = self.store.get_http_transaction(id)? {
            return Ok(TrafficDetail::Http(txn));
        }
        if let Some(connection) = self.store.get_websocket_connection(id)? {
            let messages = self.store.get_websocket_messages(id)?;
            return Ok(TrafficDetail::WebSocket { connection, messages });
        }
        Err(QueryError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traffic_mcp_store::Store;

    #[test]
    fn missing_id_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let facade = QueryFacade::new(store);
        let err = facade.get_by_id("nope").unwrap_err();
        assert!(matches!(err, QueryError::NotFound(_)));
    }
}
