//! Schema: three base tables, two FTS5 virtual tables, six coherence
//! triggers, and the indices of §4.B. Creation is idempotent (`IF NOT
//! EXISTS` throughout) so it is safe to run against an existing database.

use rusqlite::Connection;

use crate::error::StoreResult;

const CREATE_HTTP_TRAFFIC: &str = "
CREATE TABLE IF NOT EXISTS http_traffic (
    id                  TEXT PRIMARY KEY,
    timestamp_ms        INTEGER NOT NULL,
    method              TEXT NOT NULL,
    url                 TEXT NOT NULL,
    host                TEXT NOT NULL,
    path                TEXT NOT NULL,
    query               TEXT NOT NULL,
    scheme              TEXT NOT NULL,
    request_headers     TEXT NOT NULL,
    request_body        TEXT,
    request_body_size   INTEGER NOT NULL,
    content_type        TEXT,
    user_agent          TEXT,
    client_addr         TEXT NOT NULL,
    upstream_addr       TEXT,
    error_message       TEXT,
    status_code         INTEGER,
    status_message      TEXT,
    response_headers    TEXT,
    response_body       TEXT,
    response_body_size  INTEGER,
    response_time_ms    INTEGER
);
";

const CREATE_WS_CONNECTIONS: &str = "
CREATE TABLE IF NOT EXISTS websocket_connections (
    id                  TEXT PRIMARY KEY,
    timestamp_ms        INTEGER NOT NULL,
    url                 TEXT NOT NULL,
    host                TEXT NOT NULL,
    scheme              TEXT NOT NULL,
    request_headers     TEXT NOT NULL,
    response_status     INTEGER,
    response_headers    TEXT,
    established_at_ms   INTEGER NOT NULL,
    closed_at_ms        INTEGER,
    close_code          INTEGER,
    close_reason        TEXT,
    client_addr         TEXT NOT NULL,
    destination         TEXT NOT NULL
);
";

const CREATE_WS_MESSAGES: &str = "
CREATE TABLE IF NOT EXISTS websocket_messages (
    id                  TEXT NOT NULL,
    connection_id       TEXT NOT NULL REFERENCES websocket_connections(id) ON DELETE CASCADE,
    timestamp_ms        INTEGER NOT NULL,
    direction           TEXT NOT NULL,
    message_type        TEXT NOT NULL,
    payload             TEXT,
    byte_size           INTEGER NOT NULL,
    PRIMARY KEY (connection_id, id)
);
";

const CREATE_HTTP_FTS: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS http_traffic_fts USING fts5(
    id, url, request_headers, request_body, response_body,
    content='http_traffic',
    content_rowid='rowid'
);
";

const CREATE_WS_FTS: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS websocket_traffic_fts USING fts5(
    id, url, headers,
    content='websocket_connections',
    content_rowid='rowid'
);
";

const INDICES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_http_timestamp ON http_traffic(timestamp_ms);",
    "CREATE INDEX IF NOT EXISTS idx_http_host ON http_traffic(host);",
    "CREATE INDEX IF NOT EXISTS idx_http_method ON http_traffic(method);",
    "CREATE INDEX IF NOT EXISTS idx_http_status ON http_traffic(status_code);",
    "CREATE INDEX IF NOT EXISTS idx_ws_timestamp ON websocket_connections(timestamp_ms);",
    "CREATE INDEX IF NOT EXISTS idx_ws_host ON websocket_connections(host);",
    "CREATE INDEX IF NOT EXISTS idx_ws_protocol ON websocket_connections(scheme);",
    "CREATE INDEX IF NOT EXISTS idx_wsmsg_connection ON websocket_messages(connection_id);",
    "CREATE INDEX IF NOT EXISTS idx_wsmsg_timestamp ON websocket_messages(timestamp_ms);",
];

/// Names of the six FTS-coherence triggers, used by the repair routine to
/// drop them unconditionally before recreating everything.
pub const TRIGGER_NAMES: &[&str] = &[
    "http_traffic_ai",
    "http_traffic_au",
    "http_traffic_ad",
    "websocket_connections_ai",
    "websocket_connections_au",
    "websocket_connections_ad",
];

fn http_triggers() -> String {
    format!(
        "
CREATE TRIGGER IF NOT EXISTS http_traffic_ai AFTER INSERT ON http_traffic BEGIN
    INSERT INTO http_traffic_fts(rowid, id, url, request_headers, request_body, response_body)
    VALUES (new.rowid, new.id, new.url, new.request_headers, new.request_body, new.response_body);
END;

CREATE TRIGGER IF NOT EXISTS http_traffic_au AFTER UPDATE ON http_traffic BEGIN
    INSERT INTO http_traffic_fts(http_traffic_fts, rowid, id, url, request_headers, request_body, response_body)
    VALUES ('delete', old.rowid, old.id, old.url, old.request_headers, old.request_body, old.response_body);
    INSERT INTO http_traffic_fts(rowid, id, url, request_headers, request_body, response_body)
    VALUES (new.rowid, new.id, new.url, new.request_headers, new.request_body, new.response_body);
END;

CREATE TRIGGER IF NOT EXISTS http_traffic_ad AFTER DELETE ON http_traffic BEGIN
    INSERT INTO http_traffic_fts(http_traffic_fts, rowid, id, url, request_headers, request_body, response_body)
    VALUES ('delete', old.rowid, old.id, old.url, old.request_headers, old.request_body, old.response_body);
END;
"
    )
}

fn ws_triggers() -> String {
    format!(
        "
CREATE TRIGGER IF NOT EXISTS websocket_connections_ai AFTER INSERT ON websocket_connections BEGIN
    INSERT INTO websocket_traffic_fts(rowid, id, url, headers)
    VALUES (new.rowid, new.id, new.url, new.request_headers);
END;

CREATE TRIGGER IF NOT EXISTS websocket_connections_au AFTER UPDATE ON websocket_connections BEGIN
    INSERT INTO websocket_traffic_fts(websocket_traffic_fts, rowid, id, url, headers)
    VALUES ('delete', old.rowid, old.id, old.url, old.request_headers);
    INSERT INTO websocket_traffic_fts(rowid, id, url, headers)
    VALUES (new.rowid, new.id, new.url, new.request_headers);
END;

CREATE TRIGGER IF NOT EXISTS websocket_connections_ad AFTER DELETE ON websocket_connections BEGIN
    INSERT INTO websocket_traffic_fts(websocket_traffic_fts, rowid, id, url, headers)
    VALUES ('delete', old.rowid, old.id, old.url, old.request_headers);
END;
"
    )
}

/// Create the full schema (tables, indices, FTS tables, triggers) if it
/// does not already exist.
pub fn create_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(CREATE_HTTP_TRAFFIC)?;
    conn.execute_batch(CREATE_WS_CONNECTIONS)?;
    conn.execute_batch(CREATE_WS_MESSAGES)?;

    for stmt in INDICES {
        conn.execute_batch(stmt)?;
    }

    create_fts_tables(conn)?;
    create_triggers(conn)?;
    Ok(())
}

pub fn create_fts_tables(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(CREATE_HTTP_FTS)?;
    conn.execute_batch(CREATE_WS_FTS)?;
    Ok(())
}

pub fn create_triggers(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(&http_triggers())?;
    conn.execute_batch(&ws_triggers())?;
    Ok(())
}

/// Drop both FTS virtual tables and all six coherence triggers. Used by the
/// repair routine (§4.B) before recreating them and rebuilding content.
pub fn drop_fts_and_triggers(conn: &Connection) -> StoreResult<()> {
    for name in TRIGGER_NAMES {
        conn.execute_batch(&format!("DROP TRIGGER IF EXISTS {name};"))?;
    }
    conn.execute_batch("DROP TABLE IF EXISTS http_traffic_fts;")?;
    conn.execute_batch("DROP TABLE IF EXISTS websocket_traffic_fts;")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let conn = open_memory();
        // Second call must not fail thanks to IF NOT EXISTS everywhere.
        create_schema(&conn).unwrap();
    }

    #[test]
    fn repair_drops_and_recreates_cleanly() {
        let conn = open_memory();
        drop_fts_and_triggers(&conn).unwrap();
        create_fts_tables(&conn).unwrap();
        create_triggers(&conn).unwrap();
    }
}
