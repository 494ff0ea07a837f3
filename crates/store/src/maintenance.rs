//! Maintenance operations (§4.B): retention deletes, vacuum, FTS rebuild
//! and repair.

use crate::error::StoreResult;
use crate::schema;
use crate::Store;

impl Store {
    /// Delete everything captured strictly before `timestamp_ms`, cascading
    /// messages -> connections -> HTTP rows (§4.B). A single transaction so
    /// a crash mid-delete cannot leave orphaned messages.
    pub fn delete_before(&self, timestamp_ms: i64) -> StoreResult<()> {
        self.delete_range(i64::MIN, timestamp_ms)
    }

    /// Delete everything captured in `[start_ms, end_ms]` inclusive (§9:
    /// implemented as a real ranged delete, not the source's year-2000
    /// special case).
    pub fn delete_between(&self, start_ms: i64, end_ms: i64) -> StoreResult<()> {
        self.delete_range(start_ms, end_ms)
    }

    fn delete_range(&self, start_ms: i64, end_ms: i64) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM websocket_messages WHERE connection_id IN (
                SELECT id FROM websocket_connections WHERE timestamp_ms BETWEEN ?1 AND ?2
            )",
            rusqlite::params![start_ms, end_ms],
        )?;
        tx.execute(
            "DELETE FROM websocket_connections WHERE timestamp_ms BETWEEN ?1 AND ?2",
            rusqlite::params![start_ms, end_ms],
        )?;
        tx.execute(
            "DELETE FROM http_traffic WHERE timestamp_ms BETWEEN ?1 AND ?2",
            rusqlite::params![start_ms, end_ms],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delete every captured row, unconditionally (`clear_all_logs`, §6;
    /// requires `confirm: true` at the tool-API layer, not here).
    pub fn clear_all(&self) -> StoreResult<()> {
        self.delete_range(i64::MIN, i64::MAX)
    }

    /// Compact database pages (`VACUUM`).
    pub fn vacuum(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch("VACUUM;")?;
        Ok(())
    }

    /// Repopulate both FTS virtual tables from their content tables,
    /// without touching triggers (used on cold-open when the FTS tables
    /// are detected stale).
    pub fn rebuild_fts(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "INSERT INTO http_traffic_fts(http_traffic_fts) VALUES ('rebuild');
             INSERT INTO websocket_traffic_fts(websocket_traffic_fts) VALUES ('rebuild');",
        )?;
        Ok(())
    }

    /// Drop and recreate both FTS tables and all six coherence triggers,
    /// then rebuild content (§4.B repair routine). Exposed as a first-class
    /// operation independent of any cold-open auto-invocation.
    pub fn repair_fts(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        schema::drop_fts_and_triggers(&conn)?;
        schema::create_fts_tables(&conn)?;
        schema::create_triggers(&conn)?;
        drop(conn);
        self.rebuild_fts()
    }

    /// Row counts used by retention policy and the tool API's status
    /// reporting; not part of §4.B's formal write/read surface but a
    /// natural companion to `maxEntries` being advisory.
    pub fn count_http(&self) -> StoreResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT count(*) FROM http_traffic", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    pub fn count_websocket_connections(&self) -> StoreResult<u64> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT count(*) FROM websocket_connections", [], |r| r.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_transaction;

    #[test]
    fn delete_before_removes_old_rows_only() {
        let store = Store::open_in_memory().unwrap();
        store.store_http_transaction(&sample_transaction("old", 100)).unwrap();
        store.store_http_transaction(&sample_transaction("new", 2000)).unwrap();

        store.delete_before(1000).unwrap();

        assert!(store.get_http_transaction("old").unwrap().is_none());
        assert!(store.get_http_transaction("new").unwrap().is_some());
    }

    #[test]
    fn delete_between_is_a_real_ranged_delete() {
        let store = Store::open_in_memory().unwrap();
        store.store_http_transaction(&sample_transaction("a", 500)).unwrap();
        store.store_http_transaction(&sample_transaction("b", 1500)).unwrap();
        store.store_http_transaction(&sample_transaction("c", 2500)).unwrap();

        // A range entirely after year-2000-epoch-ms, which the source's
        // degenerate implementation could not express at all.
        store.delete_between(1000, 2000).unwrap();

        assert!(store.get_http_transaction("a").unwrap().is_some());
        assert!(store.get_http_transaction("b").unwrap().is_none());
        assert!(store.get_http_transaction("c").unwrap().is_some());
    }

    #[test]
    fn rebuild_fts_is_idempotent_and_keeps_content_searchable() {
        let store = Store::open_in_memory().unwrap();
        let mut txn = sample_transaction("findme", 1);
        txn.url = "http://example.com/findable-path".into();
        store.store_http_transaction(&txn).unwrap();

        store.rebuild_fts().unwrap();
        let results = store.search_http_fts("findable").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "findme");
    }

    #[test]
    fn repair_fts_restores_search_after_corruption_style_drop() {
        let store = Store::open_in_memory().unwrap();
        let mut txn = sample_transaction("repairable", 1);
        txn.url = "http://example.com/repair-target".into();
        store.store_http_transaction(&txn).unwrap();

        store.repair_fts().unwrap();
        let results = store.search_http_fts("repair").unwrap();
        assert_eq!(results.len(), 1);
    }
}
