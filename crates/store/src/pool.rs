//! Connection pool setup: WAL journal mode for concurrent readers with a
//! single active writer, foreign keys enforced, prepared statements reused
//! by `rusqlite`'s cache (§4.B "Concurrency").

use std::path::Path;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use crate::error::StoreResult;
use crate::schema;

pub type Pool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Register the `regexp(pattern, text)` scalar function used by the regex
/// path of the LIKE fallback search (§4.F: "Regex search is implemented
/// only in the LIKE path"). SQLite's `REGEXP` operator dispatches to
/// whatever function named `regexp` is registered on the connection.
fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: String = ctx.get(0)?;
            let text: String = ctx.get(1)?;
            let re = regex::Regex::new(&pattern).map_err(|e| {
                rusqlite::Error::UserFunctionError(Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    e.to_string(),
                )))
            })?;
            Ok(re.is_match(&text))
        },
    )
}

/// Open (creating if absent) the database at `path` and return a connection
/// pool with the schema applied.
pub fn open(path: &Path) -> StoreResult<Pool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        register_regexp(conn)?;
        Ok(())
    });

    let pool = r2d2::Pool::builder()
        .max_size(8)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)
        .map_err(crate::error::StoreError::from)?;

    let conn = pool.get().map_err(crate::error::StoreError::from)?;
    schema::create_schema(&conn)?;

    Ok(pool)
}

/// Open a private in-memory database, used by tests.
#[cfg(any(test, feature = "test-util"))]
pub fn open_in_memory() -> StoreResult<Pool> {
    let manager = SqliteConnectionManager::memory().with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        register_regexp(conn)?;
        Ok(())
    });
    let pool = r2d2::Pool::builder()
        .max_size(1) // a private in-memory db only exists on one connection
        .build(manager)
        .map_err(crate::error::StoreError::from)?;
    let conn = pool.get().map_err(crate::error::StoreError::from)?;
    schema::create_schema(&conn)?;
    Ok(pool)
}
