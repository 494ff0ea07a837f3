//! Query façade error vocabulary (§4.F "Failure").

use thiserror::Error;
use traffic_mcp_store::StoreError;

#[derive(Debug, Error)]
pub enum QueryError {
    /// Invalid input, detected before any query runs.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An id lookup yielded no row.
    #[error("not found: {0}")]
    NotFound(String),

    /// A storage error propagated unchanged from the store.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type QueryResult<T> = Result<T, QueryError>;
