//! Interception-engine error vocabulary (§7).

use thiserror::Error;
use traffic_mcp_common::CoreError;
use traffic_mcp_store::StoreError;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    /// DNS failure, TCP refusal, upstream TLS error, or upstream timeout
    /// (§7 `UpstreamError`). Recorded on the transaction; the client sees a
    /// synthesized 502-class response rather than a dropped connection.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Unrecoverable internal error in the interception engine (§7
    /// `EngineFailure`). Escalates to the health supervisor.
    #[error("engine failure: {0}")]
    EngineFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProxyResult<T> = Result<T, ProxyError>;

impl From<traffic_mcp_query::QueryError> for ProxyError {
    fn from(err: traffic_mcp_query::QueryError) -> Self {
        match err {
            traffic_mcp_query::QueryError::InvalidArgument(s) => ProxyError::InvalidArgument(s),
            traffic_mcp_query::QueryError::NotFound(s) => ProxyError::NotFound(s),
            traffic_mcp_query::QueryError::Storage(e) => ProxyError::Storage(e),
        }
    }
}

impl From<CoreError> for ProxyError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidArgument(s) => ProxyError::InvalidArgument(s),
            CoreError::NotFound(s) => ProxyError::NotFound(s),
            CoreError::IntegrityViolation(s) => ProxyError::EngineFailure(s),
            CoreError::StorageUnavailable(s) => ProxyError::EngineFailure(s),
            CoreError::UpstreamError(s) => ProxyError::Upstream(s),
            CoreError::DecodingError(s) => ProxyError::EngineFailure(s),
            CoreError::EngineFailure(s) => ProxyError::EngineFailure(s),
        }
    }
}
