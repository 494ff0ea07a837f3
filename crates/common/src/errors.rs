//! Cross-crate error vocabulary.
//!
//! Individual crates define their own `thiserror` enums at their own seams
//! (`StoreError`, `BodyPipelineError`, `InterceptError`, ...). `CoreError`
//! is the narrow set of error kinds shared across more than one of them, so
//! call sites that aggregate several subsystems (the tool API, the CLI) have
//! one vocabulary to match on instead of per-crate enums.

use thiserror::Error;

/// Error kinds shared across the interception engine, store and query
/// façade, matching §7 of the specification.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration or tool input violates a stated constraint.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An id lookup yielded no row.
    #[error("not found: {0}")]
    NotFound(String),

    /// A foreign key or unique constraint was violated.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// Disk I/O or corruption made the store unavailable for this operation.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// DNS failure, TCP refusal, upstream TLS error or upstream timeout.
    #[error("upstream error: {0}")]
    UpstreamError(String),

    /// Body decompression failed; capture proceeds as a binary downgrade.
    #[error("decoding error: {0}")]
    DecodingError(String),

    /// Unrecoverable internal error in the interception engine.
    #[error("engine failure: {0}")]
    EngineFailure(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
