//! Config validation error/warning vocabulary.

use thiserror::Error;

/// Fatal configuration problems (§4.A).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("port {0} is outside the valid range [1, 65535]")]
    PortOutOfRange(u32),

    #[error("httpPort and httpsPort must not be equal (both {0})")]
    PortsEqual(u16),

    #[error("database path must not be empty")]
    EmptyDatabasePath,

    #[error("max body size must not be negative (got {0})")]
    NegativeBodySize(i64),
}

/// Non-fatal configuration problems (§4.A).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// HTTPS is enabled but the configured cert/key files are missing; a CA
    /// will be generated on startup.
    MissingCertOrKey,
    /// `max_body_size` exceeds 100 MiB.
    LargeBodySize(u64),
    /// A configured port is one of the well-known conflict-prone ports.
    WellKnownPort(u16),
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingCertOrKey => {
                write!(f, "cert/key files not found; a CA will be generated")
            }
            ConfigWarning::LargeBodySize(n) => {
                write!(f, "max body size {n} bytes exceeds 100 MiB")
            }
            ConfigWarning::WellKnownPort(p) => {
                write!(f, "port {p} is a well-known port and may conflict")
            }
        }
    }
}
