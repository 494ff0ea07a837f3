//! Configuration & validation (§4.A).
//!
//! A pure transformation from CLI-supplied values and environment defaults
//! to a validated [`ProxyConfig`]. No process-wide mutable state: the
//! binary builds one `ProxyConfig` value and threads it through
//! constructors (§9, "Global singleton config").

mod error;
mod probe;
mod validate;

pub use error::{ConfigError, ConfigWarning};
pub use probe::{probe_port_available, PortAvailability};
pub use validate::validate;

use std::path::PathBuf;

/// Well-known ports that warrant a (non-fatal) warning when configured.
pub const WELL_KNOWN_PORTS: &[u16] = &[80, 443, 3000, 8000, 8080, 9000];

/// Default maximum captured body size before the configured cap warning
/// fires: 100 MiB.
pub const LARGE_BODY_WARNING_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Proxy listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProxyGroup {
    pub http_port: u16,
    pub https_port: Option<u16>,
    pub enable_websockets: bool,
    pub enable_https: bool,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub ignore_host_https_errors: bool,
}

impl Default for ProxyGroup {
    fn default() -> Self {
        Self {
            http_port: 8080,
            https_port: None,
            enable_websockets: true,
            enable_https: true,
            cert_path: PathBuf::from("./certs/ca-cert.pem"),
            key_path: PathBuf::from("./certs/ca-key.pem"),
            ignore_host_https_errors: false,
        }
    }
}

/// Capture behavior configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CaptureGroup {
    pub capture_headers: bool,
    pub capture_body: bool,
    pub max_body_size: u64,
    pub capture_websocket_messages: bool,
}

impl Default for CaptureGroup {
    fn default() -> Self {
        Self {
            capture_headers: true,
            capture_body: true,
            max_body_size: 1_048_576,
            capture_websocket_messages: true,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StorageGroup {
    pub db_path: PathBuf,
    pub max_entries: u64,
    pub retention_days: u32,
    pub enable_fts: bool,
}

impl Default for StorageGroup {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./traffic.db"),
            max_entries: 100_000,
            retention_days: 7,
            enable_fts: true,
        }
    }
}

/// The validated configuration threaded through every other component (§3,
/// `ProxyConfig`).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProxyConfig {
    pub proxy: ProxyGroup,
    pub capture: CaptureGroup,
    pub storage: StorageGroup,
}

impl ProxyConfig {
    /// Run validation, returning the (possibly empty) error and warning
    /// lists without mutating `self`.
    pub fn validate(&self) -> (Vec<ConfigError>, Vec<ConfigWarning>) {
        validate::validate(self)
    }

    /// `true` if validation produced no hard errors.
    pub fn is_valid(&self) -> bool {
        self.validate().0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ProxyConfig::default();
        assert_eq!(cfg.proxy.http_port, 8080);
        assert!(cfg.proxy.https_port.is_none());
        assert!(cfg.proxy.enable_websockets);
        assert!(cfg.proxy.enable_https);
        assert_eq!(cfg.capture.max_body_size, 1_048_576);
        assert_eq!(cfg.storage.max_entries, 100_000);
        assert_eq!(cfg.storage.retention_days, 7);
        assert!(cfg.storage.enable_fts);
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = ProxyConfig::default();
        assert!(cfg.is_valid());
    }
}
