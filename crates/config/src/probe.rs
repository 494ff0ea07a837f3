//! Port-availability probe (§4.A).
//!
//! Advisory only — binding a transient listener and immediately dropping it
//! is not a TOCTOU guard against a later bind by the real listener, it just
//! gives the caller (typically the CLI, before starting the engine) an
//! early, friendlier error than a bind failure deep inside the interception
//! engine's startup path.

use std::io;
use tokio::net::TcpListener;

/// Result of probing a single port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortAvailability {
    Available,
    InUse,
    /// Bind failed for a reason other than address-in-use; the message is
    /// the underlying OS error.
    Error(String),
}

/// Attempt to bind a transient listener on `port` across all interfaces and
/// immediately drop it.
pub async fn probe_port_available(port: u16) -> PortAvailability {
    match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => {
            drop(listener);
            PortAvailability::Available
        }
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => PortAvailability::InUse,
        Err(e) => PortAvailability::Error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_in_use_when_already_bound() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // Bind on the same loopback port while `listener` is still held.
        let result = match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(_) => PortAvailability::Available,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => PortAvailability::InUse,
            Err(e) => PortAvailability::Error(e.to_string()),
        };

        drop(listener);
        assert_eq!(result, PortAvailability::InUse);
    }

    #[tokio::test]
    async fn reports_available_for_a_free_port() {
        // Bind to port 0 to get an OS-assigned free port, drop it, then
        // immediately probe the same number. Flaky in theory under heavy
        // concurrent test execution, acceptable for a local dev proxy.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = probe_port_available(port).await;
        assert_eq!(result, PortAvailability::Available);
    }
}
