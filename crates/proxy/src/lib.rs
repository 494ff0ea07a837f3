//! Traffic MCP: an intercepting HTTP/HTTPS/WebSocket developer proxy with
//! an embedded capture store (spec §4).
//!
//! This crate wires together the three subsystems described by the
//! specification: the interception engine (`interceptor`), the health
//! supervisor (`health`), and the typed tool API exposed to an external
//! collaborator (`tools`). Persistence (`traffic-mcp-store`), the body
//! pipeline (`traffic-mcp-body`) and the query façade (`traffic-mcp-query`)
//! live in their own crates; this one owns sockets, TLS, and the
//! request/response/frame lifecycle.

pub mod ca;
pub mod correlation;
pub mod dns;
pub mod error;
pub mod health;
pub mod host;
pub mod interceptor;
pub mod stats;
pub mod tools;

pub use error::{ProxyError, ProxyResult};
pub use health::HealthSupervisor;
pub use interceptor::InterceptionEngine;
pub use stats::ProxyStats;
