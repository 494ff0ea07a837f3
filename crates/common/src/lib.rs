//! Shared types, error building blocks and observability helpers for the
//! Traffic MCP proxy.
//!
//! This crate has no knowledge of sockets, TLS, or SQL — it only defines the
//! vocabulary every other crate in the workspace shares: the capture id
//! format, the `BodyPayload` tagged value, and a `tracing` initialization
//! helper used by the binary.

pub mod body;
pub mod errors;
pub mod ids;
pub mod observability;

pub use body::BodyPayload;
pub use errors::{CoreError, CoreResult};
pub use ids::new_capture_id;
pub use observability::init_tracing;
