//! Thin CLI collaborator (§6 "CLI surface").
//!
//! Turns flags into a [`ProxyConfig`], builds the Store, CA, interception
//! engine and health supervisor, auto-starts the engine unless told not to,
//! and drives a signal-based graceful shutdown. Does not implement a
//! JSON-RPC dispatcher — that's out of scope (§1); `traffic_mcp_proxy::tools`
//! is the typed surface a dispatcher would call into.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use traffic_mcp_config::{ProxyConfig, CaptureGroup, ProxyGroup, StorageGroup};
use traffic_mcp_proxy::ca::CertificateAuthority;
use traffic_mcp_proxy::health::{HealthSupervisor, StorageWritableFlag};
use traffic_mcp_proxy::interceptor::InterceptionEngine;
use traffic_mcp_store::Store;

#[derive(Parser, Debug)]
#[command(name = "traffic-mcp-proxy", version, about = "Intercepting HTTP/HTTPS/WebSocket developer proxy")]
struct Cli {
    /// HTTP listener port.
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// HTTPS listener port (required if HTTPS is enabled).
    #[arg(long)]
    https_port: Option<u16>,

    /// Disable WebSocket interception.
    #[arg(long)]
    no_websockets: bool,

    /// Disable HTTPS interception.
    #[arg(long)]
    no_https: bool,

    /// CA certificate path.
    #[arg(long, default_value = "./certs/ca-cert.pem")]
    cert_path: PathBuf,

    /// CA private key path.
    #[arg(long, default_value = "./certs/ca-key.pem")]
    key_path: PathBuf,

    /// Suppress upstream TLS certificate validation errors.
    #[arg(long)]
    ignore_host_https_errors: bool,

    /// Disable header capture.
    #[arg(long)]
    no_capture_headers: bool,

    /// Disable body capture.
    #[arg(long)]
    no_capture_body: bool,

    /// Maximum captured body size in bytes.
    #[arg(long, default_value_t = 1_048_576)]
    max_body_size: u64,

    /// Disable WebSocket message capture.
    #[arg(long)]
    no_capture_websocket_messages: bool,

    /// SQLite database path.
    #[arg(long, default_value = "./traffic.db")]
    db_path: PathBuf,

    /// Advisory maximum row count.
    #[arg(long, default_value_t = 100_000)]
    max_entries: u64,

    /// Retention window in days for scheduled cleanup.
    #[arg(long, default_value_t = 7)]
    retention_days: u32,

    /// Disable full-text search indexing.
    #[arg(long)]
    no_fts: bool,

    /// Don't auto-start the proxy on launch.
    #[arg(long)]
    no_auto_start: bool,

    /// Emit JSON-formatted logs instead of human-readable text.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn into_config(self) -> ProxyConfig {
        ProxyConfig {
            proxy: ProxyGroup {
                http_port: self.http_port,
                https_port: self.https_port,
                enable_websockets: !self.no_websockets,
                enable_https: !self.no_https,
                cert_path: self.cert_path,
                key_path: self.key_path,
                ignore_host_https_errors: self.ignore_host_https_errors,
            },
            capture: CaptureGroup {
                capture_headers: !self.no_capture_headers,
                capture_body: !self.no_capture_body,
                max_body_size: self.max_body_size,
                capture_websocket_messages: !self.no_capture_websocket_messages,
            },
            storage: StorageGroup {
                db_path: self.db_path,
                max_entries: self.max_entries,
                retention_days: self.retention_days,
                enable_fts: !self.no_fts,
            },
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_logs = cli.json_logs;
    let auto_start = !cli.no_auto_start;
    let config = cli.into_config();

    traffic_mcp_common::init_tracing(json_logs);

    let (errors, warnings) = config.validate();
    for warning in &warnings {
        tracing::warn!(%warning, "configuration warning");
    }
    if !errors.is_empty() {
        for err in &errors {
            error!(%err, "configuration error");
        }
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config, auto_start)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ProxyConfig, auto_start: bool) -> anyhow::Result<()> {
    // Installing rustls's default crypto provider process-wide is required
    // exactly once before any `ServerConfig`/`ClientConfig` is built (the
    // HTTPS listener and the WebSocket-over-TLS upstream connector both
    // need one).
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let store = Store::open(&config.storage.db_path)?;

    let ca = if config.proxy.enable_https {
        Some(Arc::new(
            CertificateAuthority::load_or_generate(&config.proxy.cert_path, &config.proxy.key_path).await?,
        ))
    } else {
        None
    };

    let storage_flag = StorageWritableFlag::new();
    let engine = Arc::new(InterceptionEngine::new(config.clone(), store.clone(), ca.clone(), storage_flag.clone()));

    let listen_addr: std::net::SocketAddr = ([127, 0, 0, 1], config.proxy.http_port).into();
    let health = Arc::new(HealthSupervisor::new(listen_addr, storage_flag));

    if auto_start {
        engine.start().await?;
        info!(http_port = config.proxy.http_port, "traffic proxy started");
    }

    shutdown_signal().await;
    info!("shutdown signal received, draining connections");
    engine.stop().await?;
    let _ = health;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
