//! Engine lifecycle: listeners, accept loops, graceful shutdown (§4.D).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use http_body_util::Full;
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use traffic_mcp_config::ProxyConfig;
use traffic_mcp_store::Store;

use crate::ca::CertificateAuthority;
use crate::correlation::CorrelationMap;
use crate::dns::DnsCache;
use crate::error::{ProxyError, ProxyResult};
use crate::health::StorageWritableFlag;
use crate::stats::{ProxyStats, StatsSnapshot};

use super::{http, https};

type UpstreamClient = Client<HttpConnector, Full<Bytes>>;

/// How long the engine waits for in-flight transactions to finish on a
/// graceful stop before force-closing (§4.D "Cancellation & shutdown").
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Everything a per-connection task needs, shared across the whole engine.
pub(crate) struct SharedContext {
    pub config: ProxyConfig,
    pub store: Store,
    pub dns: DnsCache,
    pub correlation: CorrelationMap,
    pub stats: ProxyStats,
    pub ca: Option<Arc<CertificateAuthority>>,
    pub client: UpstreamClient,
    pub storage_flag: StorageWritableFlag,
    pub shutdown: watch::Receiver<bool>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub http_port: u16,
    pub https_port: Option<u16>,
    pub stats: StatsSnapshot,
}

pub struct InterceptionEngine {
    config: ProxyConfig,
    store: Store,
    ca: Option<Arc<CertificateAuthority>>,
    dns: DnsCache,
    correlation: CorrelationMap,
    stats: ProxyStats,
    storage_flag: StorageWritableFlag,
    running: Arc<AtomicBool>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl InterceptionEngine {
    pub fn new(
        config: ProxyConfig,
        store: Store,
        ca: Option<Arc<CertificateAuthority>>,
        storage_flag: StorageWritableFlag,
    ) -> Self {
        Self {
            config,
            store,
            ca,
            dns: DnsCache::new(),
            correlation: CorrelationMap::new(),
            stats: ProxyStats::new(),
            storage_flag,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn stats(&self) -> ProxyStats {
        self.stats.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running: self.is_running(),
            http_port: self.config.proxy.http_port,
            https_port: self.config.proxy.https_port,
            stats: self.stats.snapshot(),
        }
    }

    /// Bind listeners and spawn the accept loops. Idempotent: calling
    /// `start` while already running is a no-op.
    pub async fn start(&self) -> ProxyResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        let client: UpstreamClient = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let ctx = Arc::new(SharedContext {
            config: self.config.clone(),
            store: self.store.clone(),
            dns: self.dns.clone(),
            correlation: self.correlation.clone(),
            stats: self.stats.clone(),
            ca: self.ca.clone(),
            client,
            storage_flag: self.storage_flag.clone(),
            shutdown: shutdown_rx.clone(),
        });

        let http_addr: SocketAddr = ([0, 0, 0, 0], self.config.proxy.http_port).into();
        let http_listener = TcpListener::bind(http_addr)
            .await
            .map_err(|e| ProxyError::EngineFailure(format!("bind {http_addr}: {e}")))?;
        info!(%http_addr, "listening for plaintext HTTP");

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(accept_loop(http_listener, ctx.clone(), false)));

        if self.config.proxy.enable_https {
            match self.config.proxy.https_port {
                Some(port) => {
                    let https_addr: SocketAddr = ([0, 0, 0, 0], port).into();
                    let https_listener = TcpListener::bind(https_addr).await.map_err(|e| {
                        ProxyError::EngineFailure(format!("bind {https_addr}: {e}"))
                    })?;
                    info!(%https_addr, "listening for intercepted HTTPS");
                    tasks.push(tokio::spawn(accept_loop(https_listener, ctx.clone(), true)));
                }
                None => {
                    warn!("HTTPS enabled but no httpsPort configured; HTTPS listener not started");
                }
            }
        }

        Ok(())
    }

    /// Stop accepting new connections, wait a grace period for in-flight
    /// work, then drop state. Clears the correlation map (§4.D).
    pub async fn stop(&self) -> ProxyResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(true);
        }

        let mut tasks = self.tasks.lock().await;
        let handles: Vec<_> = tasks.drain(..).collect();
        drop(tasks);

        let join_accept_loops = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, join_accept_loops).await.is_err() {
            warn!("accept loops did not stop within the grace period");
        }

        // Accept loops have stopped; wait out the remaining grace period for
        // in-flight per-connection tasks (each decrements active_connections
        // on completion), then abandon whatever is still running.
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while self.stats.snapshot().active_connections > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        if self.stats.snapshot().active_connections > 0 {
            warn!(
                active = self.stats.snapshot().active_connections,
                "shutdown grace period elapsed; remaining connections abandoned"
            );
        }

        self.correlation.clear();
        info!("interception engine stopped");
        Ok(())
    }

    pub async fn restart(&self) -> ProxyResult<()> {
        self.stop().await?;
        self.start().await
    }
}

async fn accept_loop(listener: TcpListener, ctx: Arc<SharedContext>, tls: bool) {
    let mut shutdown = ctx.shutdown.clone();
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(tls, "accept loop stopping: shutdown signaled");
                    return;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        ctx.stats.connection_opened();
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            let result = if tls {
                                https::handle_connection(stream, peer_addr, ctx.clone()).await
                            } else {
                                http::handle_connection(stream, peer_addr, ctx.clone(), http::Scheme::Http).await
                            };
                            if let Err(e) = result {
                                error!(%peer_addr, error = %e, "connection handler failed");
                            }
                            ctx.stats.connection_closed();
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        }
    }
}
