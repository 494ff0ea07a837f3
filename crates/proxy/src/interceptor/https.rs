//! HTTPS pathway (§4.D "HTTPS pathway").
//!
//! The HTTPS listener terminates TLS directly (no CONNECT tunnel): a
//! per-SNI leaf certificate is issued by the CA and the decrypted stream is
//! handed to the same HTTP/1.1 forwarding loop `http.rs` runs for plaintext
//! connections, with `Scheme::Https` recorded on the transaction.
//!
//! The leaf to present depends on the SNI name, which is only known after
//! peeking the ClientHello — so the handshake uses `LazyConfigAcceptor`
//! rather than a `ResolvesServerCert` impl, keeping leaf issuance (async,
//! since it may go through the CA's issuance lock) out of a sync trait
//! method.

use std::net::SocketAddr;
use std::sync::Arc;

use rustls::ServerConfig;
use tokio::net::TcpStream;
use tokio_rustls::{LazyConfigAcceptor, rustls::server::Acceptor};
use tracing::warn;

use crate::error::{ProxyError, ProxyResult};
use crate::host::parse_host_header;

use super::engine::SharedContext;
use super::http::{self, Scheme};

pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: Arc<SharedContext>,
) -> ProxyResult<()> {
    let Some(ca) = ctx.ca.clone() else {
        return Err(ProxyError::EngineFailure(
            "HTTPS listener active without a loaded CA".into(),
        ));
    };

    let handshake = LazyConfigAcceptor::new(Acceptor::default(), stream)
        .await
        .map_err(|e| {
            warn!(%peer_addr, error = %e, "TLS handshake start failed");
            ProxyError::Upstream(format!("TLS handshake start: {e}"))
        })?;

    let sni_host = handshake
        .client_hello()
        .server_name()
        .map(|s| s.to_string())
        .unwrap_or_else(|| parse_host_header(&peer_addr.ip().to_string()).hostname);

    let leaf = ca.leaf_for(&sni_host).await?;
    let mut server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![leaf.cert_der.clone()], leaf.private_key())
        .map_err(|e| ProxyError::EngineFailure(format!("TLS config for {sni_host}: {e}")))?;
    server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    let tls_stream = handshake
        .into_stream(Arc::new(server_config))
        .await
        .map_err(|e| {
            warn!(%peer_addr, %sni_host, error = %e, "TLS handshake completion failed");
            ProxyError::Upstream(format!("TLS handshake: {e}"))
        })?;

    http::handle_connection(tls_stream, peer_addr, ctx, Scheme::Https).await
}
