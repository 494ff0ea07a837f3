//! HTTP/1.1 pathway (§4.D "HTTP/1.1 pathway").
//!
//! Shared by the plaintext listener and, after the CONNECT/TLS handshake in
//! `https.rs`, by the intercepted HTTPS listener — both terminate into the
//! same request/response forwarding loop over whatever byte stream they
//! hand us.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{CONNECTION, UPGRADE};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use traffic_mcp_body::process_body;
use traffic_mcp_common::{new_capture_id, now_ms};
use traffic_mcp_store::{
    HeaderList, HttpResponseRecord, HttpScheme, HttpTransaction,
};

use crate::correlation::CorrelationEntry;
use crate::error::ProxyResult;
use crate::host::parse_host_header;

use super::engine::SharedContext;
use super::websocket;

const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn store_scheme(self) -> HttpScheme {
        match self {
            Scheme::Http => HttpScheme::Http,
            Scheme::Https => HttpScheme::Https,
        }
    }
}

/// Serve one accepted connection until the client closes it or an upgrade
/// request hands the raw stream over to the WebSocket pathway.
pub async fn handle_connection<S>(
    stream: S,
    peer_addr: SocketAddr,
    ctx: Arc<SharedContext>,
    scheme: Scheme,
) -> ProxyResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let ctx = ctx.clone();
        async move { handle_request(req, peer_addr, ctx, scheme).await }
    });

    http1::Builder::new()
        .serve_connection(io, service)
        .with_upgrades()
        .await
        .map_err(|e| crate::error::ProxyError::Upstream(e.to_string()))?;

    Ok(())
}

fn is_websocket_upgrade(req: &Request<Incoming>) -> bool {
    let has_upgrade_token = req
        .headers()
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("upgrade"))
        .unwrap_or(false);
    let is_websocket = req
        .headers()
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    has_upgrade_token && is_websocket
}

async fn handle_request(
    req: Request<Incoming>,
    peer_addr: SocketAddr,
    ctx: Arc<SharedContext>,
    scheme: Scheme,
) -> Result<Response<Full<Bytes>>, Infallible> {
    ctx.stats.record_request();

    if is_websocket_upgrade(&req) {
        match websocket::upgrade_and_tunnel(req, peer_addr, ctx.clone(), scheme).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                warn!(error = %e, "websocket upgrade failed");
                return Ok(error_response(StatusCode::BAD_GATEWAY, "websocket upgrade failed"));
            }
        }
    }

    match forward_request(req, peer_addr, &ctx, scheme).await {
        Ok(response) => Ok(response),
        Err(e) => {
            warn!(error = %e, "request forwarding failed");
            Ok(error_response(StatusCode::BAD_GATEWAY, "upstream error"))
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(message.to_string())))
        .expect("static error response is always valid")
}

fn headers_to_header_list(headers: &http::HeaderMap) -> HeaderList {
    let mut list = HeaderList::new();
    for (name, value) in headers.iter() {
        list.push(name.as_str(), value.to_str().unwrap_or_default());
    }
    list
}

async fn forward_request(
    req: Request<Incoming>,
    peer_addr: SocketAddr,
    ctx: &Arc<SharedContext>,
    scheme: Scheme,
) -> ProxyResult<Response<Full<Bytes>>> {
    let capture_start = Instant::now();
    let timestamp_ms = now_ms();
    let internal_id = new_capture_id();

    let (parts, body) = req.into_parts();
    let host_header = parts
        .headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let parsed_host = parse_host_header(host_header);

    let method = parts.method.to_string();
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or_default().to_string();
    let url = parts.uri.to_string();
    let content_type = parts
        .headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let content_encoding = parts
        .headers
        .get(http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let user_agent = parts
        .headers
        .get(http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let request_headers = if ctx.config.capture.capture_headers {
        headers_to_header_list(&parts.headers)
    } else {
        HeaderList::new()
    };

    let upstream_addr = ctx
        .dns
        .resolve(&parsed_host.hostname)
        .await
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| crate::dns::UNKNOWN_DESTINATION.to_string());

    let request_bytes = body
        .collect()
        .await
        .map_err(|e| crate::error::ProxyError::Upstream(e.to_string()))?
        .to_bytes();

    let request_body_payload = if ctx.config.capture.capture_body {
        let outcome = process_body(
            &request_bytes,
            content_type.as_deref(),
            content_encoding.as_deref(),
            ctx.config.capture.max_body_size,
        )
        .await;
        outcome.payload
    } else {
        None
    };

    ctx.correlation.insert(
        internal_id.clone(),
        CorrelationEntry { internal_id: internal_id.clone(), capture_start_ms: timestamp_ms },
    );

    let transaction = HttpTransaction {
        id: internal_id.clone(),
        timestamp_ms,
        method: method.clone(),
        url: url.clone(),
        host: parsed_host.hostname.clone(),
        path,
        query,
        scheme: scheme.store_scheme(),
        request_headers,
        request_body: request_body_payload,
        request_body_size: request_bytes.len() as u64,
        content_type: content_type.clone(),
        user_agent,
        client_addr: peer_addr.to_string(),
        upstream_addr: Some(upstream_addr),
        error_message: None,
        response: None,
    };
    ctx.store.store_http_transaction(&transaction)?;

    let upstream_port = parsed_host.port.unwrap_or(match scheme {
        Scheme::Http => 80,
        Scheme::Https => 443,
    });

    let upstream_uri: http::Uri = format!(
        "http://{}:{}{}",
        parsed_host.hostname,
        upstream_port,
        parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    )
    .parse()
    .map_err(|e| crate::error::ProxyError::InvalidArgument(format!("bad upstream uri: {e}")))?;

    let mut upstream_req = Request::builder().method(parts.method.clone()).uri(upstream_uri);
    for (name, value) in parts.headers.iter() {
        if name == http::header::CONNECTION || name.as_str().eq_ignore_ascii_case("proxy-connection") {
            continue;
        }
        upstream_req = upstream_req.header(name, value);
    }
    let upstream_req = upstream_req
        .body(Full::new(request_bytes))
        .map_err(|e| crate::error::ProxyError::InvalidArgument(e.to_string()))?;

    let upstream_result = tokio::time::timeout(UPSTREAM_CONNECT_TIMEOUT, ctx.client.request(upstream_req)).await;

    ctx.correlation.take(&internal_id);

    let response_time_ms = capture_start.elapsed().as_millis() as u64;

    let upstream_resp = match upstream_result {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            ctx.store.store_http_error(&internal_id, &e.to_string())?;
            return Ok(error_response(StatusCode::BAD_GATEWAY, "upstream connect failed"));
        }
        Err(_) => {
            ctx.store.store_http_error(&internal_id, "upstream connect timed out")?;
            return Ok(error_response(StatusCode::GATEWAY_TIMEOUT, "upstream timed out"));
        }
    };

    let status = upstream_resp.status();
    let status_message = status.canonical_reason().unwrap_or("").to_string();
    let response_headers = if ctx.config.capture.capture_headers {
        headers_to_header_list(upstream_resp.headers())
    } else {
        HeaderList::new()
    };
    let resp_content_type = upstream_resp
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let resp_content_encoding = upstream_resp
        .headers()
        .get(http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (resp_parts, resp_body) = upstream_resp.into_parts();
    let response_bytes = resp_body
        .collect()
        .await
        .map_err(|e| crate::error::ProxyError::Upstream(e.to_string()))?
        .to_bytes();

    let response_body_payload = if ctx.config.capture.capture_body {
        let outcome = process_body(
            &response_bytes,
            resp_content_type.as_deref(),
            resp_content_encoding.as_deref(),
            ctx.config.capture.max_body_size,
        )
        .await;
        outcome.payload
    } else {
        None
    };

    let record = HttpResponseRecord {
        status_code: status.as_u16(),
        status_message,
        headers: response_headers,
        body: response_body_payload,
        body_size: response_bytes.len() as u64,
        response_time_ms,
    };
    ctx.store.update_http_response(&internal_id, &record)?;

    debug!(transaction_id = %internal_id, status = status.as_u16(), %url, "captured transaction");

    let mut client_resp = Response::builder().status(resp_parts.status);
    for (name, value) in resp_parts.headers.iter() {
        if name == http::header::CONNECTION {
            continue;
        }
        client_resp = client_resp.header(name, value);
    }
    client_resp
        .body(Full::new(response_bytes))
        .map_err(|e| crate::error::ProxyError::InvalidArgument(e.to_string()))
}
