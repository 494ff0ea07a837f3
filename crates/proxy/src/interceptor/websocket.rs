//! WebSocket pathway (§4.D "WebSocket pathway").
//!
//! The client-side handshake is taken over from the hyper request after a
//! `101 Switching Protocols` response is sent (`hyper::upgrade::on`); the
//! upstream leg uses `tokio-tungstenite`'s own client handshake. Once both
//! sides are WebSocket streams, frames are tunneled 1:1 and each is
//! recorded through the body pipeline before being forwarded.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, warn};

use traffic_mcp_body::{ws_binary_payload, ws_text_payload};
use traffic_mcp_common::{new_capture_id, now_ms};
use traffic_mcp_store::{
    Direction, HeaderList, WebSocketConnection, WebSocketLifecycle, WebSocketUpgradeResponse,
    WsMessageType, WsScheme,
};

use crate::error::{ProxyError, ProxyResult};
use crate::host::parse_host_header;

use super::engine::SharedContext;
use super::http::Scheme;

pub async fn upgrade_and_tunnel(
    req: Request<Incoming>,
    peer_addr: SocketAddr,
    ctx: Arc<SharedContext>,
    scheme: Scheme,
) -> ProxyResult<Response<Full<Bytes>>> {
    let sec_key = req
        .headers()
        .get("sec-websocket-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ProxyError::InvalidArgument("missing Sec-WebSocket-Key".into()))?
        .to_string();
    let accept_key = derive_accept_key(sec_key.as_bytes());

    let host_header = req
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let parsed_host = parse_host_header(host_header);
    let path_and_query = req.uri().path_and_query().map(|pq| pq.as_str().to_string()).unwrap_or_default();

    let ws_scheme = match scheme {
        Scheme::Http => WsScheme::Ws,
        Scheme::Https => WsScheme::Wss,
    };
    let upstream_url = format!(
        "{}://{}{}",
        ws_scheme.as_str(),
        host_header,
        path_and_query
    );

    let mut request_headers = HeaderList::new();
    if ctx.config.capture.capture_headers {
        for (name, value) in req.headers().iter() {
            request_headers.push(name.as_str(), value.to_str().unwrap_or_default());
        }
    }

    let connection_id = new_capture_id();
    let timestamp_ms = now_ms();
    let url = format!("{}://{}{}", ws_scheme.as_str(), parsed_host.hostname, path_and_query);

    let destination = ctx
        .dns
        .resolve(&parsed_host.hostname)
        .await
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| crate::dns::UNKNOWN_DESTINATION.to_string());

    let upstream_ws = connect_async(&upstream_url).await;
    let (upstream_stream, upgrade_status) = match upstream_ws {
        Ok((stream, response)) => (stream, response.status().as_u16()),
        Err(e) => {
            warn!(%upstream_url, error = %e, "websocket upstream handshake failed");
            let connection = WebSocketConnection {
                id: connection_id,
                timestamp_ms,
                url,
                host: parsed_host.hostname,
                scheme: ws_scheme,
                request_headers,
                response: None,
                lifecycle: WebSocketLifecycle { established_at_ms: timestamp_ms, ..Default::default() },
                client_addr: peer_addr.to_string(),
                destination,
            };
            ctx.store.store_websocket_upgrade(&connection)?;
            ctx.store.store_http_error(&connection.id, &format!("websocket upstream error: {e}"))?;
            return Ok(Response::builder()
                .status(StatusCode::BAD_GATEWAY)
                .body(Full::new(Bytes::from_static(b"websocket upstream unavailable")))
                .expect("static response"));
        }
    };

    ctx.stats.record_websocket_connection();

    let connection = WebSocketConnection {
        id: connection_id.clone(),
        timestamp_ms,
        url,
        host: parsed_host.hostname,
        scheme: ws_scheme,
        request_headers,
        response: Some(WebSocketUpgradeResponse { status: upgrade_status, headers: HeaderList::new() }),
        lifecycle: WebSocketLifecycle { established_at_ms: now_ms(), ..Default::default() },
        client_addr: peer_addr.to_string(),
        destination,
    };
    ctx.store.store_websocket_upgrade(&connection)?;

    let ctx_for_task = ctx.clone();
    let upgrade_fut = hyper::upgrade::on(req);

    tokio::spawn(async move {
        match upgrade_fut.await {
            Ok(upgraded) => {
                let io = TokioIo::new(upgraded);
                let client_stream = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
                if let Err(e) = tunnel(client_stream, upstream_stream, ctx_for_task, connection_id).await {
                    warn!(error = %e, "websocket tunnel ended with error");
                }
            }
            Err(e) => warn!(error = %e, "hyper upgrade future failed"),
        }
    });

    Ok(Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(http::header::CONNECTION, "Upgrade")
        .header(http::header::UPGRADE, "websocket")
        .header("Sec-WebSocket-Accept", accept_key)
        .body(Full::new(Bytes::new()))
        .expect("static switching-protocols response is always valid"))
}

async fn tunnel<C, U>(
    mut client: WebSocketStream<C>,
    mut upstream: WebSocketStream<U>,
    ctx: Arc<SharedContext>,
    connection_id: String,
) -> ProxyResult<()>
where
    C: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    U: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let mut closed_via_frame = false;

    loop {
        tokio::select! {
            client_msg = client.next() => {
                match client_msg {
                    Some(Ok(msg)) => {
                        let (is_close, recorded) = handle_frame(&ctx, &connection_id, Direction::Inbound, &msg).await?;
                        if is_close {
                            closed_via_frame = recorded;
                            break;
                        }
                        if upstream.send(msg).await.is_err() {
                            break;
                        }
                    }
                    _ => break,
                }
            }
            upstream_msg = upstream.next() => {
                match upstream_msg {
                    Some(Ok(msg)) => {
                        let (is_close, recorded) = handle_frame(&ctx, &connection_id, Direction::Outbound, &msg).await?;
                        if is_close {
                            closed_via_frame = recorded;
                            break;
                        }
                        if client.send(msg).await.is_err() {
                            break;
                        }
                    }
                    _ => break,
                }
            }
        }
    }

    // An explicit `Message::Close` frame already wrote the real close
    // code/reason via `handle_frame`; only fall back to a codeless close
    // here when the loop ended some other way (stream error, dropped
    // connection) so we don't clobber a real code/reason back to `NULL`.
    if !closed_via_frame {
        ctx.store.update_websocket_close(&connection_id, now_ms(), None, None)?;
    }
    debug!(connection_id = %connection_id, "websocket connection closed");
    Ok(())
}

/// Record one frame through the body pipeline and forward it. Returns
/// `(is_close, recorded_close)`: `is_close` means the tunnel should stop
/// after this frame; `recorded_close` means this call already wrote the
/// connection's close code/reason to the store, so the caller must not
/// write a second, codeless close record on top of it.
async fn handle_frame(
    ctx: &Arc<SharedContext>,
    connection_id: &str,
    direction: Direction,
    msg: &Message,
) -> ProxyResult<(bool, bool)> {
    if !ctx.config.capture.capture_websocket_messages {
        return Ok((matches!(msg, Message::Close(_)), false));
    }

    let (message_type, payload, byte_size, is_close) = match msg {
        Message::Text(text) => (WsMessageType::Text, ws_text_payload(text), text.len() as u64, false),
        Message::Binary(bytes) => {
            let outcome = ws_binary_payload(bytes, ctx.config.capture.max_body_size).await;
            (WsMessageType::Binary, outcome.payload, bytes.len() as u64, false)
        }
        Message::Ping(bytes) => {
            let outcome = ws_binary_payload(bytes, ctx.config.capture.max_body_size).await;
            (WsMessageType::Ping, outcome.payload, bytes.len() as u64, false)
        }
        Message::Pong(bytes) => {
            let outcome = ws_binary_payload(bytes, ctx.config.capture.max_body_size).await;
            (WsMessageType::Pong, outcome.payload, bytes.len() as u64, false)
        }
        Message::Close(frame) => {
            let reason = frame.as_ref().map(|f: &CloseFrame| f.reason.to_string());
            let code = frame.as_ref().map(|f| u16::from(f.code));
            ctx.store.update_websocket_close(connection_id, now_ms(), code, reason.as_deref())?;
            (WsMessageType::Close, None, 0, true)
        }
        Message::Frame(_) => return Ok((false, false)),
    };

    let message = traffic_mcp_store::WebSocketMessage {
        id: new_capture_id(),
        connection_id: connection_id.to_string(),
        timestamp_ms: now_ms(),
        direction,
        message_type,
        payload,
        byte_size,
    };
    ctx.store.append_websocket_message(connection_id, &message)?;

    Ok((is_close, is_close))
}
