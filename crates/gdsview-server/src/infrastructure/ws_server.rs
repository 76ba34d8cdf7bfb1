//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from browsers.
//! 3. Upgrading each connection to a WebSocket, accepting only the `/ws`
//!    path and reading the `file` query parameter from the handshake.
//! 4. Running one [`LayoutViewEndpoint`] per connection until the browser
//!    leaves or sends `close`.
//! 5. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Scalability
//!
//! Each connection runs in its own Tokio task, and every engine call runs on
//! the blocking pool, so a slow render never stalls the accept loop or other
//! clients.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::application::endpoint::{ClientSink, Flow, LayoutViewEndpoint};
use crate::application::registry::SessionRegistry;
use crate::domain::{ServerMessage, ViewError};

/// The only path the handshake accepts.
pub const WS_PATH: &str = "/ws";

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `registry.config().bind_addr` and serves until `running` is set to
/// `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_server(registry: SessionRegistry, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let addr = registry.config().bind_addr;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))?;
    run_server_on(listener, registry, running).await
}

/// Serves on an already bound listener. Lets tests bind port 0.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn run_server_on(
    listener: TcpListener,
    registry: SessionRegistry,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local = listener.local_addr().context("listener has no local address")?;
    info!("layout-view server listening on ws://{local}{WS_PATH}");

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the `running` flag is checked even when nobody
        // connects.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new connection from {peer_addr}");
                let registry = registry.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, registry).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, registry: SessionRegistry) {
    match run_connection(stream, peer_addr, registry).await {
        Ok(()) => info!("connection {peer_addr} closed normally"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

async fn run_connection(stream: TcpStream, peer_addr: SocketAddr, registry: SessionRegistry) -> anyhow::Result<()> {
    let mut requested: Option<String> = None;
    let ws_stream = accept_hdr_async(stream, |request: &Request, response: Response| {
        if request.uri().path() != WS_PATH {
            return Err(not_found(request.uri().path()));
        }
        requested = request.uri().query().and_then(file_parameter);
        Ok(response)
    })
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (ws_tx, mut ws_rx) = ws_stream.split();
    let mut endpoint = LayoutViewEndpoint::new(registry, WsSink { tx: ws_tx });
    info!(
        "client {} connected from {peer_addr} (file {:?})",
        endpoint.id(),
        requested.as_deref().unwrap_or("<default>")
    );

    let outcome = serve(&mut endpoint, &mut ws_rx, requested.as_deref()).await;
    endpoint.disconnect().await;
    outcome
}

type WsRead = futures_util::stream::SplitStream<WebSocketStream<TcpStream>>;

async fn serve(
    endpoint: &mut LayoutViewEndpoint<WsSink>,
    ws_rx: &mut WsRead,
    requested: Option<&str>,
) -> anyhow::Result<()> {
    let id = endpoint.id();
    endpoint.on_connect(requested).await?;

    loop {
        let ws_msg = match ws_rx.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!("client {id}: WebSocket closed");
                break;
            }
            Some(Err(e)) => {
                warn!("client {id}: WebSocket error: {e}");
                break;
            }
            None => {
                debug!("client {id}: stream ended");
                break;
            }
        };

        match ws_msg {
            WsMessage::Text(text) => {
                if endpoint.handle_text(&text).await? == Flow::Close {
                    endpoint.sink_mut().close().await;
                    break;
                }
            }
            WsMessage::Binary(_) => {
                warn!("client {id}: unexpected binary message ignored");
            }
            // tungstenite answers pings itself.
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            WsMessage::Close(_) => {
                debug!("client {id}: close frame received");
                break;
            }
            WsMessage::Frame(_) => {}
        }
    }
    Ok(())
}

/// Decoded `file` parameter of a handshake query string.
fn file_parameter(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "file")
        .map(|(_, value)| value.into_owned())
}

fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("no WebSocket endpoint at {path}")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

// ── WebSocket sink ────────────────────────────────────────────────────────────

/// Write half of a browser WebSocket.
pub struct WsSink {
    tx: SplitSink<WebSocketStream<TcpStream>, WsMessage>,
}

impl WsSink {
    async fn close(&mut self) {
        if let Err(e) = self.tx.close().await {
            debug!("closing WebSocket failed: {e}");
        }
    }
}

#[async_trait]
impl ClientSink for WsSink {
    async fn send_message(&mut self, message: &ServerMessage) -> Result<(), ViewError> {
        let text = serde_json::to_string(message).map_err(|e| ViewError::Connection(e.to_string()))?;
        self.tx
            .send(WsMessage::Text(text))
            .await
            .map_err(|e| ViewError::Connection(e.to_string()))
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), ViewError> {
        self.tx
            .send(WsMessage::Binary(bytes))
            .await
            .map_err(|e| ViewError::Connection(e.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
