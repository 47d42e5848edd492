//! Latency channel
//!
//! WebSocket upgrade on either listener. Once upgraded the socket belongs
//! to a [`LatencyChannel`], which the client uses for round-trip timing.

use crate::{Request, Response, ResponseBuilder, StatusCode};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::{SinkExt, StreamExt};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// An upgraded latency socket
pub type LatencySocket = WebSocketStream<TokioIo<Upgraded>>;

/// Owner of upgraded latency sockets
pub trait LatencyChannel: Send + Sync {
    /// Run the socket until the peer goes away
    fn serve(&self, socket: LatencySocket) -> BoxFuture<'static, ()>;
}

/// Channel that echoes every data message back
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoChannel;

impl LatencyChannel for EchoChannel {
    fn serve(&self, socket: LatencySocket) -> BoxFuture<'static, ()> {
        echo(socket).boxed()
    }
}

/// Echo text and binary messages until close or error
///
/// Pings are answered by the protocol layer while reading.
pub async fn echo<S>(mut ws: WebSocketStream<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut echoed = 0u64;
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(msg @ (Message::Text(_) | Message::Binary(_))) => {
                if let Err(e) = ws.send(msg).await {
                    tracing::debug!(error = %e, "Latency channel write failed");
                    break;
                }
                echoed += 1;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Latency channel read failed");
                break;
            }
        }
    }
    tracing::debug!(echoed, "Latency channel closed");
}

/// Check if request is WebSocket upgrade
pub fn is_websocket_upgrade(req: &Request) -> bool {
    let upgrade = req.header("upgrade").unwrap_or("");
    let connection = req.header("connection").unwrap_or("");

    upgrade.eq_ignore_ascii_case("websocket")
        && connection.to_ascii_lowercase().contains("upgrade")
        && req.header("sec-websocket-key").is_some()
}

/// Create WebSocket upgrade response, `None` without a key
pub fn upgrade_response(req: &Request) -> Option<Response> {
    let key = req.header("sec-websocket-key")?;

    Some(
        ResponseBuilder::new(StatusCode::SWITCHING_PROTOCOLS)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Accept", derive_accept_key(key.as_bytes()))
            .build(),
    )
}

/// Wrap an upgraded connection as a server-side WebSocket
pub async fn accept_upgraded(upgraded: Upgraded) -> LatencySocket {
    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await
}
