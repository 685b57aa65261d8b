//! WebSocket connection channel built on `tokio-tungstenite`.
//!
//! The production game server sits behind a WebSocket gateway (`wss://`),
//! so this is the transport the client uses outside of tests. TLS is handled
//! by [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), word_derby_client::DerbyError> {
//! use word_derby_client::{Transport, WebSocketTransport};
//!
//! let mut channel = WebSocketTransport::connect("ws://localhost:8080/ws").await?;
//! channel
//!     .send(r#"{"MessageType":"newplayer","NewPlayer":{"Name":"Ann","Icon":"horse1"}}"#.into())
//!     .await?;
//! if let Some(Ok(frame)) = channel.recv().await {
//!     println!("server: {frame}");
//! }
//! channel.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::DerbyError;
use crate::transport::Transport;

/// The underlying WebSocket stream, exposed for [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over one WebSocket connection.
///
/// Text frames carry protocol messages. Control frames are handled here:
/// pings are answered by tungstenite, pongs are ignored, binary frames are
/// skipped with a warning, and a close frame ends the stream.
///
/// [`recv`](Transport::recv) only awaits `StreamExt::next`, which is
/// cancel-safe, so it is safe inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `endpoint` (`ws://` or `wss://`).
    ///
    /// # Errors
    ///
    /// Returns [`DerbyError::Io`] if the endpoint is invalid or unreachable.
    /// I/O error kinds from the handshake are preserved; other handshake
    /// failures map to [`std::io::ErrorKind::Other`].
    pub async fn connect(endpoint: &str) -> Result<Self, DerbyError> {
        debug!(endpoint, "connecting to game server");

        let (stream, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| {
                let kind = match &e {
                    tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                    _ => std::io::ErrorKind::Other,
                };
                DerbyError::Io(std::io::Error::new(kind, e))
            })?;

        info!(endpoint, "connected to game server");
        Ok(Self::from_stream(stream))
    }

    /// Like [`connect`](Self::connect), bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DerbyError::Timeout`] when the deadline passes first, or any
    /// error [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Self, DerbyError> {
        tokio::time::timeout(timeout, Self::connect(endpoint))
            .await
            .map_err(|_| DerbyError::Timeout)?
    }

    /// Wrap a stream that was connected elsewhere (custom TLS, proxies, headers).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), DerbyError> {
        if self.closed {
            return Err(DerbyError::TransportClosed);
        }
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| DerbyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, DerbyError>> {
        while let Some(next) = self.stream.next().await {
            let msg = match next {
                Ok(msg) => msg,
                Err(e) => return Some(Err(DerbyError::TransportReceive(e.to_string()))),
            };
            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    debug!(?frame, "server sent close frame");
                    return None;
                }
                Message::Binary(bytes) => {
                    warn!(len = bytes.len(), "skipping binary frame");
                }
                // Pings are answered by tungstenite; nothing to surface.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), DerbyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| DerbyError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{ClientMessage, ServerMessage};
    use tokio::net::TcpListener;

    /// Accept one WebSocket connection on a local port, run `handler` on it,
    /// and return the URL to connect to.
    async fn spawn_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });
        format!("ws://{addr}")
    }

    #[test]
    fn websocket_transport_is_send_and_debug() {
        fn assert_bounds<T: Send + std::fmt::Debug>() {}
        assert_bounds::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_rejects_invalid_endpoint() {
        let err = WebSocketTransport::connect("not a url").await.unwrap_err();
        assert!(matches!(err, DerbyError::Io(_)));
    }

    #[tokio::test]
    async fn connect_reports_unreachable_server() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, DerbyError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_gives_up() {
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DerbyError::Timeout));
    }

    #[tokio::test]
    async fn receives_game_frames_in_order() {
        let url = spawn_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"Welcome":{"SecondsTillStart":10}}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"AboutToStart":{}}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();

        let first = transport.recv().await.unwrap().unwrap();
        assert!(matches!(
            ServerMessage::from_frame(&first).unwrap(),
            ServerMessage::Welcome(_)
        ));
        let second = transport.recv().await.unwrap().unwrap();
        assert!(matches!(
            ServerMessage::from_frame(&second).unwrap(),
            ServerMessage::AboutToStart(_)
        ));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn binary_frames_are_skipped() {
        let url = spawn_server(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text(r#"{"AboutToStart":{}}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"AboutToStart":{}}"#);
    }

    #[tokio::test]
    async fn outbound_frames_reach_the_server() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel::<String>();
        let url = spawn_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text.to_string());
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let frame = r#"{"MessageType":"playerresponse","PlayerResponse":{"Response":0}}"#;
        transport.send(frame.to_string()).await.unwrap();

        let seen = seen_rx.await.unwrap();
        let msg: ClientMessage = serde_json::from_str(&seen).unwrap();
        assert!(matches!(msg, ClientMessage::PlayerResponse(_)));
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let url =
            spawn_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} }).await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, DerbyError::TransportClosed));
    }

    #[tokio::test]
    async fn from_stream_wraps_existing_connection() {
        let url = spawn_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"Error":{"Message":"full"}}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (stream, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let mut transport = WebSocketTransport::from_stream(stream);
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"Error":{"Message":"full"}}"#);
    }
}
