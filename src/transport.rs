//! Connection channel abstraction.
//!
//! The game server speaks JSON text frames over a persistent duplex channel.
//! [`Transport`] is that channel: one call to [`send`](Transport::send) writes
//! one frame, one call to [`recv`](Transport::recv) yields one frame. Framing
//! is the implementation's business.
//!
//! Connecting is not part of the trait. Build a connected transport first
//! (for example [`WebSocketTransport::connect`](crate::WebSocketTransport)),
//! then hand it to [`DerbyClient::start`](crate::DerbyClient::start).
//!
//! # Faults
//!
//! Every transport error is reported the same way: `recv` yields
//! `Some(Err(_))` or `send` returns `Err(_)`. The client treats either as the
//! end of the session. There is no reconnection.
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use word_derby_client::error::DerbyError;
//! use word_derby_client::transport::Transport;
//! use tokio::sync::mpsc;
//!
//! struct ChannelTransport {
//!     outbound: mpsc::UnboundedSender<String>,
//!     inbound: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for ChannelTransport {
//!     async fn send(&mut self, frame: String) -> Result<(), DerbyError> {
//!         self.outbound
//!             .send(frame)
//!             .map_err(|e| DerbyError::TransportSend(e.to_string()))
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, DerbyError>> {
//!         self.inbound.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), DerbyError> {
//!         self.inbound.close();
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::DerbyError;

/// A bidirectional text frame channel to the game server.
///
/// Object-safe, so `Box<dyn Transport>` works where dynamic dispatch is needed.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: the client polls it inside
/// `tokio::select!` alongside user commands and countdown deadlines. Dropping
/// an unfinished `recv` future must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`DerbyError::TransportSend`] or [`DerbyError::TransportClosed`]
    /// if the frame could not be written.
    async fn send(&mut self, frame: String) -> Result<(), DerbyError>;

    /// Receive the next JSON text frame from the server.
    ///
    /// - `Some(Ok(text))`: a complete frame
    /// - `Some(Err(e))`: the channel failed
    /// - `None`: the server closed the channel cleanly
    async fn recv(&mut self) -> Option<Result<String, DerbyError>>;

    /// Close the channel. Calling it more than once must be harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails; resources are released
    /// regardless.
    async fn close(&mut self) -> Result<(), DerbyError>;
}
