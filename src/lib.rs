//! # Word Derby Client
//!
//! Client-side protocol state machine for Word Derby, a multiplayer trivia
//! race: each round the server shows a word and three definitions, players
//! pick one, and horses advance along a track toward a target score.
//!
//! The crate turns the server's JSON frames into presentation events for a
//! renderer and turns local player actions into outbound frames. It draws
//! nothing itself.
//!
//! ## Features
//!
//! - **Sans-IO core**: [`GameSession`] consumes frames and timer ticks and returns [`Effect`]s
//! - **Transport-agnostic**: implement the [`Transport`] trait for any duplex text channel
//! - **WebSocket built-in**: the default `transport-websocket` feature provides `WebSocketTransport`
//! - **Event-driven**: [`DerbyClient`] delivers typed [`DerbyEvent`]s through a channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use word_derby_client::{DerbyClient, DerbyConfig, DerbyEvent};
//! use word_derby_client::protocol::Icon;
//!
//! # async fn run() -> Result<(), word_derby_client::DerbyError> {
//! let (client, mut events) = DerbyClient::connect(DerbyConfig::from_env()).await?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         DerbyEvent::Connected => client.register("Ann", Icon::new("horse1"))?,
//!         DerbyEvent::QuestionShown { question } => {
//!             println!("{}", question.word_to_guess);
//!             client.select_definition(0)?;
//!         }
//!         DerbyEvent::WinnerShown { name, .. } => println!("{name} wins!"),
//!         DerbyEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod countdown;
pub mod error;
pub mod event;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{DerbyClient, DerbyConfig};
pub use error::DerbyError;
pub use event::{DerbyEvent, TrackUpdate};
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{Effect, GamePhase, GameSession, Player};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
