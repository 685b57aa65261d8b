#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Word Derby client integration tests.
//!
//! Provides a channel-driven [`MockTransport`] and helpers that build server
//! frames from the protocol types.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use word_derby_client::protocol::{
    AboutToStart, DefinitionIndex, GameError, Icon, PlayerId, PlayerResult, PlayerState,
    PresentQuestion, RoundSummary, ServerMessage, Summary, Welcome,
};
use word_derby_client::{DerbyError, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// A mock transport the test feeds frame by frame.
///
/// Frames pushed through the [`ServerHandle`] arrive at `recv()` in order.
/// Sending `None` simulates the server closing the connection. Every frame
/// the client sends is recorded.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Option<Result<String, DerbyError>>>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// The test's side of a [`MockTransport`].
#[derive(Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<Option<Result<String, DerbyError>>>,
    /// Frames the client has sent, in order.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> (Self, ServerHandle) {
        let (tx, incoming) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, ServerHandle { tx, sent, closed })
    }
}

impl ServerHandle {
    /// Deliver one text frame to the client.
    pub fn push(&self, frame: impl Into<String>) {
        self.tx.send(Some(Ok(frame.into()))).unwrap();
    }

    /// Make the next `recv()` fail.
    pub fn fail(&self, reason: &str) {
        self.tx
            .send(Some(Err(DerbyError::TransportReceive(reason.into()))))
            .unwrap();
    }

    /// Close the connection from the server side.
    pub fn hang_up(&self) {
        self.tx.send(None).unwrap();
    }

    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), DerbyError> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, DerbyError>> {
        match self.incoming.recv().await {
            Some(item) => item,
            // Test dropped its handle: stay open until shutdown.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), DerbyError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── Frame helpers ───────────────────────────────────────────────────

fn frame(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).expect("server frame serialization")
}

pub fn welcome_json(seconds_till_start: u32) -> String {
    frame(&ServerMessage::Welcome(Welcome {
        seconds_till_start,
        target_score: None,
    }))
}

pub fn welcome_with_target_json(seconds_till_start: u32, target_score: u64) -> String {
    frame(&ServerMessage::Welcome(Welcome {
        seconds_till_start,
        target_score: Some(target_score),
    }))
}

pub fn about_to_start_json() -> String {
    frame(&ServerMessage::AboutToStart(AboutToStart::default()))
}

pub fn question_json(word: &str, definitions: [&str; 3]) -> String {
    frame(&ServerMessage::PresentQuestion(PresentQuestion {
        word_to_guess: word.into(),
        definitions: definitions.map(String::from),
        seconds_allowed: None,
    }))
}

/// A player entry for [`round_summary_json`].
pub fn player_state(id: u64, name: &str, icon: &str, score: u64, active: bool) -> PlayerState {
    PlayerState {
        id: PlayerId::from(id),
        name: name.into(),
        icon: Icon::new(icon),
        score,
        active,
    }
}

pub fn round_summary_json(player_states: Vec<PlayerState>) -> String {
    frame(&ServerMessage::RoundSummary(RoundSummary { player_states }))
}

pub fn player_result_json(correct_answer: u8, correct: bool) -> String {
    frame(&ServerMessage::PlayerResult(PlayerResult {
        correct_answer: DefinitionIndex(correct_answer),
        correct,
    }))
}

pub fn summary_json(winner: &str, icon: &str) -> String {
    frame(&ServerMessage::Summary(Summary {
        winner: winner.into(),
        icon: Icon::new(icon),
    }))
}

pub fn error_json(message: &str) -> String {
    frame(&ServerMessage::Error(GameError {
        message: message.into(),
    }))
}
