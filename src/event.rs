//! Presentation events emitted by the client.
//!
//! The client never draws anything itself. Every visible or audible change is
//! a [`DerbyEvent`] delivered on the channel returned by
//! [`DerbyClient::start`](crate::client::DerbyClient::start); a renderer
//! (terminal, GUI, browser bridge) consumes them in order.

use crate::protocol::{DefinitionIndex, PlayerId, PresentQuestion};

/// One horse's lane after a round summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackUpdate {
    pub player_id: PlayerId,
    pub name: String,
    /// Path of the icon image to draw; the eliminated icon for inactive players.
    pub icon_path: String,
    /// Horizontal position in percent, `0..=100`.
    pub position: u8,
    pub active: bool,
    /// `true` the first time this player appears; the renderer must create
    /// the lane before animating it.
    pub created: bool,
}

/// Events consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerbyEvent {
    // ── Synthetic transport events ──────────────────────────────────
    /// The client loop is running on a connected transport.
    Connected,
    /// The transport closed or failed. Always the last event.
    Disconnected { reason: Option<String> },

    // ── Lobby ───────────────────────────────────────────────────────
    /// Hide the name/icon selection form after registration was sent.
    SelectionHidden,
    /// Show the "waiting for players" surface.
    WaitingShown { seconds_till_start: u32 },
    /// Hide the "waiting for players" surface.
    WaitingHidden,

    // ── Countdown ───────────────────────────────────────────────────
    /// Show the countdown surface; `ticks` lists the labels that will follow.
    CountdownShown {
        ticks: Vec<&'static str>,
        seconds: Option<u32>,
    },
    /// Display one countdown label.
    CountdownTick { label: &'static str },
    /// Hide the countdown surface.
    CountdownHidden,
    /// Play the start bugle.
    StartCue,

    // ── Questions ───────────────────────────────────────────────────
    /// Reset every option to neutral, enable input, and show the question.
    QuestionShown { question: PresentQuestion },
    /// Highlight the option the local player picked.
    DefinitionSelected { index: DefinitionIndex },
    /// Disable every option until the next question.
    DefinitionsDisabled,
    /// Color an option as the correct answer.
    DefinitionMarkedCorrect { index: DefinitionIndex },
    /// Color the local player's wrong pick.
    DefinitionMarkedIncorrect { index: DefinitionIndex },
    /// Hide the question surface.
    QuestionHidden,

    // ── Race ────────────────────────────────────────────────────────
    /// Create (if new) and animate one player's track.
    TrackUpdated(TrackUpdate),

    // ── End of session ──────────────────────────────────────────────
    /// Reveal the winner.
    WinnerShown { name: String, icon_path: String },
    /// Play the victory fanfare.
    VictoryCue,
    /// Show a server-reported error verbatim.
    ErrorShown { message: String },
}
