//! Wire-compatible protocol types for the Word Derby game server.
//!
//! The server speaks PascalCase JSON. Inbound frames carry exactly one
//! top-level key naming the message kind:
//!
//! ```json
//! {"PresentQuestion":{"WordToGuess":"abate","Definitions":["lessen","increase","rotate"]}}
//! ```
//!
//! Outbound frames carry a `MessageType` discriminator plus a payload key:
//!
//! ```json
//! {"MessageType":"playerresponse","PlayerResponse":{"Response":0}}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Identifiers ─────────────────────────────────────────────────────

/// Server-assigned player identifier.
///
/// The server keys players by connection ID, which arrives either as a JSON
/// number or a string depending on the deployment. Both forms are kept as-is
/// and compared by equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayerId {
    Number(u64),
    Text(String),
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerId::Number(n) => write!(f, "{n}"),
            PlayerId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for PlayerId {
    fn from(id: u64) -> Self {
        PlayerId::Number(id)
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        PlayerId::Text(id.to_string())
    }
}

/// Avatar identifier chosen by a player (e.g. `"horse1"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Icon(pub String);

impl Icon {
    /// Icon shown for players the server has marked inactive.
    pub const ELIMINATED: &'static str = "dead";

    pub fn new(icon: impl Into<String>) -> Self {
        Self(icon.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if no icon has been chosen.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Zero-based index into the three definitions of a question.
///
/// Decoding rejects indices outside `0..COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DefinitionIndex(pub u8);

impl DefinitionIndex {
    /// Number of definitions offered per question.
    pub const COUNT: u8 = 3;

    /// Returns the index if it addresses one of the presented definitions.
    pub fn checked(index: u8) -> Option<Self> {
        (index < Self::COUNT).then_some(Self(index))
    }

    pub fn get(self) -> usize {
        usize::from(self.0)
    }
}

impl TryFrom<u8> for DefinitionIndex {
    type Error = String;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::checked(index).ok_or_else(|| {
            format!(
                "definition index {index} out of range 0..{}",
                DefinitionIndex::COUNT
            )
        })
    }
}

impl From<DefinitionIndex> for u8 {
    fn from(index: DefinitionIndex) -> Self {
        index.0
    }
}

impl fmt::Display for DefinitionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Payload structs ─────────────────────────────────────────────────

/// Sent by the player once they have picked a name and an icon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewPlayer {
    pub name: String,
    pub icon: Icon,
}

/// The player's answer to the current question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerResponse {
    pub response: DefinitionIndex,
}

/// Acknowledges registration; the game starts once enough players join.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Welcome {
    #[serde(default)]
    pub seconds_till_start: u32,
    /// Score a player needs to win. Overrides the configured target when sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_score: Option<u64>,
}

/// Server-reported error. Terminal for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameError {
    pub message: String,
}

/// The first question is imminent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AboutToStart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u32>,
}

/// A word and its three candidate definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PresentQuestion {
    pub word_to_guess: String,
    pub definitions: [String; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_allowed: Option<u32>,
}

impl PresentQuestion {
    pub fn definition(&self, index: DefinitionIndex) -> Option<&str> {
        self.definitions.get(index.get()).map(String::as_str)
    }
}

/// One player's standing, broadcast after every round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerState {
    pub id: PlayerId,
    pub name: String,
    pub icon: Icon,
    pub score: u64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoundSummary {
    pub player_states: Vec<PlayerState>,
}

/// The game is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Summary {
    pub winner: String,
    pub icon: Icon,
}

/// Outcome of the local player's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PlayerResult {
    pub correct_answer: DefinitionIndex,
    pub correct: bool,
}

// ── Messages ────────────────────────────────────────────────────────

/// Frames sent from the server to the client.
///
/// Externally tagged, so a frame must be an object with exactly one of these
/// keys. Anything else fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    Welcome(Welcome),
    Error(GameError),
    AboutToStart(AboutToStart),
    PresentQuestion(PresentQuestion),
    RoundSummary(RoundSummary),
    Summary(Summary),
    PlayerResult(PlayerResult),
}

impl ServerMessage {
    /// Decode one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for undecodable text, unknown keys, or
    /// envelopes carrying more than one key.
    pub fn from_frame(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// The wire key of this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome(_) => "Welcome",
            ServerMessage::Error(_) => "Error",
            ServerMessage::AboutToStart(_) => "AboutToStart",
            ServerMessage::PresentQuestion(_) => "PresentQuestion",
            ServerMessage::RoundSummary(_) => "RoundSummary",
            ServerMessage::Summary(_) => "Summary",
            ServerMessage::PlayerResult(_) => "PlayerResult",
        }
    }
}

/// Frames sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "ClientEnvelope", try_from = "ClientEnvelope")]
pub enum ClientMessage {
    NewPlayer(NewPlayer),
    PlayerResponse(PlayerResponse),
}

impl ClientMessage {
    /// Encode as one outbound text frame.
    ///
    /// # Errors
    ///
    /// Propagates any `serde_json` serialization failure.
    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MessageType {
    NewPlayer,
    PlayerResponse,
}

/// On-the-wire shape of [`ClientMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ClientEnvelope {
    message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_player: Option<NewPlayer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    player_response: Option<PlayerResponse>,
}

impl From<ClientMessage> for ClientEnvelope {
    fn from(msg: ClientMessage) -> Self {
        match msg {
            ClientMessage::NewPlayer(new_player) => Self {
                message_type: MessageType::NewPlayer,
                new_player: Some(new_player),
                player_response: None,
            },
            ClientMessage::PlayerResponse(player_response) => Self {
                message_type: MessageType::PlayerResponse,
                new_player: None,
                player_response: Some(player_response),
            },
        }
    }
}

impl TryFrom<ClientEnvelope> for ClientMessage {
    type Error = String;

    fn try_from(envelope: ClientEnvelope) -> Result<Self, Self::Error> {
        match envelope.message_type {
            MessageType::NewPlayer => envelope
                .new_player
                .map(ClientMessage::NewPlayer)
                .ok_or_else(|| "newplayer frame without NewPlayer payload".to_string()),
            MessageType::PlayerResponse => envelope
                .player_response
                .map(ClientMessage::PlayerResponse)
                .ok_or_else(|| "playerresponse frame without PlayerResponse payload".to_string()),
        }
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

    #[test]
    fn message_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageType::NewPlayer).unwrap(),
            "\"newplayer\""
        );
        assert_eq!(
            serde_json::to_string(&MessageType::PlayerResponse).unwrap(),
            "\"playerresponse\""
        );
    }

    #[test]
    fn envelope_without_payload_is_rejected() {
        let err = serde_json::from_str::<ClientMessage>(r#"{"MessageType":"newplayer"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn player_id_display() {
        assert_eq!(PlayerId::from(7).to_string(), "7");
        assert_eq!(PlayerId::from("abc=").to_string(), "abc=");
    }

    #[test]
    fn definition_index_bounds() {
        assert_eq!(DefinitionIndex::checked(0), Some(DefinitionIndex(0)));
        assert_eq!(DefinitionIndex::checked(2), Some(DefinitionIndex(2)));
        assert_eq!(DefinitionIndex::checked(3), None);
    }

    #[test]
    fn out_of_range_definition_index_is_rejected_on_decode() {
        assert_eq!(
            serde_json::from_str::<DefinitionIndex>("2").unwrap(),
            DefinitionIndex(2)
        );
        assert!(serde_json::from_str::<DefinitionIndex>("3").is_err());
        assert!(serde_json::from_str::<DefinitionIndex>("255").is_err());
        assert_eq!(serde_json::to_string(&DefinitionIndex(1)).unwrap(), "1");
    }

    #[test]
    fn blank_icon_counts_as_empty() {
        assert!(Icon::new("").is_empty());
        assert!(Icon::new("  ").is_empty());
        assert!(!Icon::new("horse1").is_empty());
    }

    #[test]
    fn kind_matches_wire_key() {
        let msg = ServerMessage::from_frame(r#"{"AboutToStart":{}}"#).unwrap();
        assert_eq!(msg.kind(), "AboutToStart");
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get(msg.kind()).is_some());
    }
}
