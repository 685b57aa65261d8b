//! The client-side game state machine.
//!
//! [`GameSession`] owns everything one client knows about the game: the
//! current [`GamePhase`], the mirrored player records, the question on screen,
//! the local player's committed answer, and the countdown timer. It performs
//! no I/O. Each input (an inbound frame, a local action, a timer deadline)
//! returns the [`Effect`]s the caller must carry out, in order.

use std::collections::HashMap;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::countdown::{self, Countdown, CountdownStep};
use crate::error::{DerbyError, Result};
use crate::event::{DerbyEvent, TrackUpdate};
use crate::protocol::{
    AboutToStart, ClientMessage, DefinitionIndex, Icon, NewPlayer, PlayerId, PlayerResponse,
    PlayerResult, PlayerState, PresentQuestion, RoundSummary, ServerMessage, Summary, Welcome,
};

/// Score that moves a horse to the finish line unless the server says otherwise.
pub const DEFAULT_TARGET_SCORE: u64 = 500;

/// Rightmost track position, in percent.
pub const MAX_TRACK_POSITION: u8 = 100;

/// Longest prefix of a rejected frame that gets logged, in bytes.
const FRAME_PREVIEW_LEN: usize = 120;

/// Trim `text` to at most [`FRAME_PREVIEW_LEN`] bytes on a char boundary.
fn frame_preview(text: &str) -> &str {
    let end = (0..=FRAME_PREVIEW_LEN.min(text.len()))
        .rev()
        .find(|&end| text.is_char_boundary(end))
        .unwrap_or(0);
    text.get(..end).unwrap_or_default()
}

/// Coarse lifecycle state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GamePhase {
    /// Choosing a name and icon, or waiting for the server to acknowledge them.
    #[default]
    Lobby,
    /// Registered; waiting for enough players to join.
    Waiting,
    /// The pre-game countdown is running.
    Countdown,
    /// A question is on screen.
    Question,
    /// The answer to the current question has been revealed.
    RoundResult,
    /// A winner was announced.
    Ended,
    /// The server reported an error. Only a new session recovers.
    Errored,
}

impl GamePhase {
    /// `true` once the game is over. Only `Error`, `Summary` and track
    /// updates are still applied.
    pub fn is_terminal(self) -> bool {
        matches!(self, GamePhase::Ended | GamePhase::Errored)
    }

    /// Whether `msg` is legal while in this phase.
    pub fn accepts(self, msg: &ServerMessage) -> bool {
        match (self, msg) {
            (_, ServerMessage::Error(_))
            | (_, ServerMessage::RoundSummary(_))
            | (_, ServerMessage::Summary(_)) => true,
            (GamePhase::Ended | GamePhase::Errored, _) => false,
            (_, ServerMessage::Welcome(_)) => true,
            (GamePhase::Waiting | GamePhase::Countdown, ServerMessage::AboutToStart(_)) => true,
            (
                GamePhase::Countdown | GamePhase::Question | GamePhase::RoundResult,
                ServerMessage::PresentQuestion(_),
            ) => true,
            (GamePhase::Question, ServerMessage::PlayerResult(_)) => true,
            _ => false,
        }
    }
}

/// Local mirror of a server-side player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub icon: Icon,
    pub score: u64,
    pub active: bool,
}

impl From<&PlayerState> for Player {
    fn from(state: &PlayerState) -> Self {
        Self {
            id: state.id.clone(),
            name: state.name.clone(),
            icon: state.icon.clone(),
            score: state.score,
            active: state.active,
        }
    }
}

/// Work the caller must perform on behalf of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Deliver an event to the presentation layer.
    Emit(DerbyEvent),
    /// Send a frame to the server.
    Send(ClientMessage),
}

/// Map a score onto a track position: `min(100, floor(score / target * 100))`.
///
/// A `target_score` of zero is treated as one.
pub fn track_position(score: u64, target_score: u64) -> u8 {
    let target = u128::from(target_score.max(1));
    let percent = u128::from(score) * u128::from(MAX_TRACK_POSITION) / target;
    u8::try_from(percent.min(u128::from(MAX_TRACK_POSITION))).unwrap_or(MAX_TRACK_POSITION)
}

/// All mutable state of one client session.
#[derive(Debug)]
pub struct GameSession {
    phase: GamePhase,
    players: HashMap<PlayerId, Player>,
    /// Player IDs in first-seen order, so tracks keep a stable layout.
    track_order: Vec<PlayerId>,
    question: Option<PresentQuestion>,
    pending_response: Option<DefinitionIndex>,
    registered: bool,
    target_score: u64,
    icon_dir: String,
    countdown: Option<Countdown>,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_SCORE, "images")
    }
}

impl GameSession {
    /// Create a session in the [`Lobby`](GamePhase::Lobby) phase.
    pub fn new(target_score: u64, icon_dir: impl Into<String>) -> Self {
        Self {
            phase: GamePhase::Lobby,
            players: HashMap::new(),
            track_order: Vec::new(),
            question: None,
            pending_response: None,
            registered: false,
            target_score: target_score.max(1),
            icon_dir: icon_dir.into(),
            countdown: None,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn target_score(&self) -> u64 {
        self.target_score
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn current_question(&self) -> Option<&PresentQuestion> {
        self.question.as_ref()
    }

    pub fn pending_response(&self) -> Option<DefinitionIndex> {
        self.pending_response
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Players in the order their tracks were created.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.track_order.iter().filter_map(|id| self.players.get(id))
    }

    /// When the countdown next needs [`on_timer`](Self::on_timer), if running.
    pub fn next_timer_deadline(&self) -> Option<Instant> {
        self.countdown.as_ref().and_then(Countdown::next_deadline)
    }

    // ── Local actions ───────────────────────────────────────────────

    /// Register the local player.
    ///
    /// # Errors
    ///
    /// [`DerbyError::EmptyPlayerName`] or [`DerbyError::NoIconSelected`] when a
    /// field is missing, [`DerbyError::AlreadyRegistered`] outside the lobby or
    /// after a previous registration. Nothing is sent in either case.
    pub fn register(&mut self, name: &str, icon: &Icon) -> Result<Vec<Effect>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DerbyError::EmptyPlayerName);
        }
        if icon.is_empty() {
            return Err(DerbyError::NoIconSelected);
        }
        if self.registered || self.phase != GamePhase::Lobby {
            return Err(DerbyError::AlreadyRegistered);
        }

        self.registered = true;
        debug!(name, icon = %icon, "registering player");

        Ok(vec![
            Effect::Send(ClientMessage::NewPlayer(NewPlayer {
                name: name.to_string(),
                icon: icon.clone(),
            })),
            Effect::Emit(DerbyEvent::SelectionHidden),
        ])
    }

    /// Commit the local player's answer to the current question.
    ///
    /// Only the first selection per question has any effect; later calls, and
    /// calls outside the [`Question`](GamePhase::Question) phase, return no
    /// effects.
    ///
    /// # Errors
    ///
    /// [`DerbyError::DefinitionOutOfRange`] if `index` does not address one of
    /// the three definitions.
    pub fn select_definition(&mut self, index: u8) -> Result<Vec<Effect>> {
        let index =
            DefinitionIndex::checked(index).ok_or(DerbyError::DefinitionOutOfRange(index))?;

        if self.phase != GamePhase::Question {
            debug!(%index, phase = ?self.phase, "definition selected outside a question, ignoring");
            return Ok(Vec::new());
        }
        if let Some(committed) = self.pending_response {
            debug!(%index, %committed, "answer already committed, ignoring");
            return Ok(Vec::new());
        }

        self.pending_response = Some(index);
        debug!(%index, "answer committed");

        Ok(vec![
            Effect::Emit(DerbyEvent::DefinitionSelected { index }),
            Effect::Send(ClientMessage::PlayerResponse(PlayerResponse { response: index })),
            Effect::Emit(DerbyEvent::DefinitionsDisabled),
        ])
    }

    // ── Inbound frames ──────────────────────────────────────────────

    /// Decode and apply one raw inbound frame.
    ///
    /// Undecodable or unrecognized frames are logged and dropped.
    pub fn handle_frame(&mut self, text: &str, now: Instant) -> Vec<Effect> {
        match ServerMessage::from_frame(text) {
            Ok(msg) => self.handle_message(msg, now),
            Err(e) => {
                warn!(
                    len = text.len(),
                    preview = frame_preview(text),
                    "dropping malformed server frame: {e}"
                );
                Vec::new()
            }
        }
    }

    /// Apply one decoded server message.
    ///
    /// Messages that are not legal in the current phase are logged and
    /// dropped without changing state.
    pub fn handle_message(&mut self, msg: ServerMessage, now: Instant) -> Vec<Effect> {
        if !self.phase.accepts(&msg) {
            warn!(
                kind = msg.kind(),
                phase = ?self.phase,
                "dropping server message not legal in current phase"
            );
            return Vec::new();
        }

        let before = self.phase;
        let effects = match msg {
            ServerMessage::Welcome(welcome) => self.on_welcome(welcome),
            ServerMessage::Error(error) => {
                self.phase = GamePhase::Errored;
                vec![Effect::Emit(DerbyEvent::ErrorShown {
                    message: error.message,
                })]
            }
            ServerMessage::AboutToStart(about) => self.on_about_to_start(about, now),
            ServerMessage::PresentQuestion(question) => self.on_present_question(question),
            ServerMessage::RoundSummary(summary) => self.on_round_summary(&summary),
            ServerMessage::PlayerResult(result) => self.on_player_result(&result),
            ServerMessage::Summary(summary) => self.on_summary(summary),
        };

        if before != self.phase {
            debug!(from = ?before, to = ?self.phase, "phase transition");
        }
        effects
    }

    /// Fire every countdown step that is due at `now`.
    pub fn on_timer(&mut self, now: Instant) -> Vec<Effect> {
        let Some(countdown) = self.countdown.as_mut() else {
            return Vec::new();
        };

        let effects = countdown
            .fire_due(now)
            .into_iter()
            .map(|step| match step {
                CountdownStep::Tick(label) => Effect::Emit(DerbyEvent::CountdownTick { label }),
                CountdownStep::Hide => Effect::Emit(DerbyEvent::CountdownHidden),
            })
            .collect();

        if countdown.is_finished() {
            self.countdown = None;
        }
        effects
    }

    fn on_welcome(&mut self, welcome: Welcome) -> Vec<Effect> {
        info!(
            seconds_till_start = welcome.seconds_till_start,
            "registered, waiting for players"
        );
        if let Some(target) = welcome.target_score {
            self.target_score = target.max(1);
        }
        self.phase = GamePhase::Waiting;
        vec![Effect::Emit(DerbyEvent::WaitingShown {
            seconds_till_start: welcome.seconds_till_start,
        })]
    }

    fn on_about_to_start(&mut self, about: AboutToStart, now: Instant) -> Vec<Effect> {
        if self.countdown.is_some() {
            debug!("replacing countdown still in flight");
        }
        self.countdown = Some(Countdown::start(now));
        self.phase = GamePhase::Countdown;
        vec![
            Effect::Emit(DerbyEvent::WaitingHidden),
            Effect::Emit(DerbyEvent::CountdownShown {
                ticks: countdown::tick_labels(),
                seconds: about.seconds,
            }),
            Effect::Emit(DerbyEvent::StartCue),
        ]
    }

    fn on_present_question(&mut self, question: PresentQuestion) -> Vec<Effect> {
        debug!(word = %question.word_to_guess, "question presented");
        self.pending_response = None;
        self.question = Some(question.clone());
        self.phase = GamePhase::Question;
        vec![Effect::Emit(DerbyEvent::QuestionShown { question })]
    }

    fn on_round_summary(&mut self, summary: &RoundSummary) -> Vec<Effect> {
        summary
            .player_states
            .iter()
            .map(|state| Effect::Emit(DerbyEvent::TrackUpdated(self.upsert_player(state))))
            .collect()
    }

    fn upsert_player(&mut self, state: &PlayerState) -> TrackUpdate {
        let created = match self.players.get_mut(&state.id) {
            Some(player) => {
                *player = Player::from(state);
                false
            }
            None => {
                debug!(player_id = %state.id, name = %state.name, "new player track");
                self.players.insert(state.id.clone(), Player::from(state));
                self.track_order.push(state.id.clone());
                true
            }
        };

        let icon = if state.active {
            state.icon.as_str()
        } else {
            Icon::ELIMINATED
        };

        TrackUpdate {
            player_id: state.id.clone(),
            name: state.name.clone(),
            icon_path: self.icon_path(icon),
            position: track_position(state.score, self.target_score),
            active: state.active,
            created,
        }
    }

    fn on_player_result(&mut self, result: &PlayerResult) -> Vec<Effect> {
        if DefinitionIndex::checked(result.correct_answer.0).is_none() {
            warn!(
                correct_answer = %result.correct_answer,
                "dropping player result with out-of-range answer"
            );
            return Vec::new();
        }
        let mut effects = vec![Effect::Emit(DerbyEvent::DefinitionMarkedCorrect {
            index: result.correct_answer,
        })];
        if !result.correct {
            if let Some(index) = self.pending_response {
                effects.push(Effect::Emit(DerbyEvent::DefinitionMarkedIncorrect { index }));
            }
        }
        self.phase = GamePhase::RoundResult;
        effects
    }

    fn on_summary(&mut self, summary: Summary) -> Vec<Effect> {
        info!(winner = %summary.winner, "game over");
        self.phase = GamePhase::Ended;
        vec![
            Effect::Emit(DerbyEvent::QuestionHidden),
            Effect::Emit(DerbyEvent::WinnerShown {
                icon_path: self.icon_path(summary.icon.as_str()),
                name: summary.winner,
            }),
            Effect::Emit(DerbyEvent::VictoryCue),
        ]
    }

    fn icon_path(&self, icon: &str) -> String {
        format!("{}/{icon}.png", self.icon_dir)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use std::time::Duration;

    const QUESTION: &str =
        r#"{"PresentQuestion":{"WordToGuess":"abate","Definitions":["lessen","increase","rotate"]}}"#;

    fn sent(effects: &[Effect]) -> Vec<&ClientMessage> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send(msg) => Some(msg),
                Effect::Emit(_) => None,
            })
            .collect()
    }

    fn emitted(effects: &[Effect]) -> Vec<&DerbyEvent> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Emit(ev) => Some(ev),
                Effect::Send(_) => None,
            })
            .collect()
    }

    fn track_update(effects: &[Effect]) -> &TrackUpdate {
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Emit(DerbyEvent::TrackUpdated(update)) => Some(update),
                _ => None,
            })
            .expect("expected a TrackUpdated event")
    }

    /// Drive a fresh session into the Question phase.
    fn session_at_question() -> GameSession {
        let now = Instant::now();
        let mut session = GameSession::default();
        session.handle_frame(r#"{"Welcome":{"SecondsTillStart":10}}"#, now);
        session.handle_frame(r#"{"AboutToStart":{}}"#, now);
        session.handle_frame(QUESTION, now);
        assert_eq!(session.phase(), GamePhase::Question);
        session
    }

    fn round_summary(score: u64, active: bool) -> String {
        format!(
            r#"{{"RoundSummary":{{"PlayerStates":[{{"Id":1,"Name":"Ann","Icon":"horse1","Score":{score},"Active":{active}}}]}}}}"#
        )
    }

    #[test]
    fn track_position_table() {
        let cases = [(0, 0), (1, 0), (499, 99), (500, 100), (2500, 100), (1_000_000, 100)];
        for (score, expected) in cases {
            assert_eq!(track_position(score, 500), expected, "score {score}");
        }
    }

    #[test]
    fn track_position_handles_extremes() {
        assert_eq!(track_position(u64::MAX, 500), 100);
        assert_eq!(track_position(5, 0), 100);
        assert_eq!(track_position(0, 0), 0);
        assert_eq!(track_position(u64::MAX / 2, u64::MAX), 49);
    }

    #[test]
    fn new_session_starts_in_lobby() {
        let session = GameSession::default();
        assert_eq!(session.phase(), GamePhase::Lobby);
        assert_eq!(session.target_score(), DEFAULT_TARGET_SCORE);
        assert!(!session.is_registered());
    }

    #[test]
    fn register_requires_name_and_icon() {
        let mut session = GameSession::default();
        assert!(matches!(
            session.register("", &Icon::new("horse1")),
            Err(DerbyError::EmptyPlayerName)
        ));
        assert!(matches!(
            session.register("Ann", &Icon::new("")),
            Err(DerbyError::NoIconSelected)
        ));
        assert!(!session.is_registered());

        let effects = session.register("Ann", &Icon::new("horse1")).unwrap();
        assert_eq!(
            sent(&effects),
            vec![&ClientMessage::NewPlayer(NewPlayer {
                name: "Ann".into(),
                icon: Icon::new("horse1"),
            })]
        );
        assert_eq!(emitted(&effects), vec![&DerbyEvent::SelectionHidden]);
        assert_eq!(session.phase(), GamePhase::Lobby);
    }

    #[test]
    fn register_trims_name() {
        let mut session = GameSession::default();
        assert!(matches!(
            session.register("   ", &Icon::new("horse1")),
            Err(DerbyError::EmptyPlayerName)
        ));

        let effects = session.register("  Ann ", &Icon::new("horse1")).unwrap();
        assert_eq!(
            sent(&effects),
            vec![&ClientMessage::NewPlayer(NewPlayer {
                name: "Ann".into(),
                icon: Icon::new("horse1"),
            })]
        );
    }

    #[test]
    fn register_twice_is_rejected() {
        let mut session = GameSession::default();
        session.register("Ann", &Icon::new("horse1")).unwrap();
        assert!(matches!(
            session.register("Ann", &Icon::new("horse1")),
            Err(DerbyError::AlreadyRegistered)
        ));
    }

    #[test]
    fn full_phase_sequence_is_accepted() {
        let now = Instant::now();
        let mut session = GameSession::default();

        session.handle_frame(r#"{"Welcome":{"SecondsTillStart":10}}"#, now);
        assert_eq!(session.phase(), GamePhase::Waiting);
        session.handle_frame(r#"{"AboutToStart":{}}"#, now);
        assert_eq!(session.phase(), GamePhase::Countdown);
        session.handle_frame(QUESTION, now);
        assert_eq!(session.phase(), GamePhase::Question);
        session.handle_frame(&round_summary(100, true), now);
        session.handle_frame(&round_summary(100, true), now);
        assert_eq!(session.phase(), GamePhase::Question);
        session.handle_frame(r#"{"PlayerResult":{"CorrectAnswer":1,"Correct":false}}"#, now);
        assert_eq!(session.phase(), GamePhase::RoundResult);
        session.handle_frame(QUESTION, now);
        assert_eq!(session.phase(), GamePhase::Question);
        session.handle_frame(r#"{"Summary":{"Winner":"Ann","Icon":"horse1"}}"#, now);
        assert_eq!(session.phase(), GamePhase::Ended);
    }

    #[test]
    fn error_forces_errored_from_every_phase() {
        let now = Instant::now();
        let error = r#"{"Error":{"Message":"game full"}}"#;

        let mut lobby = GameSession::default();
        let effects = lobby.handle_frame(error, now);
        assert_eq!(lobby.phase(), GamePhase::Errored);
        assert_eq!(
            emitted(&effects),
            vec![&DerbyEvent::ErrorShown {
                message: "game full".into()
            }]
        );

        let mut question = session_at_question();
        question.handle_frame(error, now);
        assert_eq!(question.phase(), GamePhase::Errored);

        let mut ended = session_at_question();
        ended.handle_frame(r#"{"Summary":{"Winner":"Ann","Icon":"horse1"}}"#, now);
        ended.handle_frame(error, now);
        assert_eq!(ended.phase(), GamePhase::Errored);
    }

    #[test]
    fn terminal_phase_drops_game_frames() {
        let now = Instant::now();
        let mut session = GameSession::default();
        session.handle_frame(r#"{"Error":{"Message":"boom"}}"#, now);

        let effects = session.handle_frame(r#"{"Welcome":{"SecondsTillStart":3}}"#, now);
        assert!(effects.is_empty());
        assert_eq!(session.phase(), GamePhase::Errored);
    }

    #[test]
    fn round_summary_after_summary_updates_tracks() {
        let now = Instant::now();
        let mut session = session_at_question();
        session.handle_frame(&round_summary(300, true), now);
        session.handle_frame(r#"{"Summary":{"Winner":"Bo","Icon":"horse2"}}"#, now);
        assert_eq!(session.phase(), GamePhase::Ended);

        let effects = session.handle_frame(&round_summary(300, false), now);
        let update = track_update(&effects);
        assert_eq!(update.icon_path, "images/dead.png");
        assert!(!update.active);
        assert!(!update.created);
        assert_eq!(session.phase(), GamePhase::Ended);
    }

    #[test]
    fn summary_after_error_still_reveals_winner() {
        let now = Instant::now();
        let mut session = session_at_question();
        session.handle_frame(r#"{"Error":{"Message":"lost player"}}"#, now);
        assert_eq!(session.phase(), GamePhase::Errored);

        let effects = session.handle_frame(r#"{"Summary":{"Winner":"Ann","Icon":"horse1"}}"#, now);
        assert_eq!(emitted(&effects).len(), 3);
        assert_eq!(emitted(&effects)[2], &DerbyEvent::VictoryCue);
        assert_eq!(session.phase(), GamePhase::Ended);

        let effects = session.handle_frame(&round_summary(10, true), now);
        assert_eq!(emitted(&effects).len(), 1);
        assert_eq!(session.phase(), GamePhase::Ended);
    }

    #[test]
    fn out_of_phase_frames_are_dropped() {
        let now = Instant::now();
        let mut session = GameSession::default();

        assert!(session.handle_frame(r#"{"AboutToStart":{}}"#, now).is_empty());
        assert!(session.handle_frame(QUESTION, now).is_empty());
        assert!(session
            .handle_frame(r#"{"PlayerResult":{"CorrectAnswer":0,"Correct":true}}"#, now)
            .is_empty());
        assert_eq!(session.phase(), GamePhase::Lobby);
    }

    #[test]
    fn malformed_and_unknown_frames_are_dropped() {
        let now = Instant::now();
        let mut session = GameSession::default();
        session.handle_frame(r#"{"Welcome":{"SecondsTillStart":1}}"#, now);

        for frame in [
            "not json",
            "{}",
            r#"{"Scoreboard":{}}"#,
            r#"{"Welcome":{},"Error":{"Message":"x"}}"#,
            r#"{"PresentQuestion":{"WordToGuess":"x","Definitions":["a","b"]}}"#,
        ] {
            assert!(session.handle_frame(frame, now).is_empty(), "{frame}");
            assert_eq!(session.phase(), GamePhase::Waiting, "{frame}");
        }
    }

    #[test]
    fn frame_preview_is_bounded_on_char_boundary() {
        assert_eq!(frame_preview("short"), "short");

        let long = "é".repeat(200);
        let preview = frame_preview(&long);
        assert!(preview.len() <= FRAME_PREVIEW_LEN);
        assert!(preview.len() >= FRAME_PREVIEW_LEN - 1);
        assert!(preview.chars().all(|c| c == 'é'));

        let mut session = GameSession::default();
        assert!(session.handle_frame(&long, Instant::now()).is_empty());
    }

    #[test]
    fn only_first_selection_sends_a_response() {
        let mut session = session_at_question();

        let effects = session.select_definition(0).unwrap();
        assert_eq!(
            sent(&effects),
            vec![&ClientMessage::PlayerResponse(PlayerResponse {
                response: DefinitionIndex(0)
            })]
        );
        assert!(emitted(&effects).contains(&&DerbyEvent::DefinitionsDisabled));

        assert!(session.select_definition(0).unwrap().is_empty());
        assert!(session.select_definition(2).unwrap().is_empty());
        assert_eq!(session.pending_response(), Some(DefinitionIndex(0)));
    }

    #[test]
    fn next_question_resets_pending_response() {
        let now = Instant::now();
        let mut session = session_at_question();
        session.select_definition(1).unwrap();

        session.handle_frame(QUESTION, now);
        assert_eq!(session.pending_response(), None);
        let effects = session.select_definition(2).unwrap();
        assert_eq!(sent(&effects).len(), 1);
    }

    #[test]
    fn selection_out_of_range_is_an_error() {
        let mut session = session_at_question();
        assert!(matches!(
            session.select_definition(3),
            Err(DerbyError::DefinitionOutOfRange(3))
        ));
        assert_eq!(session.pending_response(), None);
    }

    #[test]
    fn selection_outside_question_is_inert() {
        let mut session = GameSession::default();
        assert!(session.select_definition(0).unwrap().is_empty());
        assert_eq!(session.pending_response(), None);
    }

    #[test]
    fn selection_after_result_is_inert() {
        let now = Instant::now();
        let mut session = session_at_question();
        session.handle_frame(r#"{"PlayerResult":{"CorrectAnswer":0,"Correct":false}}"#, now);
        assert!(session.select_definition(0).unwrap().is_empty());
    }

    #[test]
    fn wrong_answer_marks_committed_selection() {
        let now = Instant::now();
        let mut session = session_at_question();
        session.select_definition(2).unwrap();

        let effects =
            session.handle_frame(r#"{"PlayerResult":{"CorrectAnswer":0,"Correct":false}}"#, now);
        assert_eq!(
            emitted(&effects),
            vec![
                &DerbyEvent::DefinitionMarkedCorrect {
                    index: DefinitionIndex(0)
                },
                &DerbyEvent::DefinitionMarkedIncorrect {
                    index: DefinitionIndex(2)
                },
            ]
        );
    }

    #[test]
    fn right_answer_marks_only_correct_option() {
        let now = Instant::now();
        let mut session = session_at_question();
        session.select_definition(0).unwrap();

        let effects =
            session.handle_frame(r#"{"PlayerResult":{"CorrectAnswer":0,"Correct":true}}"#, now);
        assert_eq!(
            emitted(&effects),
            vec![&DerbyEvent::DefinitionMarkedCorrect {
                index: DefinitionIndex(0)
            }]
        );
    }

    #[test]
    fn unanswered_wrong_result_marks_nothing_incorrect() {
        let now = Instant::now();
        let mut session = session_at_question();
        let effects =
            session.handle_frame(r#"{"PlayerResult":{"CorrectAnswer":1,"Correct":false}}"#, now);
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn out_of_range_correct_answer_is_dropped() {
        let now = Instant::now();
        let mut session = session_at_question();
        session.select_definition(1).unwrap();

        let effects =
            session.handle_frame(r#"{"PlayerResult":{"CorrectAnswer":7,"Correct":false}}"#, now);
        assert!(effects.is_empty());
        assert_eq!(session.phase(), GamePhase::Question);

        let result = ServerMessage::PlayerResult(PlayerResult {
            correct_answer: DefinitionIndex(7),
            correct: false,
        });
        assert!(session.handle_message(result, now).is_empty());
        assert_eq!(session.phase(), GamePhase::Question);

        let effects =
            session.handle_frame(r#"{"PlayerResult":{"CorrectAnswer":0,"Correct":false}}"#, now);
        assert_eq!(emitted(&effects).len(), 2);
        assert_eq!(session.phase(), GamePhase::RoundResult);
    }

    #[test]
    fn round_summary_creates_then_updates_tracks() {
        let now = Instant::now();
        let mut session = session_at_question();

        let first = session.handle_frame(&round_summary(250, true), now);
        let second = session.handle_frame(&round_summary(500, true), now);

        let created = track_update(&first);
        assert!(created.created);
        assert_eq!(created.position, 50);
        assert_eq!(created.icon_path, "images/horse1.png");

        let updated = track_update(&second);
        assert!(!updated.created);
        assert_eq!(updated.position, 100);
        assert_eq!(session.player(&PlayerId::from(1)).unwrap().score, 500);
        assert_eq!(session.players().count(), 1);
    }

    #[test]
    fn repeated_round_summary_is_idempotent() {
        let now = Instant::now();
        let mut once = session_at_question();
        once.handle_frame(&round_summary(300, true), now);

        let mut twice = session_at_question();
        twice.handle_frame(&round_summary(300, true), now);
        let again = twice.handle_frame(&round_summary(300, true), now);

        let update = track_update(&again);
        assert_eq!(update.position, 60);
        assert_eq!(
            once.players().collect::<Vec<_>>(),
            twice.players().collect::<Vec<_>>()
        );
    }

    #[test]
    fn inactive_player_uses_eliminated_icon() {
        let now = Instant::now();
        let mut session = session_at_question();
        let effects = session.handle_frame(&round_summary(100, false), now);
        let update = track_update(&effects);
        assert_eq!(update.icon_path, "images/dead.png");
        assert!(!update.active);
        assert_eq!(
            session.player(&PlayerId::from(1)).unwrap().icon,
            Icon::new("horse1")
        );
    }

    #[test]
    fn tracks_keep_first_seen_order() {
        let now = Instant::now();
        let mut session = session_at_question();
        session.handle_frame(
            r#"{"RoundSummary":{"PlayerStates":[
                {"Id":"b","Name":"Bo","Icon":"horse2","Score":0,"Active":true},
                {"Id":"a","Name":"Al","Icon":"horse3","Score":0,"Active":true}]}}"#,
            now,
        );
        session.handle_frame(
            r#"{"RoundSummary":{"PlayerStates":[
                {"Id":"a","Name":"Al","Icon":"horse3","Score":100,"Active":true},
                {"Id":"b","Name":"Bo","Icon":"horse2","Score":50,"Active":true}]}}"#,
            now,
        );
        let names: Vec<_> = session.players().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Bo", "Al"]);
    }

    #[test]
    fn welcome_target_score_overrides_default() {
        let now = Instant::now();
        let mut session = GameSession::default();
        session.handle_frame(r#"{"Welcome":{"SecondsTillStart":5,"TargetScore":200}}"#, now);
        assert_eq!(session.target_score(), 200);

        session.handle_frame(r#"{"AboutToStart":{}}"#, now);
        session.handle_frame(QUESTION, now);
        let effects = session.handle_frame(&round_summary(100, true), now);
        let update = track_update(&effects);
        assert_eq!(update.position, 50);
    }

    #[test]
    fn summary_reveals_winner() {
        let now = Instant::now();
        let mut session = session_at_question();
        let effects = session.handle_frame(r#"{"Summary":{"Winner":"Ann","Icon":"horse1"}}"#, now);
        assert_eq!(
            emitted(&effects),
            vec![
                &DerbyEvent::QuestionHidden,
                &DerbyEvent::WinnerShown {
                    name: "Ann".into(),
                    icon_path: "images/horse1.png".into()
                },
                &DerbyEvent::VictoryCue,
            ]
        );
    }

    #[test]
    fn countdown_ticks_do_not_change_phase() {
        let t0 = Instant::now();
        let mut session = GameSession::default();
        session.handle_frame(r#"{"Welcome":{"SecondsTillStart":1}}"#, t0);
        let effects = session.handle_frame(r#"{"AboutToStart":{}}"#, t0);
        assert_eq!(emitted(&effects).last(), Some(&&DerbyEvent::StartCue));
        assert_eq!(session.next_timer_deadline(), Some(t0 + Duration::from_millis(500)));

        let ticks = session.on_timer(t0 + Duration::from_millis(3500));
        assert_eq!(ticks.len(), 4);
        assert_eq!(
            ticks.last(),
            Some(&Effect::Emit(DerbyEvent::CountdownTick { label: "Go!" }))
        );
        assert_eq!(session.phase(), GamePhase::Countdown);

        let hide = session.on_timer(t0 + Duration::from_millis(4000));
        assert_eq!(hide, vec![Effect::Emit(DerbyEvent::CountdownHidden)]);
        assert_eq!(session.next_timer_deadline(), None);
        assert_eq!(session.phase(), GamePhase::Countdown);
    }

    #[test]
    fn second_about_to_start_replaces_countdown() {
        let t0 = Instant::now();
        let mut session = GameSession::default();
        session.handle_frame(r#"{"Welcome":{"SecondsTillStart":1}}"#, t0);
        session.handle_frame(r#"{"AboutToStart":{}}"#, t0);
        session.on_timer(t0 + Duration::from_millis(1500));

        let t1 = t0 + Duration::from_millis(2000);
        session.handle_frame(r#"{"AboutToStart":{}}"#, t1);
        assert_eq!(session.next_timer_deadline(), Some(t1 + Duration::from_millis(500)));

        // The first sequence's "1" step (t0 + 2.5s) must not fire on its own.
        let fired = session.on_timer(t0 + Duration::from_millis(2500));
        assert_eq!(
            fired,
            vec![Effect::Emit(DerbyEvent::CountdownTick { label: "3" })]
        );
    }
}
