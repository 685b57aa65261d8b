//! Async client for the Word Derby game server.
//!
//! [`DerbyClient`] is a thin handle. A background task owns the transport
//! and the [`GameSession`], and processes inbound frames, local commands, and
//! countdown deadlines one at a time. Presentation events come out of the
//! bounded [`tokio::sync::mpsc::Receiver<DerbyEvent>`] returned by
//! [`DerbyClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let config = DerbyConfig::new("wss://derby.example.com/Prod");
//! let transport = WebSocketTransport::connect(&config.endpoint).await?;
//! let (client, mut events) = DerbyClient::start(transport, config);
//!
//! client.register("Ann", Icon::new("horse1"))?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         DerbyEvent::QuestionShown { question } => { /* draw options */ }
//!         DerbyEvent::WinnerShown { name, .. } => println!("{name} wins"),
//!         DerbyEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, warn, Instrument};
use uuid::Uuid;

use crate::error::{DerbyError, Result};
use crate::event::DerbyEvent;
use crate::protocol::Icon;
use crate::session::{Effect, GamePhase, GameSession, Player, DEFAULT_TARGET_SCORE};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default timeout for establishing the connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Endpoint used by [`DerbyConfig::from_env`] when `DERBY_URL` is unset.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";

/// Environment variable read by [`DerbyConfig::from_env`].
pub const ENDPOINT_ENV_VAR: &str = "DERBY_URL";

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`DerbyClient`] session.
///
/// ```
/// use word_derby_client::client::DerbyConfig;
/// use std::time::Duration;
///
/// let config = DerbyConfig::new("ws://localhost:8080/ws")
///     .with_target_score(250)
///     .with_event_channel_capacity(64)
///     .with_shutdown_timeout(Duration::from_secs(2));
/// assert_eq!(config.target_score, 250);
/// assert_eq!(config.icon_dir, "images");
/// ```
#[derive(Debug, Clone)]
pub struct DerbyConfig {
    /// Address of the game server (`ws://` or `wss://`).
    pub endpoint: String,
    /// Score that puts a horse at the finish line.
    ///
    /// Defaults to **500**. A `TargetScore` in the server's `Welcome` frame
    /// takes precedence. Values below 1 are clamped to 1.
    pub target_score: u64,
    /// Directory prefix for icon image paths in presentation events.
    pub icon_dir: String,
    /// Capacity of the bounded event channel.
    ///
    /// Every event is delivered. If the renderer falls behind, the session
    /// stops reading frames until the channel has room again.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`DerbyClient::shutdown`] waits for the loop before aborting it.
    pub shutdown_timeout: Duration,
    /// How long to wait for the connection to be established.
    pub connect_timeout: Duration,
}

impl DerbyConfig {
    /// Create a configuration for `endpoint` with default values.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            target_score: DEFAULT_TARGET_SCORE,
            icon_dir: "images".to_string(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Read the endpoint from `DERBY_URL`, falling back to [`DEFAULT_ENDPOINT`].
    pub fn from_env() -> Self {
        let endpoint =
            std::env::var(ENDPOINT_ENV_VAR).unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        Self::new(endpoint)
    }

    #[must_use]
    pub fn with_target_score(mut self, target_score: u64) -> Self {
        self.target_score = target_score.max(1);
        self
    }

    #[must_use]
    pub fn with_icon_dir(mut self, icon_dir: impl Into<String>) -> Self {
        self.icon_dir = icon_dir.into();
        self
    }

    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Defaults to **1 second**. Zero aborts the loop without a graceful close.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ── Commands ────────────────────────────────────────────────────────

/// Local player actions queued to the session loop.
#[derive(Debug)]
enum Command {
    Register { name: String, icon: Icon },
    SelectDefinition(u8),
}

// ── Shared state ────────────────────────────────────────────────────

/// Snapshot of the session published by the loop for the handle's accessors.
struct ClientState {
    connected: AtomicBool,
    phase: Mutex<GamePhase>,
    players: Mutex<Vec<Player>>,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            phase: Mutex::new(GamePhase::Lobby),
            players: Mutex::new(Vec::new()),
        }
    }

    async fn publish(&self, session: &GameSession) {
        *self.phase.lock().await = session.phase();
        *self.players.lock().await = session.players().cloned().collect();
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running Word Derby session.
///
/// Action methods queue a command for the session loop and return
/// immediately; nothing waits for the server.
pub struct DerbyClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<ClientState>,
    session_id: Uuid,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl DerbyClient {
    /// Connect to `config.endpoint` over WebSocket and start a session.
    ///
    /// # Errors
    ///
    /// Returns [`DerbyError::Timeout`] if the connection is not established
    /// within `config.connect_timeout`, or [`DerbyError::Io`] if it fails.
    #[cfg(feature = "transport-websocket")]
    pub async fn connect(config: DerbyConfig) -> Result<(Self, mpsc::Receiver<DerbyEvent>)> {
        let transport = crate::transports::WebSocketTransport::connect_with_timeout(
            &config.endpoint,
            config.connect_timeout,
        )
        .await?;
        Ok(Self::start(transport, config))
    }

    /// Start the session loop on a connected transport.
    ///
    /// Returns the handle and the presentation event receiver. The receiver
    /// yields [`DerbyEvent::Connected`] first and [`DerbyEvent::Disconnected`]
    /// last.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: DerbyConfig,
    ) -> (Self, mpsc::Receiver<DerbyEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<DerbyEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(ClientState::new());
        let session = GameSession::new(config.target_score, config.icon_dir);
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("derby_session", session_id = %session_id);

        let task = tokio::spawn(
            session_loop(
                transport,
                session,
                cmd_rx,
                event_tx,
                Arc::clone(&state),
                shutdown_rx,
            )
            .instrument(span),
        );

        let client = Self {
            cmd_tx,
            state,
            session_id,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (client, event_rx)
    }

    // ── Player actions ──────────────────────────────────────────────

    /// Submit the local player's name and icon.
    ///
    /// # Errors
    ///
    /// [`DerbyError::EmptyPlayerName`] / [`DerbyError::NoIconSelected`] if a
    /// field is missing (nothing is sent), or [`DerbyError::NotConnected`] if
    /// the session has ended.
    pub fn register(&self, name: impl Into<String>, icon: Icon) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DerbyError::EmptyPlayerName);
        }
        if icon.is_empty() {
            return Err(DerbyError::NoIconSelected);
        }
        self.send(Command::Register { name, icon })
    }

    /// Pick one of the three definitions of the current question.
    ///
    /// Only the first pick per question is sent; later picks are ignored by
    /// the session.
    ///
    /// # Errors
    ///
    /// [`DerbyError::DefinitionOutOfRange`] for an index above 2, or
    /// [`DerbyError::NotConnected`] if the session has ended.
    pub fn select_definition(&self, index: u8) -> Result<()> {
        if crate::protocol::DefinitionIndex::checked(index).is_none() {
            return Err(DerbyError::DefinitionOutOfRange(index));
        }
        self.send(Command::SelectDefinition(index))
    }

    /// Stop the session loop and close the transport.
    ///
    /// The event receiver yields a final `Disconnected` and then `None`.
    pub async fn shutdown(&mut self) {
        debug!(session_id = %self.session_id, "shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while the transport is believed to be open.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Identifier attached to this session's log span.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The phase after the most recently processed input.
    pub async fn current_phase(&self) -> GamePhase {
        *self.state.phase.lock().await
    }

    /// Every known player, in track order.
    pub async fn players(&self) -> Vec<Player> {
        self.state.players.lock().await.clone()
    }

    fn send(&self, cmd: Command) -> Result<()> {
        if !self.is_connected() {
            return Err(DerbyError::NotConnected);
        }
        self.cmd_tx.send(cmd).map_err(|_| DerbyError::NotConnected)
    }
}

impl std::fmt::Debug for DerbyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerbyClient")
            .field("session_id", &self.session_id)
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for DerbyClient {
    fn drop(&mut self) {
        // No executor is available to drive a graceful close from Drop.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Outcome of applying one batch of effects.
enum Exit {
    /// Keep running.
    Continue,
    /// Stop; emit `Disconnected` with this reason.
    Stop(Option<String>),
}

/// Owns the transport and the session; runs until the transport closes, a
/// send/receive fails, or the handle shuts down.
async fn session_loop(
    mut transport: impl Transport,
    mut session: GameSession,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<DerbyEvent>,
    state: Arc<ClientState>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!("session loop started");
    emit_event(&event_tx, DerbyEvent::Connected).await;

    let reason = loop {
        let deadline = session.next_timer_deadline();

        let effects = tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => run_command(&mut session, cmd),
                None => {
                    debug!("command channel closed");
                    let _ = transport.close().await;
                    break Some("client shut down".to_string());
                }
            },

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                break Some("client shut down".to_string());
            }

            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => {
                    debug!(frame = %text, "received frame");
                    session.handle_frame(&text, Instant::now())
                }
                Some(Err(e)) => {
                    error!("transport receive error: {e}");
                    break Some(format!("transport receive error: {e}"));
                }
                None => {
                    debug!("transport closed by server");
                    break None;
                }
            },

            _ = sleep_until(deadline), if deadline.is_some() => {
                session.on_timer(Instant::now())
            }
        };

        // Publish before emitting so accessors agree with delivered events.
        state.publish(&session).await;
        if let Exit::Stop(reason) = apply_effects(&mut transport, &event_tx, effects).await {
            break reason;
        }
    };

    state.publish(&session).await;
    emit_disconnected(&event_tx, &state, reason).await;
    debug!("session loop exited");
}

fn run_command(session: &mut GameSession, cmd: Command) -> Vec<Effect> {
    let result = match cmd {
        Command::Register { name, icon } => session.register(&name, &icon),
        Command::SelectDefinition(index) => session.select_definition(index),
    };
    result.unwrap_or_else(|e| {
        warn!("ignoring player action: {e}");
        Vec::new()
    })
}

async fn apply_effects(
    transport: &mut impl Transport,
    event_tx: &mpsc::Sender<DerbyEvent>,
    effects: Vec<Effect>,
) -> Exit {
    for effect in effects {
        match effect {
            Effect::Emit(event) => emit_event(event_tx, event).await,
            Effect::Send(msg) => {
                let frame = match msg.to_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("failed to serialize client message: {e}");
                        continue;
                    }
                };
                debug!(frame = %frame, "sending frame");
                if let Err(e) = transport.send(frame).await {
                    error!("transport send error: {e}");
                    return Exit::Stop(Some(format!("transport send error: {e}")));
                }
            }
        }
    }
    Exit::Continue
}

/// Sleep until `deadline`; pending forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Deliver an event, waiting for room in the channel.
async fn emit_event(event_tx: &mpsc::Sender<DerbyEvent>, event: DerbyEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

/// Mark the client disconnected and deliver the final event, waiting for room.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<DerbyEvent>,
    state: &ClientState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    if event_tx
        .send(DerbyEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
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
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Records sent frames and replays scripted inbound frames.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, DerbyError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<std::result::Result<String, DerbyError>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            };
            (transport, sent, closed)
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, frame: String) -> std::result::Result<(), DerbyError> {
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, DerbyError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), DerbyError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Transport whose sends always fail.
    struct BrokenSendTransport;

    #[async_trait]
    impl Transport for BrokenSendTransport {
        async fn send(&mut self, _frame: String) -> std::result::Result<(), DerbyError> {
            Err(DerbyError::TransportSend("pipe broken".into()))
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, DerbyError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), DerbyError> {
            Ok(())
        }
    }

    /// Transport that never finishes closing.
    struct HangingCloseTransport {
        dropped: Arc<AtomicBool>,
    }

    impl Drop for HangingCloseTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for HangingCloseTransport {
        async fn send(&mut self, _frame: String) -> std::result::Result<(), DerbyError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, DerbyError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), DerbyError> {
            std::future::pending().await
        }
    }

    fn config() -> DerbyConfig {
        DerbyConfig::new("ws://test.invalid/ws")
    }

    #[test]
    fn config_defaults() {
        let config = DerbyConfig::new("ws://example.test/ws");
        assert_eq!(config.endpoint, "ws://example.test/ws");
        assert_eq!(config.target_score, 500);
        assert_eq!(config.icon_dir, "images");
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn config_clamps_zero_values() {
        let config = config()
            .with_event_channel_capacity(0)
            .with_target_score(0);
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.target_score, 1);
    }

    #[tokio::test]
    async fn connected_is_first_event() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = DerbyClient::start(transport, config());

        assert_eq!(events.recv().await.unwrap(), DerbyEvent::Connected);
        assert_eq!(client.current_phase().await, GamePhase::Lobby);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn register_sends_new_player_frame() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = DerbyClient::start(transport, config());
        let _ = events.recv().await; // Connected

        client.register("Ann", Icon::new("horse1")).unwrap();
        assert_eq!(events.recv().await.unwrap(), DerbyEvent::SelectionHidden);

        {
            let frames = sent.lock().unwrap();
            assert_eq!(
                frames.as_slice(),
                [r#"{"MessageType":"newplayer","NewPlayer":{"Name":"Ann","Icon":"horse1"}}"#]
            );
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn register_rejects_missing_fields_without_sending() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = DerbyClient::start(transport, config());
        let _ = events.recv().await; // Connected

        assert!(matches!(
            client.register("", Icon::new("horse1")),
            Err(DerbyError::EmptyPlayerName)
        ));
        assert!(matches!(
            client.register("Ann", Icon::new("")),
            Err(DerbyError::NoIconSelected)
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(sent.lock().unwrap().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn select_definition_rejects_out_of_range() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = DerbyClient::start(transport, config());
        assert!(matches!(
            client.select_definition(7),
            Err(DerbyError::DefinitionOutOfRange(7))
        ));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn welcome_updates_published_phase() {
        let (transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(
            r#"{"Welcome":{"SecondsTillStart":10}}"#.to_string(),
        ))]);
        let (mut client, mut events) = DerbyClient::start(transport, config());
        let _ = events.recv().await; // Connected

        assert_eq!(
            events.recv().await.unwrap(),
            DerbyEvent::WaitingShown {
                seconds_till_start: 10
            }
        );
        assert_eq!(client.current_phase().await, GamePhase::Waiting);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_frame_does_not_end_session() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok("{{{".to_string())),
            Some(Ok(r#"{"Unknown":{}}"#.to_string())),
            Some(Ok(r#"{"Welcome":{"SecondsTillStart":3}}"#.to_string())),
        ]);
        let (mut client, mut events) = DerbyClient::start(transport, config());
        let _ = events.recv().await; // Connected

        assert!(matches!(
            events.recv().await.unwrap(),
            DerbyEvent::WaitingShown { .. }
        ));
        assert!(client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn server_close_emits_disconnected_without_reason() {
        let (transport, _sent, _closed) = MockTransport::new(vec![None]);
        let (client, mut events) = DerbyClient::start(transport, config());
        let _ = events.recv().await; // Connected

        assert_eq!(
            events.recv().await.unwrap(),
            DerbyEvent::Disconnected { reason: None }
        );
        assert!(events.recv().await.is_none());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn receive_error_is_terminal() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Err(DerbyError::TransportReceive("reset by peer".into()))),
            Some(Ok(r#"{"Welcome":{"SecondsTillStart":3}}"#.to_string())),
        ]);
        let (client, mut events) = DerbyClient::start(transport, config());
        let _ = events.recv().await; // Connected

        let DerbyEvent::Disconnected { reason } = events.recv().await.unwrap() else {
            panic!("expected Disconnected");
        };
        assert!(reason.unwrap().contains("reset by peer"));
        assert!(events.recv().await.is_none());
        assert!(matches!(
            client.register("Ann", Icon::new("horse1")),
            Err(DerbyError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn send_error_is_terminal() {
        let (mut client, mut events) = DerbyClient::start(BrokenSendTransport, config());
        let _ = events.recv().await; // Connected

        client.register("Ann", Icon::new("horse1")).unwrap();

        let DerbyEvent::Disconnected { reason } = events.recv().await.unwrap() else {
            panic!("expected Disconnected");
        };
        assert!(reason.unwrap().contains("pipe broken"));
        assert!(!client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_transport_and_emits_disconnected() {
        let (transport, _sent, closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = DerbyClient::start(transport, config());
        let _ = events.recv().await; // Connected

        client.shutdown().await;

        assert_eq!(
            events.recv().await.unwrap(),
            DerbyEvent::Disconnected {
                reason: Some("client shut down".into())
            }
        );
        assert!(closed.load(Ordering::Relaxed));
        assert!(!client.is_connected());
        assert!(matches!(
            client.select_definition(0),
            Err(DerbyError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn shutdown_timeout_aborts_stuck_close() {
        let dropped = Arc::new(AtomicBool::new(false));
        let transport = HangingCloseTransport {
            dropped: Arc::clone(&dropped),
        };
        let config = config().with_shutdown_timeout(Duration::from_millis(20));
        let (mut client, mut events) = DerbyClient::start(transport, config);
        let _ = events.recv().await; // Connected

        client.shutdown().await;

        assert!(dropped.load(Ordering::Acquire));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = DerbyClient::start(transport, config());
        client.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn slow_renderer_still_receives_every_event_in_order() {
        let (transport, _sent, _closed) = MockTransport::new(vec![
            Some(Ok(r#"{"Welcome":{"SecondsTillStart":1}}"#.to_string())),
            Some(Ok(r#"{"AboutToStart":{}}"#.to_string())),
            Some(Ok(
                r#"{"PresentQuestion":{"WordToGuess":"abate","Definitions":["a","b","c"]}}"#
                    .to_string(),
            )),
            None,
        ]);

        let config = config().with_event_channel_capacity(1);
        let (_client, mut events) = DerbyClient::start(transport, config);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut received = Vec::new();
        while let Some(event) = events.recv().await {
            received.push(event);
        }
        assert_eq!(received.len(), 7, "{received:?}");
        assert_eq!(received[0], DerbyEvent::Connected);
        assert_eq!(
            received[1],
            DerbyEvent::WaitingShown {
                seconds_till_start: 1
            }
        );
        assert_eq!(received[2], DerbyEvent::WaitingHidden);
        assert!(matches!(received[3], DerbyEvent::CountdownShown { .. }));
        assert_eq!(received[4], DerbyEvent::StartCue);
        assert!(matches!(received[5], DerbyEvent::QuestionShown { .. }));
        assert_eq!(received[6], DerbyEvent::Disconnected { reason: None });
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (transport, _sent, _closed) = MockTransport::new(vec![]);
        let (mut client, _events) = DerbyClient::start(transport, config());
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("DerbyClient"));
        assert!(debug_str.contains(&client.session_id().to_string()));
        client.shutdown().await;
    }
}
