//! # Loopback Derby
//!
//! Runs a complete one-player game against a scripted in-process server.
//! Shows how to implement [`Transport`] over plain channels, which is also
//! the easiest way to drive the client from your own tests.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_derby
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use word_derby_client::protocol::{ClientMessage, Icon};
use word_derby_client::{DerbyClient, DerbyConfig, DerbyError, DerbyEvent, Transport};

// ─────────────────────────────────────────────────────────────────────
// A channel-backed transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of the loopback; handed to `DerbyClient::start`.
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Server half of the loopback; the script reads and writes through it.
struct LoopbackServer {
    rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, frame: String) -> Result<(), DerbyError> {
        self.tx
            .send(frame)
            .map_err(|e| DerbyError::TransportSend(e.to_string()))
    }

    /// `None` once the script drops its sender, which ends the session.
    async fn recv(&mut self) -> Option<Result<String, DerbyError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), DerbyError> {
        self.rx.close();
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// The scripted server
// ─────────────────────────────────────────────────────────────────────

type ScriptResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

async fn run_script(mut server: LoopbackServer) -> ScriptResult {
    let Some(frame) = server.rx.recv().await else {
        return Err("client closed before registering".into());
    };
    let ClientMessage::NewPlayer(player) = serde_json::from_str::<ClientMessage>(&frame)? else {
        return Err(format!("expected a newplayer frame, got {frame}").into());
    };
    tracing::info!(name = %player.name, icon = %player.icon, "server: player registered");

    server.tx.send(r#"{"Welcome":{"SecondsTillStart":1}}"#.into())?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    server.tx.send(r#"{"AboutToStart":{}}"#.into())?;
    tokio::time::sleep(Duration::from_millis(4200)).await;

    server.tx.send(
        r#"{"PresentQuestion":{"WordToGuess":"gallop","Definitions":["a fast run on horseback","a kind of soup","to whisper"]}}"#
            .into(),
    )?;

    let Some(frame) = server.rx.recv().await else {
        return Err("client closed before answering".into());
    };
    let ClientMessage::PlayerResponse(response) = serde_json::from_str::<ClientMessage>(&frame)? else {
        return Err(format!("expected a playerresponse frame, got {frame}").into());
    };
    let correct = response.response.get() == 0;
    let score = if correct { 500 } else { 0 };

    server.tx.send(format!(
        r#"{{"PlayerResult":{{"CorrectAnswer":0,"Correct":{correct}}}}}"#
    ))?;
    server.tx.send(format!(
        r#"{{"RoundSummary":{{"PlayerStates":[{{"Id":1,"Name":"{name}","Icon":"{icon}","Score":{score},"Active":true}}]}}}}"#,
        name = player.name,
        icon = player.icon,
    ))?;
    server.tx.send(format!(
        r#"{{"Summary":{{"Winner":"{name}","Icon":"{icon}"}}}}"#,
        name = player.name,
        icon = player.icon,
    ))?;

    // Dropping `server` here closes the connection.
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────
// The client
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (transport, server) = loopback_pair();
    let script = tokio::spawn(run_script(server));

    let config = DerbyConfig::new("loopback://local");
    let (mut client, mut events) = DerbyClient::start(transport, config);

    while let Some(event) = events.recv().await {
        match event {
            DerbyEvent::Connected => client.register("Ann", Icon::new("horse1"))?,
            DerbyEvent::QuestionShown { question } => {
                tracing::info!(word = %question.word_to_guess, "question");
                client.select_definition(0)?;
            }
            DerbyEvent::TrackUpdated(update) => {
                tracing::info!(name = %update.name, position = update.position, "track");
            }
            DerbyEvent::WinnerShown { name, icon_path } => {
                tracing::info!(%name, %icon_path, "winner");
            }
            DerbyEvent::Disconnected { reason } => {
                tracing::info!("disconnected: {}", reason.as_deref().unwrap_or("clean"));
                break;
            }
            other => tracing::info!("event: {other:?}"),
        }
    }

    client.shutdown().await;
    match script.await? {
        Ok(()) => tracing::info!("script finished"),
        Err(e) => tracing::error!("script failed: {e}"),
    }
    Ok(())
}
