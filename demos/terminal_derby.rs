//! # Terminal Derby
//!
//! Plays Word Derby from a terminal:
//!
//! 1. Connect to the game server via WebSocket
//! 2. Register with a name and horse icon
//! 3. Answer each question by typing `1`, `2`, or `3`
//! 4. Watch the track after every round until a winner is announced
//!
//! ## Running
//!
//! ```sh
//! # Start a game server on localhost:8080, then:
//! cargo run --example terminal_derby -- Ann horse1
//!
//! # Override the server URL:
//! DERBY_URL=wss://derby.example.com/Prod cargo run --example terminal_derby -- Ann horse1
//! ```

use tokio::io::{AsyncBufReadExt, BufReader};
use word_derby_client::protocol::Icon;
use word_derby_client::{DerbyClient, DerbyConfig, DerbyEvent};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set `RUST_LOG=word_derby_client=debug` to see every frame.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let name = args.next().unwrap_or_else(|| "RustRider".to_string());
    let icon = Icon::new(args.next().unwrap_or_else(|| "horse1".to_string()));

    let config = DerbyConfig::from_env();
    println!("Connecting to {} ...", config.endpoint);
    let (mut client, mut events) = DerbyClient::connect(config).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    DerbyEvent::Connected => {
                        client.register(name.as_str(), icon.clone())?;
                        println!("Registered as {name} riding {icon}");
                    }
                    DerbyEvent::WaitingShown { seconds_till_start } => {
                        println!("Waiting for riders, starting in about {seconds_till_start}s");
                    }
                    DerbyEvent::CountdownTick { label } => println!("  {label}"),
                    DerbyEvent::QuestionShown { question } => {
                        println!();
                        println!("What does \"{}\" mean?", question.word_to_guess);
                        for (n, definition) in question.definitions.iter().enumerate() {
                            println!("  {}) {definition}", n + 1);
                        }
                    }
                    DerbyEvent::DefinitionMarkedCorrect { index } => {
                        println!("Answer: {}", index.get() + 1);
                    }
                    DerbyEvent::DefinitionMarkedIncorrect { .. } => println!("Not quite."),
                    DerbyEvent::TrackUpdated(update) => {
                        let lane = "-".repeat(usize::from(update.position) / 5);
                        let status = if update.active { "" } else { " (out)" };
                        println!("{:>12} |{lane}>{status}", update.name);
                    }
                    DerbyEvent::WinnerShown { name, .. } => println!("\n{name} wins the derby!"),
                    DerbyEvent::ErrorShown { message } => eprintln!("Server error: {message}"),
                    DerbyEvent::Disconnected { reason } => {
                        println!("Disconnected: {}", reason.as_deref().unwrap_or("server closed"));
                        break;
                    }
                    other => tracing::debug!("event: {other:?}"),
                }
            }

            line = stdin.next_line() => {
                match line? {
                    Some(line) => match line.trim().parse::<u8>() {
                        Ok(choice @ 1..=3) => client.select_definition(choice - 1)?,
                        _ => println!("Type 1, 2, or 3."),
                    },
                    None => break,
                }
            }

            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.shutdown().await;
    Ok(())
}
