#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end client tests for the Word Derby client.
//!
//! Uses the shared `MockTransport` from `tests/common` to feed server frames
//! one at a time and verify the presentation events and outbound frames that
//! `DerbyClient` produces. Countdown timing runs on paused tokio time.

mod common;

use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio::time::Instant;
use word_derby_client::protocol::{DefinitionIndex, Icon, PlayerId};
use word_derby_client::{DerbyClient, DerbyConfig, DerbyError, DerbyEvent, GamePhase};

use common::{
    about_to_start_json, error_json, player_result_json, player_state, question_json,
    round_summary_json, summary_json, welcome_json, welcome_with_target_json, MockTransport,
    ServerHandle,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn start_client() -> (DerbyClient, Receiver<DerbyEvent>, ServerHandle) {
    let (transport, server) = MockTransport::new();
    let config = DerbyConfig::new("ws://test.invalid/ws");
    let (client, events) = DerbyClient::start(transport, config);
    (client, events, server)
}

async fn next(events: &mut Receiver<DerbyEvent>) -> DerbyEvent {
    events.recv().await.expect("event channel closed early")
}

/// Consume `Connected`, register Ann, and consume `SelectionHidden`.
async fn connect_and_register(client: &DerbyClient, events: &mut Receiver<DerbyEvent>) {
    assert_eq!(next(events).await, DerbyEvent::Connected);
    client.register("Ann", Icon::new("horse1")).expect("register");
    assert_eq!(next(events).await, DerbyEvent::SelectionHidden);
}

/// Drive a registered client through Welcome and the countdown into a question.
async fn advance_to_question(
    client: &DerbyClient,
    events: &mut Receiver<DerbyEvent>,
    server: &ServerHandle,
) {
    connect_and_register(client, events).await;
    server.push(welcome_json(10));
    assert!(matches!(next(events).await, DerbyEvent::WaitingShown { .. }));
    server.push(about_to_start_json());
    assert_eq!(next(events).await, DerbyEvent::WaitingHidden);
    assert!(matches!(next(events).await, DerbyEvent::CountdownShown { .. }));
    assert_eq!(next(events).await, DerbyEvent::StartCue);
    server.push(question_json("abate", ["lessen", "increase", "rotate"]));
    assert!(matches!(next(events).await, DerbyEvent::QuestionShown { .. }));
}

// ════════════════════════════════════════════════════════════════════
// A full game
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn single_player_game_from_registration_to_winner() {
    let (client, mut events, server) = start_client();

    // Registration.
    connect_and_register(&client, &mut events).await;
    assert_eq!(
        server.sent_frames(),
        [r#"{"MessageType":"newplayer","NewPlayer":{"Name":"Ann","Icon":"horse1"}}"#]
    );

    server.push(welcome_json(10));
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::WaitingShown {
            seconds_till_start: 10
        }
    );
    assert_eq!(client.current_phase().await, GamePhase::Waiting);

    // Countdown.
    let started = Instant::now();
    server.push(about_to_start_json());
    assert_eq!(next(&mut events).await, DerbyEvent::WaitingHidden);
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::CountdownShown {
            ticks: vec!["3", "2", "1", "Go!"],
            seconds: None
        }
    );
    assert_eq!(next(&mut events).await, DerbyEvent::StartCue);

    for (label, at_ms) in [("3", 500), ("2", 1500), ("1", 2500), ("Go!", 3500)] {
        assert_eq!(next(&mut events).await, DerbyEvent::CountdownTick { label });
        assert_eq!(started.elapsed(), Duration::from_millis(at_ms), "tick {label}");
    }
    assert_eq!(next(&mut events).await, DerbyEvent::CountdownHidden);
    assert_eq!(started.elapsed(), Duration::from_millis(4000));

    // Question and answer.
    server.push(question_json("abate", ["lessen", "increase", "rotate"]));
    let DerbyEvent::QuestionShown { question } = next(&mut events).await else {
        panic!("expected QuestionShown");
    };
    assert_eq!(question.word_to_guess, "abate");
    assert_eq!(question.definitions[0], "lessen");
    assert_eq!(client.current_phase().await, GamePhase::Question);

    client.select_definition(0).expect("select");
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::DefinitionSelected {
            index: DefinitionIndex(0)
        }
    );
    assert_eq!(next(&mut events).await, DerbyEvent::DefinitionsDisabled);
    assert_eq!(
        server.sent_frames().last().map(String::as_str),
        Some(r#"{"MessageType":"playerresponse","PlayerResponse":{"Response":0}}"#)
    );

    server.push(player_result_json(0, true));
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::DefinitionMarkedCorrect {
            index: DefinitionIndex(0)
        }
    );

    // Track.
    server.push(round_summary_json(vec![player_state(1, "Ann", "horse1", 500, true)]));
    let DerbyEvent::TrackUpdated(update) = next(&mut events).await else {
        panic!("expected TrackUpdated");
    };
    assert_eq!(update.player_id, PlayerId::Number(1));
    assert_eq!(update.name, "Ann");
    assert_eq!(update.icon_path, "images/horse1.png");
    assert_eq!(update.position, 100);
    assert!(update.active);
    assert!(update.created);

    // Winner.
    server.push(summary_json("Ann", "horse1"));
    assert_eq!(next(&mut events).await, DerbyEvent::QuestionHidden);
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::WinnerShown {
            name: "Ann".into(),
            icon_path: "images/horse1.png".into()
        }
    );
    assert_eq!(next(&mut events).await, DerbyEvent::VictoryCue);
    assert_eq!(client.current_phase().await, GamePhase::Ended);

    server.hang_up();
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::Disconnected { reason: None }
    );
    assert!(events.recv().await.is_none());
    assert_eq!(server.sent_frames().len(), 2);
}

// ════════════════════════════════════════════════════════════════════
// Answers
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn only_first_selection_is_sent() {
    let (client, mut events, server) = start_client();
    advance_to_question(&client, &mut events, &server).await;

    client.select_definition(1).expect("first select");
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::DefinitionSelected {
            index: DefinitionIndex(1)
        }
    );
    assert_eq!(next(&mut events).await, DerbyEvent::DefinitionsDisabled);

    client.select_definition(2).expect("second select is accepted and ignored");
    client.select_definition(0).expect("third select is accepted and ignored");

    server.push(player_result_json(1, true));
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::DefinitionMarkedCorrect {
            index: DefinitionIndex(1)
        }
    );

    let responses: Vec<_> = server
        .sent_frames()
        .into_iter()
        .filter(|f| f.contains("playerresponse"))
        .collect();
    assert_eq!(
        responses,
        [r#"{"MessageType":"playerresponse","PlayerResponse":{"Response":1}}"#]
    );
}

#[tokio::test(start_paused = true)]
async fn wrong_answer_marks_correct_and_selected() {
    let (client, mut events, server) = start_client();
    advance_to_question(&client, &mut events, &server).await;

    client.select_definition(2).expect("select");
    let _ = next(&mut events).await; // DefinitionSelected
    let _ = next(&mut events).await; // DefinitionsDisabled

    server.push(player_result_json(0, false));
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::DefinitionMarkedCorrect {
            index: DefinitionIndex(0)
        }
    );
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::DefinitionMarkedIncorrect {
            index: DefinitionIndex(2)
        }
    );
    assert_eq!(client.current_phase().await, GamePhase::RoundResult);
}

#[tokio::test(start_paused = true)]
async fn unanswered_question_only_marks_correct() {
    let (client, mut events, server) = start_client();
    advance_to_question(&client, &mut events, &server).await;

    server.push(player_result_json(1, false));
    server.push(round_summary_json(vec![player_state(1, "Ann", "horse1", 0, true)]));

    assert_eq!(
        next(&mut events).await,
        DerbyEvent::DefinitionMarkedCorrect {
            index: DefinitionIndex(1)
        }
    );
    assert!(matches!(next(&mut events).await, DerbyEvent::TrackUpdated(_)));
}

#[tokio::test(start_paused = true)]
async fn new_question_allows_a_new_answer() {
    let (client, mut events, server) = start_client();
    advance_to_question(&client, &mut events, &server).await;

    client.select_definition(0).expect("select");
    let _ = next(&mut events).await;
    let _ = next(&mut events).await;
    server.push(player_result_json(0, true));
    let _ = next(&mut events).await;

    server.push(question_json("ossify", ["harden", "melt", "sing"]));
    assert!(matches!(next(&mut events).await, DerbyEvent::QuestionShown { .. }));

    client.select_definition(2).expect("select on the next question");
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::DefinitionSelected {
            index: DefinitionIndex(2)
        }
    );
    assert_eq!(
        server.sent_frames().last().map(String::as_str),
        Some(r#"{"MessageType":"playerresponse","PlayerResponse":{"Response":2}}"#)
    );
}

// ════════════════════════════════════════════════════════════════════
// Track
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn round_summary_creates_then_moves_tracks() {
    let (client, mut events, server) = start_client();
    connect_and_register(&client, &mut events).await;
    server.push(welcome_json(5));
    let _ = next(&mut events).await;

    server.push(round_summary_json(vec![
        player_state(1, "Ann", "horse1", 100, true),
        player_state(2, "Bob", "horse2", 0, true),
    ]));
    for (id, position) in [(1, 20), (2, 0)] {
        let DerbyEvent::TrackUpdated(update) = next(&mut events).await else {
            panic!("expected TrackUpdated");
        };
        assert_eq!(update.player_id, PlayerId::Number(id));
        assert_eq!(update.position, position);
        assert!(update.created);
    }

    server.push(round_summary_json(vec![
        player_state(2, "Bob", "horse2", 600, true),
        player_state(1, "Ann", "horse1", 100, false),
    ]));

    let DerbyEvent::TrackUpdated(bob) = next(&mut events).await else {
        panic!("expected TrackUpdated");
    };
    assert_eq!(bob.position, 100);
    assert!(!bob.created);

    let DerbyEvent::TrackUpdated(ann) = next(&mut events).await else {
        panic!("expected TrackUpdated");
    };
    assert!(!ann.active);
    assert_eq!(ann.icon_path, "images/dead.png");

    let names: Vec<_> = client.players().await.into_iter().map(|p| p.name).collect();
    assert_eq!(names, ["Ann", "Bob"]);
}

#[tokio::test(start_paused = true)]
async fn welcome_target_score_overrides_config() {
    let (client, mut events, server) = start_client();
    connect_and_register(&client, &mut events).await;

    server.push(welcome_with_target_json(5, 1000));
    let _ = next(&mut events).await;
    server.push(round_summary_json(vec![player_state(7, "Ann", "horse1", 250, true)]));

    let DerbyEvent::TrackUpdated(update) = next(&mut events).await else {
        panic!("expected TrackUpdated");
    };
    assert_eq!(update.position, 25);
}

#[tokio::test(start_paused = true)]
async fn icon_dir_is_configurable() {
    let (transport, server) = MockTransport::new();
    let config = DerbyConfig::new("ws://test.invalid/ws").with_icon_dir("assets/horses");
    let (_client, mut events) = DerbyClient::start(transport, config);
    let _ = next(&mut events).await; // Connected

    server.push(summary_json("Bob", "horse2"));
    assert_eq!(next(&mut events).await, DerbyEvent::QuestionHidden);
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::WinnerShown {
            name: "Bob".into(),
            icon_path: "assets/horses/horse2.png".into()
        }
    );
}

// ════════════════════════════════════════════════════════════════════
// Countdown
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn repeated_about_to_start_restarts_countdown() {
    let (client, mut events, server) = start_client();
    connect_and_register(&client, &mut events).await;
    server.push(welcome_json(10));
    let _ = next(&mut events).await;

    let started = Instant::now();
    server.push(about_to_start_json());
    for _ in 0..3 {
        let _ = next(&mut events).await;
    }
    assert_eq!(next(&mut events).await, DerbyEvent::CountdownTick { label: "3" });
    assert_eq!(started.elapsed(), Duration::from_millis(500));

    server.push(about_to_start_json());
    assert_eq!(next(&mut events).await, DerbyEvent::WaitingHidden);
    assert!(matches!(next(&mut events).await, DerbyEvent::CountdownShown { .. }));
    assert_eq!(next(&mut events).await, DerbyEvent::StartCue);

    assert_eq!(next(&mut events).await, DerbyEvent::CountdownTick { label: "3" });
    assert_eq!(started.elapsed(), Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn question_during_countdown_keeps_ticking() {
    let (client, mut events, server) = start_client();
    connect_and_register(&client, &mut events).await;
    server.push(welcome_json(10));
    let _ = next(&mut events).await;

    server.push(about_to_start_json());
    server.push(question_json("abate", ["lessen", "increase", "rotate"]));
    for _ in 0..3 {
        let _ = next(&mut events).await;
    }
    assert!(matches!(next(&mut events).await, DerbyEvent::QuestionShown { .. }));

    let mut ticks = Vec::new();
    loop {
        match next(&mut events).await {
            DerbyEvent::CountdownTick { label } => ticks.push(label),
            DerbyEvent::CountdownHidden => break,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert_eq!(ticks, ["3", "2", "1", "Go!"]);
    assert_eq!(client.current_phase().await, GamePhase::Question);
}

/// Register, receive Welcome, and start the countdown; returns the start time.
async fn start_countdown(
    client: &DerbyClient,
    events: &mut Receiver<DerbyEvent>,
    server: &ServerHandle,
) -> Instant {
    connect_and_register(client, events).await;
    server.push(welcome_json(10));
    let _ = next(events).await;
    let started = Instant::now();
    server.push(about_to_start_json());
    for _ in 0..3 {
        let _ = next(events).await;
    }
    started
}

async fn assert_countdown_completes(events: &mut Receiver<DerbyEvent>, started: Instant) {
    for (label, at_ms) in [("3", 500), ("2", 1500), ("1", 2500), ("Go!", 3500)] {
        assert_eq!(next(events).await, DerbyEvent::CountdownTick { label });
        assert_eq!(started.elapsed(), Duration::from_millis(at_ms), "tick {label}");
    }
    assert_eq!(next(events).await, DerbyEvent::CountdownHidden);
    assert_eq!(started.elapsed(), Duration::from_millis(4000));
}

#[tokio::test(start_paused = true)]
async fn countdown_keeps_running_after_summary() {
    let (client, mut events, server) = start_client();
    let started = start_countdown(&client, &mut events, &server).await;

    server.push(summary_json("Bo", "horse2"));
    assert_eq!(next(&mut events).await, DerbyEvent::QuestionHidden);
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::WinnerShown {
            name: "Bo".into(),
            icon_path: "images/horse2.png".into()
        }
    );
    assert_eq!(next(&mut events).await, DerbyEvent::VictoryCue);
    assert_eq!(client.current_phase().await, GamePhase::Ended);

    assert_countdown_completes(&mut events, started).await;
    assert_eq!(client.current_phase().await, GamePhase::Ended);
}

#[tokio::test(start_paused = true)]
async fn countdown_keeps_running_after_error() {
    let (client, mut events, server) = start_client();
    let started = start_countdown(&client, &mut events, &server).await;

    server.push(error_json("server restarting"));
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::ErrorShown {
            message: "server restarting".into()
        }
    );
    assert_eq!(client.current_phase().await, GamePhase::Errored);

    assert_countdown_completes(&mut events, started).await;
    assert_eq!(client.current_phase().await, GamePhase::Errored);
}

#[tokio::test(start_paused = true)]
async fn final_round_summary_after_winner_moves_tracks() {
    let (client, mut events, server) = start_client();
    advance_to_question(&client, &mut events, &server).await;

    server.push(summary_json("Ann", "horse1"));
    for _ in 0..3 {
        let _ = next(&mut events).await;
    }
    server.push(round_summary_json(vec![
        player_state(1, "Ann", "horse1", 500, true),
        player_state(2, "Bo", "horse2", 120, false),
    ]));

    let DerbyEvent::TrackUpdated(ann) = next(&mut events).await else {
        panic!("expected TrackUpdated");
    };
    assert_eq!(ann.position, 100);
    assert!(ann.created);
    let DerbyEvent::TrackUpdated(bo) = next(&mut events).await else {
        panic!("expected TrackUpdated");
    };
    assert_eq!(bo.icon_path, "images/dead.png");
    assert!(!bo.active);
    assert_eq!(client.current_phase().await, GamePhase::Ended);
}

#[tokio::test(start_paused = true)]
async fn slow_renderer_loses_no_events() {
    let (transport, server) = MockTransport::new();
    let config = DerbyConfig::new("ws://test.invalid/ws").with_event_channel_capacity(4);
    let (client, mut events) = DerbyClient::start(transport, config);
    connect_and_register(&client, &mut events).await;

    server.push(welcome_json(10));
    server.push(about_to_start_json());
    server.push(question_json("abate", ["lessen", "increase", "rotate"]));
    server.push(round_summary_json(vec![player_state(1, "Ann", "horse1", 50, true)]));
    tokio::task::yield_now().await;

    assert!(matches!(next(&mut events).await, DerbyEvent::WaitingShown { .. }));
    assert_eq!(next(&mut events).await, DerbyEvent::WaitingHidden);
    assert!(matches!(next(&mut events).await, DerbyEvent::CountdownShown { .. }));
    assert_eq!(next(&mut events).await, DerbyEvent::StartCue);
    assert!(matches!(next(&mut events).await, DerbyEvent::QuestionShown { .. }));
    assert!(matches!(next(&mut events).await, DerbyEvent::TrackUpdated(_)));
    assert_eq!(client.current_phase().await, GamePhase::Question);
}

// ════════════════════════════════════════════════════════════════════
// Protocol faults
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn out_of_phase_frames_are_dropped() {
    let (client, mut events, server) = start_client();
    connect_and_register(&client, &mut events).await;

    server.push(player_result_json(0, true));
    server.push(question_json("abate", ["lessen", "increase", "rotate"]));
    server.push(welcome_json(3));

    assert_eq!(
        next(&mut events).await,
        DerbyEvent::WaitingShown {
            seconds_till_start: 3
        }
    );
    assert_eq!(client.current_phase().await, GamePhase::Waiting);
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_skipped() {
    let (client, mut events, server) = start_client();
    connect_and_register(&client, &mut events).await;

    server.push("not json");
    server.push(r#"{"Welcome":{},"Summary":{"Winner":"x","Icon":"y"}}"#);
    server.push(r#"{"Teleport":{}}"#);
    server.push(welcome_json(3));

    assert!(matches!(
        next(&mut events).await,
        DerbyEvent::WaitingShown { .. }
    ));
    assert!(client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn out_of_range_correct_answer_is_skipped() {
    let (client, mut events, server) = start_client();
    advance_to_question(&client, &mut events, &server).await;

    server.push(r#"{"PlayerResult":{"CorrectAnswer":7,"Correct":true}}"#);
    server.push(player_result_json(2, true));
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::DefinitionMarkedCorrect {
            index: DefinitionIndex(2)
        }
    );
    assert_eq!(client.current_phase().await, GamePhase::RoundResult);
}

#[tokio::test(start_paused = true)]
async fn server_error_is_shown_and_ends_the_game() {
    let (client, mut events, server) = start_client();
    advance_to_question(&client, &mut events, &server).await;

    server.push(error_json("game full"));
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::ErrorShown {
            message: "game full".into()
        }
    );
    assert_eq!(client.current_phase().await, GamePhase::Errored);

    server.push(question_json("ossify", ["harden", "melt", "sing"]));
    server.push(error_json("still full"));
    assert_eq!(
        next(&mut events).await,
        DerbyEvent::ErrorShown {
            message: "still full".into()
        }
    );
}

// ════════════════════════════════════════════════════════════════════
// Local validation
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn registration_requires_name_and_icon() {
    let (mut client, mut events, server) = start_client();
    assert_eq!(next(&mut events).await, DerbyEvent::Connected);

    assert!(matches!(
        client.register("  ", Icon::new("horse1")),
        Err(DerbyError::EmptyPlayerName)
    ));
    assert!(matches!(
        client.register("Ann", Icon::new("")),
        Err(DerbyError::NoIconSelected)
    ));

    client.register("Ann", Icon::new("horse1")).expect("register");
    assert_eq!(next(&mut events).await, DerbyEvent::SelectionHidden);
    assert_eq!(server.sent_frames().len(), 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn second_registration_sends_nothing() {
    let (mut client, mut events, server) = start_client();
    connect_and_register(&client, &mut events).await;

    client.register("Ann", Icon::new("horse2")).expect("queued");
    server.push(welcome_json(1));
    assert!(matches!(
        next(&mut events).await,
        DerbyEvent::WaitingShown { .. }
    ));
    assert_eq!(server.sent_frames().len(), 1);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn selection_outside_question_sends_nothing() {
    let (mut client, mut events, server) = start_client();
    connect_and_register(&client, &mut events).await;

    client.select_definition(1).expect("queued");
    server.push(welcome_json(1));
    assert!(matches!(
        next(&mut events).await,
        DerbyEvent::WaitingShown { .. }
    ));
    assert_eq!(server.sent_frames().len(), 1);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn transport_error_disconnects_without_retry() {
    let (client, mut events, server) = start_client();
    connect_and_register(&client, &mut events).await;

    server.fail("connection reset");
    let DerbyEvent::Disconnected { reason } = next(&mut events).await else {
        panic!("expected Disconnected");
    };
    assert!(reason.expect("reason").contains("connection reset"));
    assert!(events.recv().await.is_none());

    assert!(!client.is_connected());
    assert!(matches!(
        client.select_definition(0),
        Err(DerbyError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_transport() {
    let (mut client, mut events, server) = start_client();
    assert_eq!(next(&mut events).await, DerbyEvent::Connected);

    client.shutdown().await;

    assert!(server.is_closed());
    assert!(matches!(
        next(&mut events).await,
        DerbyEvent::Disconnected { reason: Some(_) }
    ));
    assert!(events.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn dropping_client_ends_event_stream() {
    let (client, mut events, _server) = start_client();
    assert_eq!(next(&mut events).await, DerbyEvent::Connected);

    drop(client);

    let deadline = Duration::from_secs(1);
    let end = tokio::time::timeout(deadline, async {
        while events.recv().await.is_some() {}
    })
    .await;
    assert!(end.is_ok(), "event stream should end after the client is dropped");
}
