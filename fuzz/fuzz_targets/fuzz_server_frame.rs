#![no_main]

use libfuzzer_sys::fuzz_target;
use tokio::time::Instant;
use word_derby_client::protocol::ServerMessage;
use word_derby_client::GameSession;

fuzz_target!(|data: &[u8]| {
    // Raw-byte decoding, including serde_json's UTF-8 validation.
    let _ = serde_json::from_slice::<ServerMessage>(data);

    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Feed every line as a frame so the fuzzer can reach later phases.
    let mut session = GameSession::default();
    let now = Instant::now();
    for frame in text.lines() {
        let _ = session.handle_frame(frame, now);
        let _ = session.on_timer(now);
        let _ = session.select_definition(0);
    }
});
