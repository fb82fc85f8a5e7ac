#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Records come from a store the other seat also writes to; decoding a
    // record and its payload must never panic, whatever the bytes.
    if let Ok(event) = serde_json::from_slice::<duel_sync::protocol::GameEvent>(data) {
        let _ = event.body();
    }

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = serde_json::from_str::<duel_sync::protocol::Room>(s);
        let _ = serde_json::from_str::<duel_sync::protocol::MatchResult>(s);
    }
});
