#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for records as a hosted backend returns them.
//!
//! The fixtures mirror the JSON documents both seats read and write, so a
//! store implementation can hand them straight to `serde_json`.

use duel_sync::error_codes::ErrorCode;
use duel_sync::protocol::{
    AbandonPayload, EventBody, EventType, GameEvent, HitRequestPayload, MatchResult, Room,
    RoomStatus, ScoreUpdatePayload, Seat, SpawnPayload,
};
use duel_sync::DuelError;
use serde_json::json;

// ════════════════════════════════════════════════════════════════════
// Fixtures
// ════════════════════════════════════════════════════════════════════

fn record(id: &str, event_type: &str, payload: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "roomCode": "QX42",
        "type": event_type,
        "playerId": "4f1c9a8e-2b3d-4e5f-8a9b-0c1d2e3f4a5b",
        "payload": payload,
        "createdAt": 1_700_000_000_123_u64,
    })
}

// ════════════════════════════════════════════════════════════════════
// GameEvent bodies
// ════════════════════════════════════════════════════════════════════

#[test]
fn every_record_type_decodes_from_backend_json() {
    let cases = [
        (
            record("r1", "SPAWN", json!({ "x": 412.5, "y": 880.0, "objectiveId": "o-1" })),
            EventBody::Spawn(SpawnPayload {
                x: 412.5,
                y: 880.0,
                objective_id: "o-1".into(),
            }),
        ),
        (
            record("r2", "HIT_REQUEST", json!({ "playerId": "player1", "objectiveId": "o-1" })),
            EventBody::HitRequest(HitRequestPayload {
                player_id: Seat::Player1,
                objective_id: "o-1".into(),
            }),
        ),
        (
            record("r3", "SCORE_UPDATE", json!({ "p1Score": 4, "p2Score": 9 })),
            EventBody::ScoreUpdate(ScoreUpdatePayload {
                p1_score: 4,
                p2_score: 9,
            }),
        ),
        (record("r4", "PAUSE", json!({})), EventBody::Pause),
        (record("r5", "RESUME", json!({})), EventBody::Resume),
        (
            record("r6", "ABANDON", json!({ "abandoningPlayer": "player2" })),
            EventBody::Abandon(AbandonPayload {
                abandoning_player: Seat::Player2,
            }),
        ),
    ];

    for (fixture, expected) in cases {
        let event: GameEvent = serde_json::from_value(fixture).unwrap();
        assert_eq!(event.room_code, "QX42");
        assert_eq!(event.created_at, 1_700_000_000_123);
        assert_eq!(event.event_type, expected.event_type());
        assert_eq!(event.body().unwrap(), expected);
    }
}

#[test]
fn record_without_player_id_or_payload_decodes() {
    let event: GameEvent = serde_json::from_value(json!({
        "id": "r9",
        "roomCode": "QX42",
        "type": "RESUME",
        "createdAt": 5,
    }))
    .unwrap();
    assert!(event.player_id.is_none());
    assert_eq!(event.body().unwrap(), EventBody::Resume);
}

#[test]
fn unknown_seat_in_hit_request_is_malformed() {
    let event: GameEvent = serde_json::from_value(record(
        "r7",
        "HIT_REQUEST",
        json!({ "playerId": "player3", "objectiveId": "o-1" }),
    ))
    .unwrap();
    let err = event.body().unwrap_err();
    assert!(matches!(
        err,
        DuelError::MalformedPayload {
            event_type: EventType::HitRequest,
            ..
        }
    ));
    assert_eq!(err.code(), ErrorCode::MalformedRecord);
}

#[test]
fn unknown_record_type_is_rejected() {
    let result = serde_json::from_value::<GameEvent>(record("r8", "TELEPORT", json!({})));
    assert!(result.is_err());
}

// ════════════════════════════════════════════════════════════════════
// Rooms and results
// ════════════════════════════════════════════════════════════════════

#[test]
fn ready_room_fixture() {
    let room: Room = serde_json::from_value(json!({
        "code": "QX42",
        "status": "ready",
        "player1Id": "dev-1",
        "player1Name": "Ana",
        "player2Id": "dev-2",
        "player2Name": "Bo",
    }))
    .unwrap();
    assert_eq!(room.status, RoomStatus::Ready);
    assert_eq!(room.name_of(Seat::Player1), "Ana");
    assert_eq!(room.name_of(Seat::Player2), "Bo");
}

#[test]
fn match_result_serializes_camel_case() {
    let result = MatchResult {
        player1_name: "Ana".into(),
        player2_name: "Bo".into(),
        player1_score: 10,
        player2_score: 7,
        winner_name: "Ana".into(),
    };
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({
            "player1Name": "Ana",
            "player2Name": "Bo",
            "player1Score": 10,
            "player2Score": 7,
            "winnerName": "Ana",
        })
    );
}

#[test]
fn error_codes_serialize_screaming_snake_case() {
    assert_eq!(
        serde_json::to_value(ErrorCode::RoomNotFound).unwrap(),
        json!("ROOM_NOT_FOUND")
    );
    assert_eq!(
        serde_json::to_value(ErrorCode::Connectivity).unwrap(),
        json!("CONNECTIVITY")
    );
}
