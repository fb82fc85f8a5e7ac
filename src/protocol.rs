//! Record types stored in the shared event log.
//!
//! Every type here serializes with the camelCase field names the backend
//! stores (`roomCode`, `objectiveId`, `p1Score`, ...). Event payloads are
//! kept as opaque JSON maps on [`GameEvent`] and decoded on demand with
//! [`GameEvent::body`], so a malformed record from an older or foreign
//! client never poisons the rest of the log.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{DuelError, Result};

// ── Type aliases ────────────────────────────────────────────────────

/// Store-assigned identifier of a record.
pub type RecordId = String;

/// Identifier of a spawned target.
pub type ObjectiveId = String;

/// Stable per-device player identity.
pub type PlayerId = String;

/// Mint a fresh player identity for callers without device storage.
pub fn new_player_id() -> PlayerId {
    Uuid::new_v4().to_string()
}

/// Mint a fresh objective identifier.
pub fn new_objective_id() -> ObjectiveId {
    Uuid::new_v4().to_string()
}

// ── Enums ───────────────────────────────────────────────────────────

/// Type of a [`GameEvent`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Authority placed a new target.
    Spawn,
    /// A seat claims it hit the current target.
    HitRequest,
    /// Authority published the authoritative score pair.
    ScoreUpdate,
    /// A seat paused the match.
    Pause,
    /// A seat resumed the match.
    Resume,
    /// A seat left the match; the other seat wins.
    Abandon,
}

impl EventType {
    /// High-frequency types, each polled on its own feed.
    pub const GAMEPLAY: [EventType; 3] = [Self::Spawn, Self::HitRequest, Self::ScoreUpdate];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spawn => "SPAWN",
            Self::HitRequest => "HIT_REQUEST",
            Self::ScoreUpdate => "SCORE_UPDATE",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
            Self::Abandon => "ABANDON",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two seats in a room. `Player1` is the room creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    Player1,
    Player2,
}

impl Seat {
    /// The other seat.
    pub fn opponent(self) -> Self {
        match self {
            Self::Player1 => Self::Player2,
            Self::Player2 => Self::Player1,
        }
    }

    /// The creator seat is the only one allowed to spawn and score.
    pub fn is_authority(self) -> bool {
        self == Self::Player1
    }

    /// Wire name of the seat.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player1 => "player1",
            Self::Player2 => "player2",
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lobby status of a [`Room`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Created by the host, open for a joiner.
    #[default]
    Waiting,
    /// Both seats are filled.
    Ready,
}

// ── Structs ─────────────────────────────────────────────────────────

/// A match lobby. Created by the host, completed once by the joiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub code: String,
    pub status: RoomStatus,
    pub player1_id: PlayerId,
    pub player1_name: String,
    #[serde(default)]
    pub player2_id: PlayerId,
    #[serde(default)]
    pub player2_name: String,
}

impl Room {
    /// A freshly created room waiting for its second player.
    pub fn waiting(
        code: impl Into<String>,
        player1_id: impl Into<PlayerId>,
        player1_name: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            status: RoomStatus::Waiting,
            player1_id: player1_id.into(),
            player1_name: player1_name.into(),
            player2_id: String::new(),
            player2_name: String::new(),
        }
    }

    /// Display name of the given seat (empty while player2 has not joined).
    pub fn name_of(&self, seat: Seat) -> &str {
        match seat {
            Seat::Player1 => &self.player1_name,
            Seat::Player2 => &self.player2_name,
        }
    }
}

/// An immutable entry of a room's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    /// Store-assigned identifier.
    pub id: RecordId,
    pub room_code: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Device identity of the originator, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    /// Type-dependent payload; decode with [`GameEvent::body`].
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Creation time in milliseconds, as reported by the store.
    pub created_at: u64,
}

impl GameEvent {
    /// Decode the payload according to the record type.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::MalformedPayload`] if the payload does not match
    /// the shape required by [`event_type`](Self::event_type).
    pub fn body(&self) -> Result<EventBody> {
        Ok(match self.event_type {
            EventType::Spawn => EventBody::Spawn(self.decode()?),
            EventType::HitRequest => EventBody::HitRequest(self.decode()?),
            EventType::ScoreUpdate => EventBody::ScoreUpdate(self.decode()?),
            EventType::Pause => EventBody::Pause,
            EventType::Resume => EventBody::Resume,
            EventType::Abandon => EventBody::Abandon(self.decode()?),
        })
    }

    fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.payload).map_err(|e| DuelError::MalformedPayload {
            event_type: self.event_type,
            reason: e.to_string(),
        })
    }
}

/// Payload of a `SPAWN` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnPayload {
    pub x: f32,
    pub y: f32,
    pub objective_id: ObjectiveId,
}

/// Payload of a `HIT_REQUEST` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitRequestPayload {
    /// Seat claiming the hit.
    pub player_id: Seat,
    pub objective_id: ObjectiveId,
}

/// Payload of a `SCORE_UPDATE` record: the authoritative score pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdatePayload {
    pub p1_score: u32,
    pub p2_score: u32,
}

/// Payload of an `ABANDON` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbandonPayload {
    pub abandoning_player: Seat,
}

/// A decoded record payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    Spawn(SpawnPayload),
    HitRequest(HitRequestPayload),
    ScoreUpdate(ScoreUpdatePayload),
    Pause,
    Resume,
    Abandon(AbandonPayload),
}

impl EventBody {
    /// The record type this body is stored under.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Spawn(_) => EventType::Spawn,
            Self::HitRequest(_) => EventType::HitRequest,
            Self::ScoreUpdate(_) => EventType::ScoreUpdate,
            Self::Pause => EventType::Pause,
            Self::Resume => EventType::Resume,
            Self::Abandon(_) => EventType::Abandon,
        }
    }

    /// Encode the body as the opaque payload map stored with the record.
    ///
    /// `PAUSE` and `RESUME` carry an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::Serialization`] if encoding fails.
    pub fn to_payload(&self) -> Result<serde_json::Value> {
        let value = match self {
            Self::Spawn(p) => serde_json::to_value(p)?,
            Self::HitRequest(p) => serde_json::to_value(p)?,
            Self::ScoreUpdate(p) => serde_json::to_value(p)?,
            Self::Pause | Self::Resume => serde_json::Value::Object(serde_json::Map::new()),
            Self::Abandon(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }
}

/// Final outcome of a match, persisted once by the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub player1_name: String,
    pub player2_name: String,
    pub player1_score: u32,
    pub player2_score: u32,
    /// Blank when no winner could be named.
    #[serde(default)]
    pub winner_name: String,
}
