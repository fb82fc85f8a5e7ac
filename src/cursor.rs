//! Per-feed "last seen record" tracking.
//!
//! Each poll fetches only the single newest record of a feed, so a cursor can
//! only tell whether *that* record is new. Two records of the same type
//! created within one polling interval means the earlier one is never seen:
//! the protocol trades completeness for bounded freshness, and every handler
//! downstream (dedup sets, overwrite-only score application) is written to
//! tolerate it.

use std::fmt;

use crate::protocol::{EventType, GameEvent, RecordId};

/// A polled stream of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    /// Newest `SPAWN` record.
    Spawn,
    /// Newest `HIT_REQUEST` record.
    HitRequest,
    /// Newest `SCORE_UPDATE` record.
    ScoreUpdate,
    /// Newest record that is not a gameplay type (`PAUSE`, `RESUME`, `ABANDON`).
    GameState,
}

impl Feed {
    /// All feeds.
    pub const ALL: [Feed; 4] = [
        Self::Spawn,
        Self::HitRequest,
        Self::ScoreUpdate,
        Self::GameState,
    ];

    /// The single record type this feed polls, or `None` for the game-state
    /// feed which polls everything except [`EventType::GAMEPLAY`].
    pub fn event_type(self) -> Option<EventType> {
        match self {
            Self::Spawn => Some(EventType::Spawn),
            Self::HitRequest => Some(EventType::HitRequest),
            Self::ScoreUpdate => Some(EventType::ScoreUpdate),
            Self::GameState => None,
        }
    }

    /// Whether polling this feed is suspended while the session is paused.
    pub fn pauses_with_session(self) -> bool {
        matches!(self, Self::Spawn | Self::HitRequest)
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Spawn => "spawn",
            Self::HitRequest => "hit_request",
            Self::ScoreUpdate => "score_update",
            Self::GameState => "game_state",
        })
    }
}

/// The cursors of all four feeds.
#[derive(Debug, Clone, Default)]
pub struct EventCursors {
    spawn: Option<RecordId>,
    hit_request: Option<RecordId>,
    score_update: Option<RecordId>,
    game_state: Option<RecordId>,
}

impl EventCursors {
    /// Create cursors that have seen nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the newest record returned by a poll through the cursor.
    ///
    /// Returns `true` exactly once per distinct record identifier, advancing
    /// the cursor. Returns `false` when there is no record or the record is
    /// the one already seen.
    pub fn observe(&mut self, feed: Feed, latest: Option<&GameEvent>) -> bool {
        let Some(record) = latest else {
            return false;
        };
        let slot = self.slot_mut(feed);
        if slot.as_deref() == Some(record.id.as_str()) {
            return false;
        }
        *slot = Some(record.id.clone());
        true
    }

    /// Identifier of the last record observed on a feed.
    pub fn last_seen(&self, feed: Feed) -> Option<&str> {
        match feed {
            Feed::Spawn => self.spawn.as_deref(),
            Feed::HitRequest => self.hit_request.as_deref(),
            Feed::ScoreUpdate => self.score_update.as_deref(),
            Feed::GameState => self.game_state.as_deref(),
        }
    }

    fn slot_mut(&mut self, feed: Feed) -> &mut Option<RecordId> {
        match feed {
            Feed::Spawn => &mut self.spawn,
            Feed::HitRequest => &mut self.hit_request,
            Feed::ScoreUpdate => &mut self.score_update,
            Feed::GameState => &mut self.game_state,
        }
    }
}
