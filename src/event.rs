//! Events emitted by a running session.
//!
//! The embedding application (renderer, HUD, sound) consumes these from the
//! receiver returned by [`DuelClient::start`](crate::DuelClient::start). The
//! core never draws anything: it announces where the target is, when it is
//! cleared, and how the match is going.

use crate::protocol::{EventType, ObjectiveId, Seat};
use crate::session::{EndReason, Scores};

/// Who initiated a pause or resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// This client.
    Local,
    /// The other seat, seen through the event log.
    Remote,
}

/// A session event delivered to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum DuelEvent {
    /// The authority saw the second player join the room.
    PeerJoined { player2_name: String },

    /// A new target is on the board.
    TargetSpawned {
        objective_id: ObjectiveId,
        x: f32,
        y: f32,
    },

    /// The target was taken off the board after a point; play the
    /// explosion at its last position.
    TargetCleared {
        objective_id: ObjectiveId,
        x: f32,
        y: f32,
    },

    /// The local seat claimed the current target.
    HitClaimed { objective_id: ObjectiveId },

    /// The authoritative score pair changed.
    ScoreChanged { scores: Scores },

    /// A seat is one point from winning and the other is not.
    MatchPoint { seat: Seat, name: String },

    /// The match was paused.
    Paused { origin: Origin },

    /// The match was resumed after a manual pause.
    Resumed { origin: Origin },

    /// This client lost connectivity; the match is paused until it returns
    /// or the grace period runs out.
    ConnectionLost,

    /// Connectivity is back; `resumed` is `false` if a manual pause is still
    /// in effect.
    ConnectionRestored { resumed: bool },

    /// Writing a record to the store failed. Not retried.
    WriteFailed {
        /// `None` for the match result.
        event_type: Option<EventType>,
        reason: String,
    },

    /// The match is over. Emitted exactly once.
    MatchEnded {
        reason: EndReason,
        winner: Seat,
        winner_name: String,
        scores: Scores,
    },

    /// The session was shut down before the match ended.
    Stopped,
}
