//! Client-local session state and its phase machine.
//!
//! [`SessionState`] is the single owned aggregate of everything one client
//! knows about a running match. It is created by the session driver, passed
//! by `&mut` into the arbiter and watchdog handlers, and never shared.
//!
//! ```text
//!              pause / PAUSE            network lost
//!   RUNNING ─────────────────▶ PAUSED_LOCAL ───────────▶ PAUSED_NETWORK
//!      ▲  ◀───────────────────      │                      │     ▲
//!      │     resume / RESUME        └──── network lost ────┼─────┘
//!      └──────────────── network restored ─────────────────┘
//!
//!   any ──(score reached, ABANDON, grace timer expired)──▶ ENDED
//! ```

use std::collections::HashSet;

use crate::cursor::EventCursors;
use crate::protocol::{ObjectiveId, ScoreUpdatePayload, Seat};

/// Phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Match in progress.
    #[default]
    Running,
    /// Paused by either seat; resumable by either seat.
    PausedLocal,
    /// This seat lost connectivity; clears by itself on reconnect.
    PausedNetwork,
    /// Terminal.
    Ended,
}

impl SessionPhase {
    /// Returns `true` for both pause phases.
    pub fn is_paused(self) -> bool {
        matches!(self, Self::PausedLocal | Self::PausedNetwork)
    }

    /// Returns `true` once the session is over.
    pub fn is_ended(self) -> bool {
        self == Self::Ended
    }
}

/// A score pair, indexed by seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scores {
    pub player1: u32,
    pub player2: u32,
}

impl Scores {
    pub fn new(player1: u32, player2: u32) -> Self {
        Self { player1, player2 }
    }

    /// Score of the given seat.
    pub fn get(&self, seat: Seat) -> u32 {
        match seat {
            Seat::Player1 => self.player1,
            Seat::Player2 => self.player2,
        }
    }

    pub(crate) fn increment(&mut self, seat: Seat) {
        match seat {
            Seat::Player1 => self.player1 += 1,
            Seat::Player2 => self.player2 += 1,
        }
    }

    /// `true` if neither seat's score would go down when moving to `next`.
    pub fn can_advance_to(&self, next: Scores) -> bool {
        next.player1 >= self.player1 && next.player2 >= self.player2
    }
}

impl From<ScoreUpdatePayload> for Scores {
    fn from(p: ScoreUpdatePayload) -> Self {
        Self::new(p.p1_score, p.p2_score)
    }
}

impl From<Scores> for ScoreUpdatePayload {
    fn from(s: Scores) -> Self {
        Self {
            p1_score: s.player1,
            p2_score: s.player2,
        }
    }
}

/// The target currently on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub objective_id: ObjectiveId,
    pub x: f32,
    pub y: f32,
}

impl Target {
    /// Whether `(x, y)` lies within `radius` of the target centre.
    pub fn contains(&self, x: f32, y: f32, radius: f32) -> bool {
        let dx = x - self.x;
        let dy = y - self.y;
        dx * dx + dy * dy <= radius * radius
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The seat reached the winning score.
    ScoreReached(Seat),
    /// The seat abandoned the match.
    Abandoned(Seat),
    /// The seat stayed disconnected past the grace period.
    Disconnected(Seat),
}

impl EndReason {
    /// The seat credited with the win.
    pub fn winner(self) -> Seat {
        match self {
            Self::ScoreReached(seat) => seat,
            Self::Abandoned(seat) | Self::Disconnected(seat) => seat.opponent(),
        }
    }
}

/// Result of asking a paused session to resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    /// The pause is network-induced; only a reconnect clears it.
    RejectedNetworkPause,
    /// Nothing to resume.
    NotPaused,
}

/// Read-only view of a session published to the client handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub scores: Scores,
    pub objective: Option<Target>,
    pub player2_name: String,
}

/// Everything one client knows about its match.
#[derive(Debug)]
pub struct SessionState {
    pub(crate) room_code: String,
    pub(crate) seat: Seat,
    pub(crate) is_authority: bool,
    pub(crate) player1_name: String,
    pub(crate) player2_name: String,
    pub(crate) scores: Scores,
    pub(crate) current_objective: Option<Target>,
    /// Authority only: objectives that already awarded their point.
    pub(crate) scored_objective_ids: HashSet<ObjectiveId>,
    pub(crate) cursors: EventCursors,
    pub(crate) phase: SessionPhase,
    /// A local pause was in effect (or arrived) while network-paused.
    pub(crate) local_pause_under_network: bool,
    pub(crate) is_local_hit_sent: bool,
    pub(crate) end_reason: Option<EndReason>,
}

impl SessionState {
    /// Fresh running session. Authority is derived from the seat.
    pub fn new(
        room_code: impl Into<String>,
        seat: Seat,
        player1_name: impl Into<String>,
        player2_name: impl Into<String>,
    ) -> Self {
        Self {
            room_code: room_code.into(),
            seat,
            is_authority: seat.is_authority(),
            player1_name: player1_name.into(),
            player2_name: player2_name.into(),
            scores: Scores::default(),
            current_objective: None,
            scored_objective_ids: HashSet::new(),
            cursors: EventCursors::new(),
            phase: SessionPhase::Running,
            local_pause_under_network: false,
            is_local_hit_sent: false,
            end_reason: None,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn seat(&self) -> Seat {
        self.seat
    }

    pub fn is_authority(&self) -> bool {
        self.is_authority
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn scores(&self) -> Scores {
        self.scores
    }

    pub fn current_objective(&self) -> Option<&Target> {
        self.current_objective.as_ref()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    /// Display name of a seat.
    pub fn name_of(&self, seat: Seat) -> &str {
        match seat {
            Seat::Player1 => &self.player1_name,
            Seat::Player2 => &self.player2_name,
        }
    }

    /// `false` once the session has ended.
    pub fn is_game_running(&self) -> bool {
        !self.phase.is_ended()
    }

    pub fn is_game_paused(&self) -> bool {
        self.phase.is_paused()
    }

    pub fn was_paused_by_network(&self) -> bool {
        self.phase == SessionPhase::PausedNetwork
    }

    pub fn is_local_hit_sent(&self) -> bool {
        self.is_local_hit_sent
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            scores: self.scores,
            objective: self.current_objective.clone(),
            player2_name: self.player2_name.clone(),
        }
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// Apply a pause, from a local action or a remote `PAUSE` record.
    ///
    /// Returns `true` if the phase changed. A pause arriving while
    /// network-paused is remembered so that the reconnect lands in
    /// [`SessionPhase::PausedLocal`] instead of running.
    pub fn pause(&mut self) -> bool {
        match self.phase {
            SessionPhase::Running => {
                self.phase = SessionPhase::PausedLocal;
                true
            }
            SessionPhase::PausedNetwork => {
                self.local_pause_under_network = true;
                false
            }
            SessionPhase::PausedLocal | SessionPhase::Ended => false,
        }
    }

    /// Apply a resume, from a local action or a remote `RESUME` record.
    pub fn resume(&mut self) -> ResumeOutcome {
        match self.phase {
            SessionPhase::PausedLocal => {
                self.phase = SessionPhase::Running;
                ResumeOutcome::Resumed
            }
            SessionPhase::PausedNetwork => {
                // The other seat resumed while we were away; once we are back
                // there is no local pause left to return to.
                self.local_pause_under_network = false;
                ResumeOutcome::RejectedNetworkPause
            }
            SessionPhase::Running | SessionPhase::Ended => ResumeOutcome::NotPaused,
        }
    }

    /// Connectivity was lost. Returns `true` if the session entered
    /// [`SessionPhase::PausedNetwork`].
    ///
    /// Only a running session is network-paused. A manually paused one stays
    /// in [`SessionPhase::PausedLocal`].
    pub fn network_lost(&mut self) -> bool {
        if self.phase != SessionPhase::Running {
            return false;
        }
        self.local_pause_under_network = false;
        self.phase = SessionPhase::PausedNetwork;
        true
    }

    /// Connectivity came back. Returns the new phase if the network pause
    /// was cleared.
    pub fn network_restored(&mut self) -> Option<SessionPhase> {
        if self.phase != SessionPhase::PausedNetwork {
            return None;
        }
        self.phase = if self.local_pause_under_network {
            SessionPhase::PausedLocal
        } else {
            SessionPhase::Running
        };
        self.local_pause_under_network = false;
        Some(self.phase)
    }

    /// Enter the terminal phase. Returns `false` if already ended.
    pub fn end(&mut self, reason: EndReason) -> bool {
        if self.phase.is_ended() {
            return false;
        }
        self.phase = SessionPhase::Ended;
        self.end_reason = Some(reason);
        self.current_objective = None;
        self.local_pause_under_network = false;
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn session() -> SessionState {
        SessionState::new("AB12", Seat::Player2, "Ana", "Bo")
    }

    #[test]
    fn new_session_is_running_without_authority_for_player2() {
        let s = session();
        assert_eq!(s.phase(), SessionPhase::Running);
        assert!(!s.is_authority());
        assert!(s.is_game_running());
        assert!(!s.is_game_paused());
        assert!(SessionState::new("AB12", Seat::Player1, "Ana", "").is_authority());
    }

    #[test]
    fn pause_and_resume_round_trip() {
        let mut s = session();
        assert!(s.pause());
        assert!(!s.pause(), "second pause is a no-op");
        assert_eq!(s.phase(), SessionPhase::PausedLocal);
        assert_eq!(s.resume(), ResumeOutcome::Resumed);
        assert_eq!(s.resume(), ResumeOutcome::NotPaused);
    }

    #[test]
    fn resume_is_rejected_while_network_paused() {
        let mut s = session();
        assert!(s.network_lost());
        assert!(s.was_paused_by_network());
        assert_eq!(s.resume(), ResumeOutcome::RejectedNetworkPause);
        assert_eq!(s.phase(), SessionPhase::PausedNetwork);
    }

    #[test]
    fn network_pause_clears_on_reconnect() {
        let mut s = session();
        s.network_lost();
        assert_eq!(s.network_restored(), Some(SessionPhase::Running));
        assert_eq!(s.network_restored(), None);
    }

    #[test]
    fn network_loss_during_local_pause_keeps_the_local_pause() {
        let mut s = session();
        s.pause();
        assert!(!s.network_lost());
        assert_eq!(s.phase(), SessionPhase::PausedLocal);
        assert_eq!(s.network_restored(), None);
        assert_eq!(s.phase(), SessionPhase::PausedLocal);
    }

    #[test]
    fn remote_pause_during_outage_survives_reconnect() {
        let mut s = session();
        s.network_lost();
        assert!(!s.pause());
        assert_eq!(s.network_restored(), Some(SessionPhase::PausedLocal));
    }

    #[test]
    fn remote_resume_during_outage_drops_underlying_pause() {
        let mut s = session();
        s.network_lost();
        s.pause();
        assert_eq!(s.resume(), ResumeOutcome::RejectedNetworkPause);
        assert_eq!(s.network_restored(), Some(SessionPhase::Running));
    }

    #[test]
    fn end_happens_at_most_once() {
        let mut s = session();
        assert!(s.end(EndReason::Abandoned(Seat::Player1)));
        assert!(!s.end(EndReason::ScoreReached(Seat::Player2)));
        assert_eq!(s.end_reason(), Some(EndReason::Abandoned(Seat::Player1)));
    }

    #[test]
    fn ended_session_ignores_every_transition() {
        let mut s = session();
        s.end(EndReason::ScoreReached(Seat::Player1));
        assert!(!s.pause());
        assert_eq!(s.resume(), ResumeOutcome::NotPaused);
        assert!(!s.network_lost());
        assert_eq!(s.network_restored(), None);
        assert_eq!(s.phase(), SessionPhase::Ended);
    }

    #[test]
    fn winner_per_end_reason() {
        assert_eq!(EndReason::ScoreReached(Seat::Player2).winner(), Seat::Player2);
        assert_eq!(EndReason::Abandoned(Seat::Player1).winner(), Seat::Player2);
        assert_eq!(EndReason::Disconnected(Seat::Player2).winner(), Seat::Player1);
    }

    #[test]
    fn target_hit_test_uses_radius() {
        let t = Target {
            objective_id: "o1".into(),
            x: 100.0,
            y: 200.0,
        };
        assert!(t.contains(130.0, 240.0, 60.0));
        assert!(!t.contains(200.0, 200.0, 60.0));
    }

    #[test]
    fn scores_never_regress() {
        let current = Scores::new(3, 2);
        assert!(current.can_advance_to(Scores::new(3, 3)));
        assert!(!current.can_advance_to(Scores::new(2, 5)));
    }
}
