//! Connectivity watchdog and its single-shot grace timer.
//!
//! Losing connectivity network-pauses a running session and arms the grace
//! timer. A manually paused session is left alone until it resumes.
//! Reconnecting before the deadline cancels it and lifts the pause; reaching
//! the deadline while still offline ends the session as a disconnect.
//!
//! Cancel and expire race each other. [`GraceTimer`] makes them mutually
//! exclusive: each arm hands out a [`TimerToken`], and only the first of
//! `cancel()` / `expire(token)` to run on an armed timer succeeds.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::session::{EndReason, SessionPhase, SessionState};

/// Identifies one arming of a [`GraceTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Idle,
    Armed { deadline: Instant, token: TimerToken },
}

/// A single-shot timer whose cancel and expiry are mutually exclusive.
#[derive(Debug)]
pub struct GraceTimer {
    period: Duration,
    state: TimerState,
    generation: u64,
}

impl GraceTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            state: TimerState::Idle,
            generation: 0,
        }
    }

    /// Arm the timer to fire `period` after `now`.
    ///
    /// Arming an armed timer keeps the original deadline and token.
    pub fn arm(&mut self, now: Instant) -> TimerToken {
        if let TimerState::Armed { token, .. } = self.state {
            return token;
        }
        self.generation += 1;
        let token = TimerToken(self.generation);
        self.state = TimerState::Armed {
            deadline: now + self.period,
            token,
        };
        token
    }

    /// Disarm. Returns `true` if this call won against expiry.
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.is_armed();
        self.state = TimerState::Idle;
        was_armed
    }

    /// Consume the expiry of arming `token`. Returns `true` if this call won
    /// against cancellation (and against stale expiries of earlier armings).
    pub fn expire(&mut self, token: TimerToken) -> bool {
        match self.state {
            TimerState::Armed { token: armed, .. } if armed == token => {
                self.state = TimerState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, TimerState::Armed { .. })
    }

    /// Deadline and token of the current arming.
    pub fn deadline(&self) -> Option<(Instant, TimerToken)> {
        match self.state {
            TimerState::Armed { deadline, token } => Some((deadline, token)),
            TimerState::Idle => None,
        }
    }
}

/// Tracks reachability and drives the network-pause transitions.
#[derive(Debug)]
pub struct ConnectivityWatchdog {
    timer: GraceTimer,
    reachable: bool,
}

impl ConnectivityWatchdog {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            timer: GraceTimer::new(grace_period),
            reachable: true,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    pub fn timer(&self) -> &GraceTimer {
        &self.timer
    }

    /// Connectivity was lost. Returns `true` if the session was network-paused
    /// and the grace timer armed.
    pub fn connectivity_lost(&mut self, session: &mut SessionState, now: Instant) -> bool {
        self.reachable = false;
        if !session.network_lost() {
            return false;
        }
        self.timer.arm(now);
        info!(seat = %session.seat(), "connectivity lost, grace timer armed");
        true
    }

    /// Connectivity came back. Returns the phase the session returned to, if
    /// it was network-paused.
    pub fn connectivity_restored(&mut self, session: &mut SessionState) -> Option<SessionPhase> {
        self.reachable = true;
        if self.timer.cancel() {
            debug!("grace timer cancelled");
        }
        let restored = session.network_restored();
        if let Some(phase) = restored {
            info!(seat = %session.seat(), ?phase, "connectivity restored");
        }
        restored
    }

    /// The grace timer fired. Returns the end reason if this expiry ended
    /// the session; `None` if it lost the race against a reconnect.
    pub fn grace_expired(
        &mut self,
        session: &mut SessionState,
        token: TimerToken,
    ) -> Option<EndReason> {
        if !self.timer.expire(token) || self.reachable {
            return None;
        }
        let reason = EndReason::Disconnected(session.seat());
        if !session.end(reason) {
            return None;
        }
        warn!(seat = %session.seat(), "still disconnected after grace period, abandoning");
        Some(reason)
    }

    /// Disarm without touching the session (used on teardown).
    pub fn disarm(&mut self) {
        self.timer.cancel();
    }
}
