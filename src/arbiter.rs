//! Target placement, hit arbitration and score keeping.
//!
//! Only the authority seat originates `SPAWN` and `SCORE_UPDATE` records;
//! [`spawn_target`] and [`arbitrate_hit`] check the capability explicitly and
//! refuse with [`DuelError::NotAuthority`] otherwise. Both seats apply score
//! updates the same way: overwrite, never increment.
//!
//! Arbitration is "first request seen wins". The authority only ever sees the
//! newest `HIT_REQUEST` per poll, so when both seats claim the same objective
//! within one polling interval the point goes to whichever request is newest
//! at poll time, not to the earlier tap.

use rand::Rng;
use tracing::debug;

use crate::error::{DuelError, Result};
use crate::protocol::{
    new_objective_id, EventType, HitRequestPayload, ScoreUpdatePayload, Seat, SpawnPayload,
};
use crate::session::{Scores, SessionState, Target};

/// Fraction of each canvas dimension kept clear of targets on either side.
const SPAWN_MARGIN: f32 = 0.2;

/// Size of the play surface, in the same units as target coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CanvasSize {
    pub width: f32,
    pub height: f32,
}

impl CanvasSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// A canvas that has not been laid out yet.
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// What applying a `SCORE_UPDATE` did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreApplication {
    /// Session ended, or the pair would lower a score (stale record).
    Ignored,
    Applied {
        scores: Scores,
        /// Target removed from the board, for the explosion effect.
        cleared: Option<Target>,
        outcome: ScoreOutcome,
    },
}

/// Match state after a score was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutcome {
    /// Keep playing; `match_point` names a seat one point from winning
    /// while the other is not.
    Continue { match_point: Option<Seat> },
    /// The seat reached the winning score.
    Won(Seat),
}

fn coordinate_in_band<R: Rng + ?Sized>(extent: f32, rng: &mut R) -> f32 {
    let lo = extent * SPAWN_MARGIN;
    let hi = extent * (1.0 - SPAWN_MARGIN);
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

/// Place a new target. Authority only.
///
/// Returns `Ok(None)` when no spawn may happen right now: the session is
/// ended or paused, or the canvas has no size yet.
///
/// # Errors
///
/// Returns [`DuelError::NotAuthority`] when called on the non-authority seat.
pub fn spawn_target<R: Rng + ?Sized>(
    session: &mut SessionState,
    canvas: CanvasSize,
    rng: &mut R,
) -> Result<Option<SpawnPayload>> {
    if !session.is_authority {
        return Err(DuelError::NotAuthority(EventType::Spawn));
    }
    if !session.is_game_running() || session.is_game_paused() || canvas.is_empty() {
        return Ok(None);
    }

    let x = coordinate_in_band(canvas.width, rng);
    let y = coordinate_in_band(canvas.height, rng);
    let objective_id = new_objective_id();

    session.current_objective = Some(Target {
        objective_id: objective_id.clone(),
        x,
        y,
    });
    session.is_local_hit_sent = false;

    Ok(Some(SpawnPayload { x, y, objective_id }))
}

/// Show a target announced by a `SPAWN` record. Returns `false` once ended.
pub fn apply_spawn(session: &mut SessionState, spawn: &SpawnPayload) -> bool {
    if !session.is_game_running() {
        return false;
    }
    session.current_objective = Some(Target {
        objective_id: spawn.objective_id.clone(),
        x: spawn.x,
        y: spawn.y,
    });
    session.is_local_hit_sent = false;
    true
}

/// Claim the current target for the local seat.
///
/// At most one claim is produced per objective; further calls return `None`
/// until the next spawn. Paused or ended sessions never claim.
pub fn claim_hit(session: &mut SessionState) -> Option<HitRequestPayload> {
    if session.is_local_hit_sent || !session.is_game_running() || session.is_game_paused() {
        return None;
    }
    let objective_id = session.current_objective.as_ref()?.objective_id.clone();
    session.is_local_hit_sent = true;
    Some(HitRequestPayload {
        player_id: session.seat,
        objective_id,
    })
}

/// Resolve a `HIT_REQUEST`. Authority only.
///
/// The first request seen for an objective awards the point and yields the
/// new authoritative score pair to publish. Later requests for the same
/// objective yield `None`.
///
/// # Errors
///
/// Returns [`DuelError::NotAuthority`] when called on the non-authority seat.
pub fn arbitrate_hit(
    session: &mut SessionState,
    hit: &HitRequestPayload,
) -> Result<Option<ScoreUpdatePayload>> {
    if !session.is_authority {
        return Err(DuelError::NotAuthority(EventType::ScoreUpdate));
    }
    if !session.is_game_running() {
        return Ok(None);
    }
    if !session.scored_objective_ids.insert(hit.objective_id.clone()) {
        debug!(objective = %hit.objective_id, seat = %hit.player_id, "objective already scored");
        return Ok(None);
    }
    session.scores.increment(hit.player_id);
    Ok(Some(session.scores.into()))
}

/// Apply an authoritative score pair on either seat.
pub fn apply_score_update(
    session: &mut SessionState,
    update: ScoreUpdatePayload,
    winning_score: u32,
) -> ScoreApplication {
    if !session.is_game_running() {
        return ScoreApplication::Ignored;
    }
    let next = Scores::from(update);
    if !session.scores.can_advance_to(next) {
        debug!(?next, current = ?session.scores, "stale score update");
        return ScoreApplication::Ignored;
    }

    session.scores = next;
    let cleared = session.current_objective.take();

    let outcome = if next.player1 >= winning_score {
        ScoreOutcome::Won(Seat::Player1)
    } else if next.player2 >= winning_score {
        ScoreOutcome::Won(Seat::Player2)
    } else {
        let threshold = winning_score.saturating_sub(1);
        let match_point = if next.player1 == threshold && next.player2 < threshold {
            Some(Seat::Player1)
        } else if next.player2 == threshold && next.player1 < threshold {
            Some(Seat::Player2)
        } else {
            None
        };
        ScoreOutcome::Continue { match_point }
    };

    ScoreApplication::Applied {
        scores: next,
        cleared,
        outcome,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::session::{EndReason, SessionPhase};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn authority() -> SessionState {
        SessionState::new("AB12", Seat::Player1, "Ana", "Bo")
    }

    fn peer() -> SessionState {
        SessionState::new("AB12", Seat::Player2, "Ana", "Bo")
    }

    fn hit(seat: Seat, objective: &str) -> HitRequestPayload {
        HitRequestPayload {
            player_id: seat,
            objective_id: objective.into(),
        }
    }

    #[test]
    fn spawn_stays_inside_central_band() {
        let mut s = authority();
        let mut rng = StdRng::seed_from_u64(7);
        let canvas = CanvasSize::new(1000.0, 500.0);
        for _ in 0..200 {
            let spawn = spawn_target(&mut s, canvas, &mut rng).unwrap().unwrap();
            assert!((200.0..800.0).contains(&spawn.x), "x = {}", spawn.x);
            assert!((100.0..400.0).contains(&spawn.y), "y = {}", spawn.y);
        }
    }

    #[test]
    fn spawn_assigns_fresh_objective_and_resets_hit_flag() {
        let mut s = authority();
        let mut rng = StdRng::seed_from_u64(1);
        let canvas = CanvasSize::new(400.0, 400.0);

        let first = spawn_target(&mut s, canvas, &mut rng).unwrap().unwrap();
        assert!(claim_hit(&mut s).is_some());
        assert!(s.is_local_hit_sent());

        let second = spawn_target(&mut s, canvas, &mut rng).unwrap().unwrap();
        assert_ne!(first.objective_id, second.objective_id);
        assert!(!s.is_local_hit_sent());
        assert_eq!(
            s.current_objective().map(|t| t.objective_id.as_str()),
            Some(second.objective_id.as_str())
        );
    }

    #[test]
    fn spawn_requires_authority() {
        let mut s = peer();
        let mut rng = StdRng::seed_from_u64(1);
        let err = spawn_target(&mut s, CanvasSize::new(10.0, 10.0), &mut rng).unwrap_err();
        assert!(matches!(err, DuelError::NotAuthority(EventType::Spawn)));
    }

    #[test]
    fn spawn_waits_for_layout_and_resume() {
        let mut s = authority();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(spawn_target(&mut s, CanvasSize::default(), &mut rng)
            .unwrap()
            .is_none());

        s.pause();
        assert!(spawn_target(&mut s, CanvasSize::new(10.0, 10.0), &mut rng)
            .unwrap()
            .is_none());
    }

    #[test]
    fn hit_claims_once_per_objective() {
        let mut s = peer();
        assert!(claim_hit(&mut s).is_none(), "no target yet");

        apply_spawn(
            &mut s,
            &SpawnPayload {
                x: 100.0,
                y: 200.0,
                objective_id: "o1".into(),
            },
        );
        assert_eq!(claim_hit(&mut s), Some(hit(Seat::Player2, "o1")));
        assert_eq!(claim_hit(&mut s), None);
    }

    #[test]
    fn paused_session_does_not_claim() {
        let mut s = peer();
        apply_spawn(
            &mut s,
            &SpawnPayload {
                x: 1.0,
                y: 1.0,
                objective_id: "o1".into(),
            },
        );
        s.pause();
        assert!(claim_hit(&mut s).is_none());
        assert!(!s.is_local_hit_sent());
    }

    #[test]
    fn at_most_one_increment_per_objective() {
        let mut s = authority();
        let first = arbitrate_hit(&mut s, &hit(Seat::Player2, "o1")).unwrap();
        assert_eq!(
            first,
            Some(ScoreUpdatePayload {
                p1_score: 0,
                p2_score: 1
            })
        );
        for seat in [Seat::Player1, Seat::Player2, Seat::Player1] {
            assert_eq!(arbitrate_hit(&mut s, &hit(seat, "o1")).unwrap(), None);
        }
        assert_eq!(s.scores(), Scores::new(0, 1));
    }

    #[test]
    fn arbitration_requires_authority() {
        let mut s = peer();
        let err = arbitrate_hit(&mut s, &hit(Seat::Player2, "o1")).unwrap_err();
        assert!(matches!(err, DuelError::NotAuthority(EventType::ScoreUpdate)));
    }

    #[test]
    fn score_application_overwrites_and_clears_target() {
        let mut s = peer();
        apply_spawn(
            &mut s,
            &SpawnPayload {
                x: 100.0,
                y: 200.0,
                objective_id: "o1".into(),
            },
        );
        let applied = apply_score_update(
            &mut s,
            ScoreUpdatePayload {
                p1_score: 0,
                p2_score: 1,
            },
            10,
        );
        let ScoreApplication::Applied {
            scores, cleared, outcome,
        } = applied
        else {
            panic!("expected applied");
        };
        assert_eq!(scores, Scores::new(0, 1));
        assert_eq!(cleared.map(|t| (t.x, t.y)), Some((100.0, 200.0)));
        assert_eq!(outcome, ScoreOutcome::Continue { match_point: None });
        assert!(s.current_objective().is_none());
    }

    #[test]
    fn stale_score_is_ignored() {
        let mut s = peer();
        apply_score_update(
            &mut s,
            ScoreUpdatePayload {
                p1_score: 4,
                p2_score: 4,
            },
            10,
        );
        let again = apply_score_update(
            &mut s,
            ScoreUpdatePayload {
                p1_score: 3,
                p2_score: 5,
            },
            10,
        );
        assert_eq!(again, ScoreApplication::Ignored);
        assert_eq!(s.scores(), Scores::new(4, 4));
    }

    #[test]
    fn reaching_ten_wins_regardless_of_margin() {
        let mut s = peer();
        let applied = apply_score_update(
            &mut s,
            ScoreUpdatePayload {
                p1_score: 10,
                p2_score: 9,
            },
            10,
        );
        assert!(matches!(
            applied,
            ScoreApplication::Applied {
                outcome: ScoreOutcome::Won(Seat::Player1),
                ..
            }
        ));
    }

    #[test]
    fn match_point_only_when_opponent_is_behind() {
        let mut s = peer();
        let applied = apply_score_update(
            &mut s,
            ScoreUpdatePayload {
                p1_score: 2,
                p2_score: 9,
            },
            10,
        );
        assert!(matches!(
            applied,
            ScoreApplication::Applied {
                outcome: ScoreOutcome::Continue {
                    match_point: Some(Seat::Player2)
                },
                ..
            }
        ));

        let applied = apply_score_update(
            &mut s,
            ScoreUpdatePayload {
                p1_score: 9,
                p2_score: 9,
            },
            10,
        );
        assert!(matches!(
            applied,
            ScoreApplication::Applied {
                outcome: ScoreOutcome::Continue { match_point: None },
                ..
            }
        ));
    }

    #[test]
    fn ended_session_ignores_gameplay() {
        let mut s = authority();
        s.end(EndReason::Abandoned(Seat::Player2));
        assert_eq!(s.phase(), SessionPhase::Ended);
        assert_eq!(arbitrate_hit(&mut s, &hit(Seat::Player1, "o9")).unwrap(), None);
        assert_eq!(
            apply_score_update(
                &mut s,
                ScoreUpdatePayload {
                    p1_score: 1,
                    p2_score: 0
                },
                10
            ),
            ScoreApplication::Ignored
        );
        assert!(!apply_spawn(
            &mut s,
            &SpawnPayload {
                x: 0.0,
                y: 0.0,
                objective_id: "o9".into()
            }
        ));
    }
}
