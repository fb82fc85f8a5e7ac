//! # Custom Store Example
//!
//! Shows how to implement the [`EventStore`] trait for your own backend. The
//! store here wraps a [`MemoryStore`] and adds round-trip latency plus an
//! occasional failed query, which is roughly what a hosted document
//! database looks like from a phone.
//!
//! Useful for:
//!
//! - **Testing**: see how the protocol copes with slow and lossy storage
//! - **Custom backends**: the same shape works for REST, gRPC or SQL stores
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_store
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use duel_sync::protocol::{EventType, GameEvent, MatchResult, RecordId, Room};
use duel_sync::{
    lobby, CanvasSize, DuelClient, DuelConfig, DuelError, DuelEvent, EventStore, MemoryStore,
    SessionParams,
};
use rand::Rng;

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define a store with latency and failures
// ─────────────────────────────────────────────────────────────────────

/// A store that delays every request and fails a fraction of the reads.
struct LaggyStore {
    inner: MemoryStore,
    latency: Duration,
    failure_rate: f64,
}

impl LaggyStore {
    fn new(latency: Duration, failure_rate: f64) -> Self {
        Self {
            inner: MemoryStore::new(),
            latency,
            failure_rate,
        }
    }

    /// Simulate one round trip. Only reads may fail: a lost HIT_REQUEST
    /// would leave that target unclaimable for the rest of the point.
    async fn round_trip(&self, may_fail: bool) -> Result<(), DuelError> {
        let jitter = rand::thread_rng().gen_range(0..=self.latency.as_millis() as u64);
        tokio::time::sleep(self.latency + Duration::from_millis(jitter)).await;
        if may_fail && rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(DuelError::StoreUnreachable("request timed out".into()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement the EventStore trait
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl EventStore for LaggyStore {
    async fn append(
        &self,
        room_code: &str,
        event_type: EventType,
        player_id: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<RecordId, DuelError> {
        self.round_trip(false).await?;
        self.inner
            .append(room_code, event_type, player_id, payload)
            .await
    }

    async fn query_latest(
        &self,
        room_code: &str,
        event_type: EventType,
    ) -> Result<Option<GameEvent>, DuelError> {
        self.round_trip(true).await?;
        self.inner.query_latest(room_code, event_type).await
    }

    async fn query_latest_excluding(
        &self,
        room_code: &str,
        excluded: &[EventType],
    ) -> Result<Option<GameEvent>, DuelError> {
        self.round_trip(true).await?;
        self.inner.query_latest_excluding(room_code, excluded).await
    }

    // Lobby operations skip the simulated failures so the demo always starts.
    async fn create_room(&self, room: Room) -> Result<(), DuelError> {
        self.inner.create_room(room).await
    }

    async fn find_room(&self, code: &str) -> Result<Option<Room>, DuelError> {
        self.inner.find_room(code).await
    }

    async fn update_room(&self, room: Room) -> Result<(), DuelError> {
        self.inner.update_room(room).await
    }

    async fn save_match_result(&self, result: MatchResult) -> Result<(), DuelError> {
        self.inner.save_match_result(result).await
    }

    async fn list_match_results(&self) -> Result<Vec<MatchResult>, DuelError> {
        self.inner.list_match_results().await
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Play a match on it
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(LaggyStore::new(Duration::from_millis(40), 0.05));
    let room = lobby::create_room(store.as_ref(), "device-ana", "Ana", &mut rand::thread_rng())
        .await?;
    let room = lobby::join_room(store.as_ref(), &room.code, "device-bo", "Bo").await?;

    let canvas = CanvasSize::new(720.0, 1280.0);
    let config = DuelConfig::default().with_winning_score(3);
    let (mut host, mut host_events) =
        DuelClient::start(store.clone(), config.clone(), SessionParams::host(&room, canvas));
    let (mut guest, mut guest_events) =
        DuelClient::start(store.clone(), config, SessionParams::guest(&room, canvas));

    // Only the guest plays; the host just watches the score. Wait for both
    // seats to see the end, since shutting down a live session forfeits it.
    let (mut host_done, mut guest_done) = (false, false);
    while !(host_done && guest_done) {
        tokio::select! {
            Some(event) = guest_events.recv(), if !guest_done => match event {
                DuelEvent::TargetSpawned { .. } => guest.claim_hit()?,
                DuelEvent::MatchEnded { .. } => guest_done = true,
                _ => {}
            },
            Some(event) = host_events.recv(), if !host_done => match event {
                DuelEvent::ScoreChanged { scores } => {
                    tracing::info!("Score {} - {}", scores.player1, scores.player2);
                }
                DuelEvent::WriteFailed { event_type, reason } => {
                    tracing::warn!("Lost write of {event_type:?}: {reason}");
                }
                DuelEvent::MatchEnded { winner_name, .. } => {
                    tracing::info!("{winner_name} wins");
                    host_done = true;
                }
                _ => {}
            },
            else => break,
        }
    }

    host.shutdown().await;
    guest.shutdown().await;
    Ok(())
}
