#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for duel-sync integration tests.
//!
//! Provides a [`GatedStore`] that gives each client its own view of a shared
//! [`MemoryStore`] with an independent online switch, plus helpers for
//! starting a host/guest pair and waiting on events or state.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use duel_sync::protocol::{EventType, GameEvent, MatchResult, RecordId, Room};
use duel_sync::session::Target;
use duel_sync::{
    lobby, CanvasSize, DuelClient, DuelConfig, DuelError, DuelEvent, EventStore, MemoryStore,
    SessionParams,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

pub const CANVAS: CanvasSize = CanvasSize {
    width: 1080.0,
    height: 1920.0,
};

/// Upper bound for any wait in a test. Time is paused, so this is virtual.
pub const WAIT_LIMIT: Duration = Duration::from_secs(120);

// ── GatedStore ──────────────────────────────────────────────────────

/// One device's view of a shared [`MemoryStore`].
///
/// While offline every operation fails with [`DuelError::StoreUnreachable`],
/// without affecting the other device's view.
#[derive(Clone)]
pub struct GatedStore {
    inner: Arc<MemoryStore>,
    online: Arc<AtomicBool>,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), DuelError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DuelError::StoreUnreachable("device offline".into()))
        }
    }
}

#[async_trait]
impl EventStore for GatedStore {
    async fn append(
        &self,
        room_code: &str,
        event_type: EventType,
        player_id: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<RecordId, DuelError> {
        self.check()?;
        self.inner
            .append(room_code, event_type, player_id, payload)
            .await
    }

    async fn query_latest(
        &self,
        room_code: &str,
        event_type: EventType,
    ) -> Result<Option<GameEvent>, DuelError> {
        self.check()?;
        self.inner.query_latest(room_code, event_type).await
    }

    async fn query_latest_excluding(
        &self,
        room_code: &str,
        excluded: &[EventType],
    ) -> Result<Option<GameEvent>, DuelError> {
        self.check()?;
        self.inner.query_latest_excluding(room_code, excluded).await
    }

    async fn create_room(&self, room: Room) -> Result<(), DuelError> {
        self.check()?;
        self.inner.create_room(room).await
    }

    async fn find_room(&self, code: &str) -> Result<Option<Room>, DuelError> {
        self.check()?;
        self.inner.find_room(code).await
    }

    async fn update_room(&self, room: Room) -> Result<(), DuelError> {
        self.check()?;
        self.inner.update_room(room).await
    }

    async fn save_match_result(&self, result: MatchResult) -> Result<(), DuelError> {
        self.check()?;
        self.inner.save_match_result(result).await
    }

    async fn list_match_results(&self) -> Result<Vec<MatchResult>, DuelError> {
        self.check()?;
        self.inner.list_match_results().await
    }
}

// ── Session helpers ─────────────────────────────────────────────────

/// Install a test log subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Create a room hosted by "Ana" and join it as "Bo".
pub async fn ready_room(store: &MemoryStore) -> Room {
    let mut rng = StdRng::seed_from_u64(42);
    let room = lobby::create_room(store, "device-ana", "Ana", &mut rng)
        .await
        .expect("create room");
    lobby::join_room(store, &room.code, "device-bo", "Bo")
        .await
        .expect("join room")
}

/// Both seats of one match, each behind its own [`GatedStore`].
pub struct Pair {
    pub host: DuelClient,
    pub host_events: mpsc::Receiver<DuelEvent>,
    pub host_store: GatedStore,
    pub guest: DuelClient,
    pub guest_events: mpsc::Receiver<DuelEvent>,
    pub guest_store: GatedStore,
}

pub fn start_pair(store: &Arc<MemoryStore>, room: &Room, config: DuelConfig) -> Pair {
    let host_store = GatedStore::new(Arc::clone(store));
    let guest_store = GatedStore::new(Arc::clone(store));
    let (host, host_events) = DuelClient::start(
        Arc::new(host_store.clone()),
        config.clone(),
        SessionParams::host(room, CANVAS),
    );
    let (guest, guest_events) = DuelClient::start(
        Arc::new(guest_store.clone()),
        config,
        SessionParams::guest(room, CANVAS),
    );
    Pair {
        host,
        host_events,
        host_store,
        guest,
        guest_events,
        guest_store,
    }
}

/// Receive events until one matches `pred`.
pub async fn next_event(
    events: &mut mpsc::Receiver<DuelEvent>,
    mut pred: impl FnMut(&DuelEvent) -> bool,
) -> DuelEvent {
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Drain events until the channel closes.
pub async fn drain(events: &mut mpsc::Receiver<DuelEvent>) -> Vec<DuelEvent> {
    tokio::time::timeout(WAIT_LIMIT, async {
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        seen
    })
    .await
    .expect("event channel never closed")
}

/// Poll `cond` every 10 ms until it holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}

/// Wait until `client` shows a target other than `previous`.
pub async fn wait_for_target(client: &DuelClient, previous: Option<&str>) -> Target {
    let mut found = None;
    wait_until(|| {
        found = client
            .snapshot()
            .objective
            .filter(|t| Some(t.objective_id.as_str()) != previous);
        found.is_some()
    })
    .await;
    found.expect("target")
}

/// Run `fut` to completion within the wait limit.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(WAIT_LIMIT, fut)
        .await
        .expect("timed out")
}
