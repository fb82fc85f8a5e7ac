//! In-process event store.
//!
//! [`MemoryStore`] keeps every room, record and match result in memory
//! behind a mutex. It honours the same contract a remote backend would:
//! identifiers and creation timestamps are strictly increasing, queries only
//! ever return the newest matching record, and rooms are unique by code.
//!
//! A reachability switch ([`MemoryStore::set_reachable`]) makes every
//! operation fail with [`DuelError::StoreUnreachable`], which is how tests
//! and demos simulate an outage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use crate::error::DuelError;
use crate::protocol::{EventType, GameEvent, MatchResult, RecordId, Room};
use crate::store::EventStore;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Default)]
struct Inner {
    events: Vec<GameEvent>,
    rooms: HashMap<String, Room>,
    /// Oldest first; listed in reverse.
    results: Vec<MatchResult>,
    next_seq: u64,
    last_created_at: u64,
}

impl Inner {
    /// Next creation timestamp, strictly greater than every previous one.
    fn stamp(&mut self) -> u64 {
        let ts = now_millis().max(self.last_created_at + 1);
        self.last_created_at = ts;
        ts
    }

    fn newest_where(&self, mut pred: impl FnMut(&GameEvent) -> bool) -> Option<GameEvent> {
        self.events
            .iter()
            .filter(|ev| pred(ev))
            .max_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)))
            .cloned()
    }
}

/// An [`EventStore`] living entirely in process memory.
///
/// Cheap to share: wrap it in an `Arc` and hand clones to every session.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    reachable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty, reachable store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_reachable(&self, reachable: bool) {
        debug!(reachable, "memory store reachability changed");
        self.reachable.store(reachable, Ordering::Release);
    }

    /// Returns `true` unless an outage is being simulated.
    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    /// Every record of a room, oldest first.
    pub fn events(&self, room_code: &str) -> Vec<GameEvent> {
        self.lock()
            .events
            .iter()
            .filter(|ev| ev.room_code == room_code)
            .cloned()
            .collect()
    }

    /// Every record of the given type in a room, oldest first.
    pub fn events_of(&self, room_code: &str, event_type: EventType) -> Vec<GameEvent> {
        self.events(room_code)
            .into_iter()
            .filter(|ev| ev.event_type == event_type)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave `Inner` half-updated:
        // every mutation is a single push or insert.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_reachable(&self) -> Result<(), DuelError> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(DuelError::StoreUnreachable("memory store is offline".into()))
        }
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(
        &self,
        room_code: &str,
        event_type: EventType,
        player_id: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<RecordId, DuelError> {
        self.ensure_reachable()?;
        let mut inner = self.lock();
        inner.next_seq += 1;
        let id = format!("{:010}", inner.next_seq);
        let created_at = inner.stamp();
        inner.events.push(GameEvent {
            id: id.clone(),
            room_code: room_code.to_string(),
            event_type,
            player_id: player_id.map(str::to_string),
            payload,
            created_at,
        });
        debug!(room = %room_code, %event_type, id = %id, "record appended");
        Ok(id)
    }

    async fn query_latest(
        &self,
        room_code: &str,
        event_type: EventType,
    ) -> Result<Option<GameEvent>, DuelError> {
        self.ensure_reachable()?;
        Ok(self
            .lock()
            .newest_where(|ev| ev.room_code == room_code && ev.event_type == event_type))
    }

    async fn query_latest_excluding(
        &self,
        room_code: &str,
        excluded: &[EventType],
    ) -> Result<Option<GameEvent>, DuelError> {
        self.ensure_reachable()?;
        Ok(self
            .lock()
            .newest_where(|ev| ev.room_code == room_code && !excluded.contains(&ev.event_type)))
    }

    async fn create_room(&self, room: Room) -> Result<(), DuelError> {
        self.ensure_reachable()?;
        let mut inner = self.lock();
        if inner.rooms.contains_key(&room.code) {
            return Err(DuelError::RoomCodeTaken(room.code));
        }
        inner.rooms.insert(room.code.clone(), room);
        Ok(())
    }

    async fn find_room(&self, code: &str) -> Result<Option<Room>, DuelError> {
        self.ensure_reachable()?;
        Ok(self.lock().rooms.get(code).cloned())
    }

    async fn update_room(&self, room: Room) -> Result<(), DuelError> {
        self.ensure_reachable()?;
        let mut inner = self.lock();
        match inner.rooms.get_mut(&room.code) {
            Some(slot) => {
                *slot = room;
                Ok(())
            }
            None => Err(DuelError::RoomNotFound(room.code)),
        }
    }

    async fn save_match_result(&self, result: MatchResult) -> Result<(), DuelError> {
        self.ensure_reachable()?;
        self.lock().results.push(result);
        Ok(())
    }

    async fn list_match_results(&self) -> Result<Vec<MatchResult>, DuelError> {
        self.ensure_reachable()?;
        Ok(self.lock().results.iter().rev().cloned().collect())
    }
}
