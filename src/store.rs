//! Event log abstraction shared by both seats of a match.
//!
//! The [`EventStore`] trait is everything the session protocol needs from a
//! backend: append a record, fetch the newest record of a type, and a handful
//! of room and match-result operations for the lobby. No push, no
//! transactions and no ordering guarantee beyond the store-reported creation
//! time are assumed.
//!
//! # Implementing a Custom Store
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use duel_sync::error::DuelError;
//! use duel_sync::protocol::{EventType, GameEvent, MatchResult, RecordId, Room};
//! use duel_sync::store::EventStore;
//!
//! struct MyBackend { /* HTTP client, credentials, ... */ }
//!
//! #[async_trait]
//! impl EventStore for MyBackend {
//!     async fn append(
//!         &self,
//!         room_code: &str,
//!         event_type: EventType,
//!         player_id: Option<&str>,
//!         payload: serde_json::Value,
//!     ) -> Result<RecordId, DuelError> {
//!         // POST the record, return the id assigned by the backend
//!         todo!()
//!     }
//!     # async fn query_latest(&self, _: &str, _: EventType) -> Result<Option<GameEvent>, DuelError> { todo!() }
//!     # async fn query_latest_excluding(&self, _: &str, _: &[EventType]) -> Result<Option<GameEvent>, DuelError> { todo!() }
//!     # async fn create_room(&self, _: Room) -> Result<(), DuelError> { todo!() }
//!     # async fn find_room(&self, _: &str) -> Result<Option<Room>, DuelError> { todo!() }
//!     # async fn update_room(&self, _: Room) -> Result<(), DuelError> { todo!() }
//!     # async fn save_match_result(&self, _: MatchResult) -> Result<(), DuelError> { todo!() }
//!     # async fn list_match_results(&self) -> Result<Vec<MatchResult>, DuelError> { todo!() }
//! }
//! ```

use async_trait::async_trait;

use crate::error::DuelError;
use crate::protocol::{EventType, GameEvent, MatchResult, RecordId, Room};

/// An append-only, poll-only record store.
///
/// Implementations are shared between the polling tasks and the record
/// writer of a session, hence `&self` receivers and `Send + Sync`. The trait
/// is object-safe; sessions hold an `Arc<dyn EventStore>`.
///
/// # Errors
///
/// Every operation should report a missing network as
/// [`DuelError::StoreUnreachable`] so callers can tell a connectivity problem
/// apart from a backend failure ([`DuelError::StoreWrite`] /
/// [`DuelError::StoreQuery`]).
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Append an immutable record to a room's log and return its identifier.
    async fn append(
        &self,
        room_code: &str,
        event_type: EventType,
        player_id: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<RecordId, DuelError>;

    /// The most recently created record of `event_type` in the room, if any.
    async fn query_latest(
        &self,
        room_code: &str,
        event_type: EventType,
    ) -> Result<Option<GameEvent>, DuelError>;

    /// The most recently created record whose type is not in `excluded`.
    async fn query_latest_excluding(
        &self,
        room_code: &str,
        excluded: &[EventType],
    ) -> Result<Option<GameEvent>, DuelError>;

    /// Store a new room.
    ///
    /// Returns [`DuelError::RoomCodeTaken`] if the code is already in use.
    async fn create_room(&self, room: Room) -> Result<(), DuelError>;

    /// Look up a room by code.
    async fn find_room(&self, code: &str) -> Result<Option<Room>, DuelError>;

    /// Overwrite the room with the same code.
    ///
    /// Returns [`DuelError::RoomNotFound`] if no such room exists.
    async fn update_room(&self, room: Room) -> Result<(), DuelError>;

    /// Persist the outcome of a finished match.
    async fn save_match_result(&self, result: MatchResult) -> Result<(), DuelError>;

    /// All persisted match results, newest first.
    async fn list_match_results(&self) -> Result<Vec<MatchResult>, DuelError>;
}
