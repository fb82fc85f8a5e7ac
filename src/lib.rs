//! # duel-sync
//!
//! Session protocol for a two-player real-time duel played over a shared,
//! append-only event log that clients can only poll.
//!
//! Two devices join a room by code. Player 1 is the authority: it spawns
//! targets and turns competing hit claims into authoritative scores. Both
//! clients append records to the room's log and poll the newest record of
//! each kind at a fixed interval, so the protocol tolerates lost, late and
//! repeated observations.
//!
//! ## Features
//!
//! - **Store-agnostic**: implement the [`EventStore`] trait for any backend
//! - **Single-threaded state**: all session state changes happen on one driver task
//! - **Connectivity aware**: network pauses with a grace period before abandoning
//! - **Event-driven**: receive typed [`DuelEvent`]s via a channel
//! - **In-memory store**: default `memory-store` feature provides [`MemoryStore`]
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use duel_sync::{lobby, CanvasSize, DuelClient, DuelConfig, MemoryStore, SessionParams};
//! use rand::SeedableRng;
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let room = lobby::create_room(store.as_ref(), "device-1", "Ana", &mut rng).await?;
//! let room = lobby::join_room(store.as_ref(), &room.code, "device-2", "Bo").await?;
//!
//! let canvas = CanvasSize::new(1080.0, 1920.0);
//! let (mut host, _host_events) =
//!     DuelClient::start(store.clone(), DuelConfig::default(), SessionParams::host(&room, canvas));
//! let (mut guest, _guest_events) =
//!     DuelClient::start(store, DuelConfig::default(), SessionParams::guest(&room, canvas));
//!
//! host.shutdown().await;
//! guest.shutdown().await;
//! # Ok::<(), duel_sync::DuelError>(())
//! # });
//! ```

pub mod arbiter;
pub mod client;
pub mod cursor;
pub mod error;
pub mod error_codes;
pub mod event;
pub mod lobby;
pub mod protocol;
mod scheduler;
pub mod session;
pub mod store;
pub mod stores;
pub mod watchdog;

// Re-export primary types for ergonomic imports.
pub use arbiter::CanvasSize;
pub use client::{DuelClient, DuelConfig, SessionParams};
pub use error::DuelError;
pub use error_codes::ErrorCode;
pub use event::{DuelEvent, Origin};
pub use protocol::{EventType, GameEvent, MatchResult, Room, RoomStatus, Seat};
pub use session::{EndReason, Scores, SessionPhase, SessionSnapshot};
pub use store::EventStore;

#[cfg(feature = "memory-store")]
pub use stores::MemoryStore;
