//! Event store implementations.
//!
//! Backends are feature-gated. Enable the corresponding Cargo feature to pull
//! one in:
//!
//! | Feature        | Store           |
//! |----------------|-----------------|
//! | `memory-store` | [`MemoryStore`] |
//!
//! # Example
//!
//! ```rust
//! # async fn example() -> Result<(), duel_sync::DuelError> {
//! use duel_sync::protocol::EventType;
//! use duel_sync::{EventStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! store.append("AB12", EventType::Pause, None, serde_json::json!({})).await?;
//!
//! let latest = store.query_latest("AB12", EventType::Pause).await?;
//! assert!(latest.is_some());
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "memory-store")]
pub mod memory;

#[cfg(feature = "memory-store")]
pub use memory::MemoryStore;
