//! Error types for the duel session client.

use thiserror::Error;

use crate::error_codes::ErrorCode;
use crate::protocol::EventType;

/// Errors that can occur when talking to the event log or driving a session.
#[derive(Debug, Error)]
pub enum DuelError {
    /// The store could not be reached at all (no network, DNS failure, ...).
    #[error("event store unreachable: {0}")]
    StoreUnreachable(String),

    /// The store was reached but rejected or failed a write.
    #[error("event store write error: {0}")]
    StoreWrite(String),

    /// The store was reached but a query failed.
    #[error("event store query error: {0}")]
    StoreQuery(String),

    /// Failed to serialize or deserialize a record.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A record's payload did not have the shape its type requires.
    #[error("malformed {event_type} payload: {reason}")]
    MalformedPayload {
        /// Type of the offending record.
        event_type: EventType,
        /// What was wrong with it.
        reason: String,
    },

    /// No joinable room exists with this code.
    #[error("no waiting room with code {0}")]
    RoomNotFound(String),

    /// A room with this code already exists.
    #[error("room code {0} is already taken")]
    RoomCodeTaken(String),

    /// The room code is not four characters.
    #[error("invalid room code: {0:?}")]
    InvalidRoomCode(String),

    /// The player name is empty.
    #[error("player name must not be empty")]
    InvalidPlayerName,

    /// A SPAWN or SCORE_UPDATE was about to be emitted by a seat without authority.
    #[error("only the authority seat may emit {0}")]
    NotAuthority(EventType),

    /// The session has ended (or was shut down) and accepts no more commands.
    #[error("session is closed")]
    SessionClosed,
}

impl DuelError {
    /// Returns `true` when the failure was caused by missing connectivity
    /// rather than by the store or the request itself.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::StoreUnreachable(_))
    }

    /// Maps the error to the structured code shown to end users.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::StoreUnreachable(_) => ErrorCode::Connectivity,
            Self::StoreWrite(_) | Self::StoreQuery(_) => ErrorCode::StorageError,
            Self::Serialization(_) | Self::MalformedPayload { .. } => ErrorCode::MalformedRecord,
            Self::RoomNotFound(_) => ErrorCode::RoomNotFound,
            Self::RoomCodeTaken(_) => ErrorCode::RoomCodeTaken,
            Self::InvalidRoomCode(_) => ErrorCode::InvalidRoomCode,
            Self::InvalidPlayerName => ErrorCode::InvalidPlayerName,
            Self::NotAuthority(_) => ErrorCode::AuthorityDenied,
            Self::SessionClosed => ErrorCode::SessionClosed,
        }
    }

    /// Human-readable message suitable for displaying to the player.
    pub fn user_message(&self) -> &'static str {
        self.code().description()
    }
}

/// A specialized [`Result`] type for duel operations.
pub type Result<T> = std::result::Result<T, DuelError>;
