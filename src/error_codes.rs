//! Error codes for structured, user-facing error reporting.
//!
//! Codes serialize using `SCREAMING_SNAKE_CASE` so they can be logged or
//! forwarded to a UI layer unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error codes derived from [`DuelError`](crate::DuelError).
///
/// Use [`description()`](ErrorCode::description) for a message to show the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Connectivity
    Connectivity,

    // Validation errors
    InvalidRoomCode,
    InvalidPlayerName,

    // Room errors
    RoomNotFound,
    RoomCodeTaken,

    // Authority errors
    AuthorityDenied,

    // Session errors
    SessionClosed,
    MalformedRecord,

    // Store errors
    StorageError,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    ///
    /// [`Connectivity`](Self::Connectivity) deliberately reads differently from
    /// the generic failures so the player knows to check their network.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Connectivity => {
                "No connection to the game server. Check your network and try again."
            }

            Self::InvalidRoomCode => "The room code must have exactly 4 characters.",
            Self::InvalidPlayerName => "Please enter your name.",

            Self::RoomNotFound => "There is no available room with that code.",
            Self::RoomCodeTaken => {
                "That room code is already in use. Please try creating the room again."
            }

            Self::AuthorityDenied => "Only the room host can perform this action.",

            Self::SessionClosed => "The match is over.",
            Self::MalformedRecord => "Received an unreadable game record.",

            Self::StorageError => "Something went wrong on the game server. Please try again.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Use the serde representation for consistency with the wire format.
        let s = match self {
            Self::Connectivity => "CONNECTIVITY",
            Self::InvalidRoomCode => "INVALID_ROOM_CODE",
            Self::InvalidPlayerName => "INVALID_PLAYER_NAME",
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::RoomCodeTaken => "ROOM_CODE_TAKEN",
            Self::AuthorityDenied => "AUTHORITY_DENIED",
            Self::SessionClosed => "SESSION_CLOSED",
            Self::MalformedRecord => "MALFORMED_RECORD",
            Self::StorageError => "STORAGE_ERROR",
        };
        f.write_str(s)
    }
}
