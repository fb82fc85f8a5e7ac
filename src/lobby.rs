//! Room creation, joining and match history.
//!
//! These are the session-critical operations: unlike in-match writes, their
//! failures are returned to the caller so the UI can show
//! [`DuelError::user_message`] (which reads differently for connectivity
//! problems) and re-enable the button that triggered them.

use rand::Rng;
use tracing::{info, warn};

use crate::error::{DuelError, Result};
use crate::protocol::{MatchResult, Room, RoomStatus};
use crate::store::EventStore;

/// Length of a room code.
pub const ROOM_CODE_LEN: usize = 4;

/// Fresh codes tried before giving up on [`DuelError::RoomCodeTaken`].
const CREATE_ATTEMPTS: usize = 5;

/// Generate a shareable room code: two uppercase letters followed by a
/// two-digit number between 10 and 98 (e.g. `"QX42"`).
pub fn generate_room_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let first = char::from(rng.gen_range(b'A'..=b'Z'));
    let second = char::from(rng.gen_range(b'A'..=b'Z'));
    let number: u8 = rng.gen_range(10..99);
    format!("{first}{second}{number}")
}

/// Normalize user input into a room code.
///
/// # Errors
///
/// Returns [`DuelError::InvalidRoomCode`] unless the trimmed input has
/// exactly four characters.
pub fn normalize_room_code(input: &str) -> Result<String> {
    let code = input.trim().to_uppercase();
    if code.chars().count() != ROOM_CODE_LEN {
        return Err(DuelError::InvalidRoomCode(input.to_string()));
    }
    Ok(code)
}

fn validate_player_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DuelError::InvalidPlayerName);
    }
    Ok(name.to_string())
}

/// Create a waiting room hosted by `player_id`.
///
/// # Errors
///
/// Returns [`DuelError::InvalidPlayerName`] for a blank name, the store's
/// error if the room cannot be written, or [`DuelError::RoomCodeTaken`] if
/// every generated code collided.
pub async fn create_room<R: Rng + ?Sized>(
    store: &dyn EventStore,
    player_id: &str,
    player_name: &str,
    rng: &mut R,
) -> Result<Room> {
    let player_name = validate_player_name(player_name)?;
    let mut last_err = None;
    for _ in 0..CREATE_ATTEMPTS {
        let room = Room::waiting(generate_room_code(rng), player_id, player_name.clone());
        match store.create_room(room.clone()).await {
            Ok(()) => {
                info!(room = %room.code, "room created");
                return Ok(room);
            }
            Err(DuelError::RoomCodeTaken(code)) => {
                warn!(room = %code, "room code collision, retrying");
                last_err = Some(DuelError::RoomCodeTaken(code));
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| DuelError::RoomCodeTaken(String::new())))
}

/// Join the waiting room `code` as player 2.
///
/// # Errors
///
/// Returns [`DuelError::InvalidRoomCode`] / [`DuelError::InvalidPlayerName`]
/// for bad input, [`DuelError::RoomNotFound`] if no waiting room has that
/// code, or the store's error if the room cannot be read or updated.
pub async fn join_room(
    store: &dyn EventStore,
    code: &str,
    player_id: &str,
    player_name: &str,
) -> Result<Room> {
    let code = normalize_room_code(code)?;
    let player_name = validate_player_name(player_name)?;

    let mut room = match store.find_room(&code).await? {
        Some(room) if room.status == RoomStatus::Waiting => room,
        _ => return Err(DuelError::RoomNotFound(code)),
    };

    room.player2_id = player_id.to_string();
    room.player2_name = player_name;
    room.status = RoomStatus::Ready;
    store.update_room(room.clone()).await?;

    info!(room = %room.code, "joined room");
    Ok(room)
}

/// Every finished match, newest first.
///
/// # Errors
///
/// Returns the store's error if the results cannot be read.
pub async fn match_history(store: &dyn EventStore) -> Result<Vec<MatchResult>> {
    store.list_match_results().await
}
