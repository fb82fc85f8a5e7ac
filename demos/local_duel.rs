//! # Local Duel Example
//!
//! Demonstrates a complete match between two simulated players sharing an
//! in-process [`MemoryStore`]:
//!
//! 1. Player 1 creates a room, player 2 joins it by code
//! 2. Both seats start a `DuelClient`
//! 3. Each bot reacts to spawned targets after a random delay and claims them
//! 4. The match runs to the winning score and the result lands in the history
//! 5. Ctrl+C shuts both clients down early
//!
//! ## Running
//!
//! ```sh
//! cargo run --example local_duel
//!
//! # Watch the protocol at work:
//! RUST_LOG=duel_sync=debug cargo run --example local_duel
//! ```

use std::sync::Arc;
use std::time::Duration;

use duel_sync::protocol::new_player_id;
use duel_sync::{
    lobby, CanvasSize, DuelClient, DuelConfig, DuelEvent, MemoryStore, SessionParams,
};
use rand::Rng;
use tokio::sync::mpsc;

/// Play surface shared by both simulated devices.
const CANVAS: CanvasSize = CanvasSize {
    width: 1080.0,
    height: 1920.0,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Lobby ───────────────────────────────────────────────────────
    let store = Arc::new(MemoryStore::new());
    let room = lobby::create_room(
        store.as_ref(),
        &new_player_id(),
        "Ana",
        &mut rand::thread_rng(),
    )
    .await?;
    tracing::info!("Room {} created, share the code with player 2", room.code);

    let room = lobby::join_room(store.as_ref(), &room.code, &new_player_id(), "Bo").await?;
    tracing::info!("Bo joined room {}", room.code);

    // ── Sessions ────────────────────────────────────────────────────
    let config = DuelConfig::default().with_winning_score(5);
    let (host, host_events) = DuelClient::start(
        store.clone(),
        config.clone(),
        SessionParams::host(&room, CANVAS),
    );
    let (guest, guest_events) =
        DuelClient::start(store.clone(), config, SessionParams::guest(&room, CANVAS));

    let host_bot = tokio::spawn(play(host, host_events, 180..420));
    let guest_bot = tokio::spawn(play(guest, guest_events, 200..450));

    // ── Wait for the match or Ctrl+C ────────────────────────────────
    tokio::select! {
        _ = async { let _ = tokio::join!(host_bot, guest_bot); } => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, leaving");
            return Ok(());
        }
    }

    // ── History ─────────────────────────────────────────────────────
    for result in lobby::match_history(store.as_ref()).await? {
        tracing::info!(
            "{} {} - {} {} (winner: {})",
            result.player1_name,
            result.player1_score,
            result.player2_score,
            result.player2_name,
            result.winner_name
        );
    }

    Ok(())
}

/// Drive one simulated player until its session ends.
async fn play(
    mut client: DuelClient,
    mut events: mpsc::Receiver<DuelEvent>,
    reaction_ms: std::ops::Range<u64>,
) {
    let seat = client.seat();
    while let Some(event) = events.recv().await {
        match event {
            DuelEvent::TargetSpawned { x, y, .. } => {
                let delay = rand::thread_rng().gen_range(reaction_ms.clone());
                tokio::time::sleep(Duration::from_millis(delay)).await;
                // Tap slightly off-centre, still inside the target.
                if let Err(e) = client.tap(x + 12.0, y - 8.0) {
                    tracing::warn!("{seat}: tap rejected: {e}");
                }
            }
            DuelEvent::ScoreChanged { scores } => {
                tracing::info!("{seat}: score {} - {}", scores.player1, scores.player2);
            }
            DuelEvent::MatchPoint { name, .. } => {
                tracing::info!("{seat}: match point for {name}");
            }
            DuelEvent::MatchEnded {
                winner_name,
                reason,
                ..
            } => {
                tracing::info!("{seat}: match over, {winner_name} wins ({reason:?})");
            }
            DuelEvent::WriteFailed { event_type, reason } => {
                tracing::warn!("{seat}: write of {event_type:?} failed: {reason}");
            }
            _ => {}
        }
    }
    client.shutdown().await;
}
