//! Fixed-interval polling of the event log.
//!
//! Each watched feed gets its own task that queries the newest record,
//! hands the result to the session driver and sleeps for the polling
//! interval before trying again. A failed query is not retried early: the
//! interval is the backoff. Tasks never touch session state themselves; the
//! driver applies every result on its own task.
//!
//! Stopping is unconditional and idempotent: [`PollScheduler::stop_all`]
//! aborts every task, and each task also exits on its own once it observes
//! the session has ended.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cursor::Feed;
use crate::protocol::{EventType, GameEvent, Room, RoomStatus};
use crate::session::SessionSnapshot;
use crate::store::EventStore;

/// Result of one poll, marshaled to the session driver.
#[derive(Debug)]
pub(crate) enum PollOutcome {
    /// Newest record of a feed (or none yet).
    Record {
        feed: Feed,
        record: Option<GameEvent>,
    },
    /// The room reached [`RoomStatus::Ready`].
    PeerJoined(Room),
}

/// Owns the polling tasks of one session.
pub(crate) struct PollScheduler {
    store: Arc<dyn EventStore>,
    room_code: String,
    interval: Duration,
    peer_join_interval: Duration,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    results_tx: mpsc::Sender<PollOutcome>,
    feeds: HashMap<Feed, JoinHandle<()>>,
    peer_join: Option<JoinHandle<()>>,
}

impl PollScheduler {
    pub(crate) fn new(
        store: Arc<dyn EventStore>,
        room_code: String,
        interval: Duration,
        peer_join_interval: Duration,
        snapshot_rx: watch::Receiver<SessionSnapshot>,
        results_tx: mpsc::Sender<PollOutcome>,
    ) -> Self {
        Self {
            store,
            room_code,
            interval,
            peer_join_interval,
            snapshot_rx,
            results_tx,
            feeds: HashMap::new(),
            peer_join: None,
        }
    }

    /// Start polling a feed. Starting an already running feed does nothing.
    pub(crate) fn start_feed(&mut self, feed: Feed) {
        if self.feeds.contains_key(&feed) {
            return;
        }
        debug!(room = %self.room_code, %feed, "polling started");
        let task = tokio::spawn(feed_loop(
            Arc::clone(&self.store),
            self.room_code.clone(),
            feed,
            self.interval,
            self.snapshot_rx.clone(),
            self.results_tx.clone(),
        ));
        self.feeds.insert(feed, task);
    }

    /// Start the slow room poll that waits for the second player.
    pub(crate) fn start_peer_join(&mut self) {
        if self.peer_join.is_some() {
            return;
        }
        self.peer_join = Some(tokio::spawn(peer_join_loop(
            Arc::clone(&self.store),
            self.room_code.clone(),
            self.peer_join_interval,
            self.results_tx.clone(),
        )));
    }

    pub(crate) fn stop_peer_join(&mut self) {
        if let Some(task) = self.peer_join.take() {
            task.abort();
        }
    }

    /// Abort every polling task.
    pub(crate) fn stop_all(&mut self) {
        self.stop_peer_join();
        for (feed, task) in self.feeds.drain() {
            debug!(%feed, "polling stopped");
            task.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_polling(&self, feed: Feed) -> bool {
        self.feeds.contains_key(&feed)
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn feed_loop(
    store: Arc<dyn EventStore>,
    room_code: String,
    feed: Feed,
    interval: Duration,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    results_tx: mpsc::Sender<PollOutcome>,
) {
    loop {
        let phase = snapshot_rx.borrow().phase;
        if phase.is_ended() {
            break;
        }

        if !(feed.pauses_with_session() && phase.is_paused()) {
            let result = match feed.event_type() {
                Some(event_type) => store.query_latest(&room_code, event_type).await,
                None => {
                    store
                        .query_latest_excluding(&room_code, &EventType::GAMEPLAY)
                        .await
                }
            };
            match result {
                Ok(record) => {
                    if results_tx
                        .send(PollOutcome::Record { feed, record })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    debug!(room = %room_code, %feed, "poll failed, retrying next interval: {e}");
                }
            }
        }

        tokio::time::sleep(interval).await;
    }
    debug!(room = %room_code, %feed, "poll loop exited");
}

async fn peer_join_loop(
    store: Arc<dyn EventStore>,
    room_code: String,
    interval: Duration,
    results_tx: mpsc::Sender<PollOutcome>,
) {
    loop {
        match store.find_room(&room_code).await {
            Ok(Some(room)) if room.status == RoomStatus::Ready => {
                let _ = results_tx.send(PollOutcome::PeerJoined(room)).await;
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(room = %room_code, "room poll failed, retrying next interval: {e}");
            }
        }
        tokio::time::sleep(interval).await;
    }
}
