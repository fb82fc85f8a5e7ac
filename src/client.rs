//! Async session client for one seat of a duel.
//!
//! [`DuelClient`] is a thin handle that talks to a background session driver
//! over an unbounded MPSC channel. The driver is the single logical thread of
//! the session: it owns the [`SessionState`], receives poll results from the
//! polling tasks, local commands from the handle and timer expiries, and is
//! the only code that mutates state. Records are appended by a separate
//! writer task fed by a queue, so the driver never waits on the store and a
//! client's own records land in the order it produced them.
//!
//! Events are emitted on a bounded channel
//! ([`tokio::sync::mpsc::Receiver<DuelEvent>`]) returned from
//! [`DuelClient::start`]. The channel closes once the driver and writer
//! have both exited.
//!
//! # Example
//!
//! ```rust,ignore
//! let store: Arc<dyn EventStore> = Arc::new(MemoryStore::new());
//! let room = lobby::create_room(store.as_ref(), &player_id, "Ana", &mut rng).await?;
//! let params = SessionParams::host(&room, CanvasSize::new(1080.0, 1920.0));
//! let (client, mut events) = DuelClient::start(store, DuelConfig::default(), params);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         DuelEvent::TargetSpawned { x, y, .. } => { /* draw the target */ }
//!         DuelEvent::MatchEnded { winner_name, .. } => { /* show the result */ }
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::arbiter::{self, CanvasSize, ScoreApplication, ScoreOutcome};
use crate::cursor::Feed;
use crate::error::{DuelError, Result};
use crate::event::{DuelEvent, Origin};
use crate::protocol::{
    AbandonPayload, EventBody, GameEvent, MatchResult, PlayerId, Room, ScoreUpdatePayload, Seat,
};
use crate::scheduler::{PollOutcome, PollScheduler};
use crate::session::{EndReason, ResumeOutcome, SessionPhase, SessionSnapshot, SessionState};
use crate::store::EventStore;
use crate::watchdog::{ConnectivityWatchdog, TimerToken};

/// Default interval between polls of a gameplay feed.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default interval between polls for the second player joining.
pub const DEFAULT_PEER_JOIN_INTERVAL: Duration = Duration::from_secs(2);

/// Default delay between a resolved point and the next spawn.
pub const DEFAULT_SPAWN_DELAY: Duration = Duration::from_millis(500);

/// Default time a disconnected seat has to come back.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(15);

/// Default score that wins the match.
pub const DEFAULT_WINNING_SCORE: u32 = 10;

/// Default hit radius of the target, in canvas units.
pub const DEFAULT_TARGET_RADIUS: f32 = 60.0;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Capacity of the channel carrying poll results to the driver.
const POLL_RESULT_CAPACITY: usize = 64;

// ── Configuration ───────────────────────────────────────────────────

/// Tuning for a [`DuelClient`].
///
/// # Example
///
/// ```
/// use duel_sync::client::DuelConfig;
/// use std::time::Duration;
///
/// let config = DuelConfig::default()
///     .with_winning_score(5)
///     .with_grace_period(Duration::from_secs(30));
/// assert_eq!(config.winning_score, 5);
/// assert_eq!(config.poll_interval, Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct DuelConfig {
    /// Interval between polls of each gameplay feed. Defaults to **100 ms**.
    pub poll_interval: Duration,
    /// Interval between room polls while waiting for player 2. Defaults to **2 s**.
    pub peer_join_interval: Duration,
    /// Delay between a resolved point and the next spawn. Defaults to **500 ms**.
    pub spawn_delay: Duration,
    /// How long a disconnected seat may stay away before it abandons.
    /// Defaults to **15 s**.
    pub grace_period: Duration,
    /// Score that ends the match. Defaults to **10**. Values below 1 are clamped to 1.
    pub winning_score: u32,
    /// Radius used by [`DuelClient::tap`]. Defaults to **60**.
    pub target_radius: f32,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) rather than stalling the session. `MatchEnded` and `Stopped`
    /// are always delivered. Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time [`DuelClient::shutdown`] waits for the driver before aborting it.
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Seed for target placement; `None` seeds from the OS.
    pub rng_seed: Option<u64>,
}

impl Default for DuelConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            peer_join_interval: DEFAULT_PEER_JOIN_INTERVAL,
            spawn_delay: DEFAULT_SPAWN_DELAY,
            grace_period: DEFAULT_GRACE_PERIOD,
            winning_score: DEFAULT_WINNING_SCORE,
            target_radius: DEFAULT_TARGET_RADIUS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            rng_seed: None,
        }
    }
}

impl DuelConfig {
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_peer_join_interval(mut self, interval: Duration) -> Self {
        self.peer_join_interval = interval;
        self
    }

    #[must_use]
    pub fn with_spawn_delay(mut self, delay: Duration) -> Self {
        self.spawn_delay = delay;
        self
    }

    #[must_use]
    pub fn with_grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    /// Set the winning score. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_winning_score(mut self, score: u32) -> Self {
        self.winning_score = score.max(1);
        self
    }

    #[must_use]
    pub fn with_target_radius(mut self, radius: f32) -> Self {
        self.target_radius = radius;
        self
    }

    /// Set the capacity of the bounded event channel. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Make target placement reproducible.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }
}

// ── SessionParams ───────────────────────────────────────────────────

/// Who is playing, where, and on what canvas.
///
/// # Example
///
/// ```
/// use duel_sync::arbiter::CanvasSize;
/// use duel_sync::client::SessionParams;
/// use duel_sync::protocol::{Room, Seat};
///
/// let room = Room::waiting("AB12", "device-1", "Ana");
/// let params = SessionParams::host(&room, CanvasSize::new(800.0, 600.0));
/// assert_eq!(params.seat, Seat::Player1);
/// assert_eq!(params.player_id, "device-1");
/// ```
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub room_code: String,
    pub seat: Seat,
    /// Device identity attached to every record this client appends.
    pub player_id: PlayerId,
    pub player1_name: String,
    /// Empty for the host until player 2 joins.
    pub player2_name: String,
    pub canvas: CanvasSize,
}

impl SessionParams {
    pub fn new(room_code: impl Into<String>, seat: Seat, player_id: impl Into<PlayerId>) -> Self {
        Self {
            room_code: room_code.into(),
            seat,
            player_id: player_id.into(),
            player1_name: String::new(),
            player2_name: String::new(),
            canvas: CanvasSize::default(),
        }
    }

    /// Parameters for the room creator (the authority seat).
    pub fn host(room: &Room, canvas: CanvasSize) -> Self {
        Self::new(room.code.clone(), Seat::Player1, room.player1_id.clone())
            .with_names(room.player1_name.clone(), room.player2_name.clone())
            .with_canvas(canvas)
    }

    /// Parameters for the joiner.
    pub fn guest(room: &Room, canvas: CanvasSize) -> Self {
        Self::new(room.code.clone(), Seat::Player2, room.player2_id.clone())
            .with_names(room.player1_name.clone(), room.player2_name.clone())
            .with_canvas(canvas)
    }

    #[must_use]
    pub fn with_names(
        mut self,
        player1_name: impl Into<String>,
        player2_name: impl Into<String>,
    ) -> Self {
        self.player1_name = player1_name.into();
        self.player2_name = player2_name.into();
        self
    }

    #[must_use]
    pub fn with_canvas(mut self, canvas: CanvasSize) -> Self {
        self.canvas = canvas;
        self
    }
}

// ── Commands ────────────────────────────────────────────────────────

#[derive(Debug)]
enum Command {
    Tap { x: f32, y: f32 },
    ClaimHit,
    Pause,
    Resume,
    Abandon,
    Connectivity(bool),
    Resize(CanvasSize),
}

/// Work for the record writer.
#[derive(Debug)]
enum Outgoing {
    Record(EventBody),
    MatchResult(MatchResult),
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to one seat's running session.
///
/// Created via [`DuelClient::start`], which spawns the session driver and
/// returns this handle together with an event receiver. Methods queue a
/// command for the driver and return immediately.
pub struct DuelClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    active: Arc<AtomicBool>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    seat: Seat,
    room_code: String,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl DuelClient {
    /// Start the session driver and return a handle plus event receiver.
    ///
    /// Polling begins immediately. The authority seat first waits for the
    /// room to become ready, then spawns the first target; the other seat
    /// starts watching for spawns straight away.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        store: Arc<dyn EventStore>,
        config: DuelConfig,
        params: SessionParams,
    ) -> (Self, mpsc::Receiver<DuelEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<DuelEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel::<Outgoing>();
        let (poll_tx, poll_rx) = mpsc::channel::<PollOutcome>(POLL_RESULT_CAPACITY);

        let session = SessionState::new(
            params.room_code.clone(),
            params.seat,
            params.player1_name,
            params.player2_name,
        );
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
        let active = Arc::new(AtomicBool::new(true));

        let writer = tokio::spawn(record_writer(
            Arc::clone(&store),
            params.room_code.clone(),
            params.player_id.clone(),
            writer_rx,
            event_tx.clone(),
        ));

        let scheduler = PollScheduler::new(
            store,
            params.room_code.clone(),
            config.poll_interval,
            config.peer_join_interval,
            snapshot_rx.clone(),
            poll_tx,
        );

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let driver = Driver {
            watchdog: ConnectivityWatchdog::new(config.grace_period),
            session,
            config: config.clone(),
            player_id: params.player_id,
            canvas: params.canvas,
            rng,
            scheduler,
            pending_spawn: None,
            spawn_on_layout: false,
            peer_joined: false,
            event_tx,
            snapshot_tx,
            writer_tx,
        };

        let task = tokio::spawn(driver.run(
            cmd_rx,
            poll_rx,
            shutdown_rx,
            Arc::clone(&active),
            writer,
        ));

        let client = Self {
            cmd_tx,
            active,
            snapshot_rx,
            seat: params.seat,
            room_code: params.room_code,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        (client, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Report a touch at `(x, y)`; claims the target if the point is on it.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::SessionClosed`] once the session has ended.
    pub fn tap(&self, x: f32, y: f32) -> Result<()> {
        self.send(Command::Tap { x, y })
    }

    /// Claim the current target without hit testing.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::SessionClosed`] once the session has ended.
    pub fn claim_hit(&self) -> Result<()> {
        self.send(Command::ClaimHit)
    }

    /// Pause the match for both seats.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::SessionClosed`] once the session has ended.
    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    /// Resume a manually paused match. Ignored while network-paused.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::SessionClosed`] once the session has ended.
    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    /// Leave the match; the other seat wins.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::SessionClosed`] once the session has ended.
    pub fn abandon(&self) -> Result<()> {
        self.send(Command::Abandon)
    }

    /// Feed the device's reachability signal into the watchdog.
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::SessionClosed`] once the session has ended.
    pub fn set_connectivity(&self, reachable: bool) -> Result<()> {
        self.send(Command::Connectivity(reachable))
    }

    /// Report the play surface size (e.g. after layout or rotation).
    ///
    /// # Errors
    ///
    /// Returns [`DuelError::SessionClosed`] once the session has ended.
    pub fn resize(&self, canvas: CanvasSize) -> Result<()> {
        self.send(Command::Resize(canvas))
    }

    /// Leave the session and stop the driver.
    ///
    /// A match still in play is abandoned on the way out, exactly as
    /// [`abandon`](Self::abandon) does, so the other seat is not left waiting:
    /// the receiver yields [`DuelEvent::MatchEnded`] first. A host whose
    /// opponent never joined just stops. The receiver then yields
    /// [`DuelEvent::Stopped`] and `None` once the driver exits.
    pub async fn shutdown(&mut self) {
        debug!(room = %self.room_code, "DuelClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session driver terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session driver did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session driver aborted: {join_err}");
                    }
                }
            }
        }

        self.active.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` until the match ends or the client shuts down.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Latest published view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn seat(&self) -> Seat {
        self.seat
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, cmd: Command) -> Result<()> {
        if !self.active.load(Ordering::Acquire) {
            return Err(DuelError::SessionClosed);
        }
        self.cmd_tx.send(cmd).map_err(|_| DuelError::SessionClosed)
    }
}

impl std::fmt::Debug for DuelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuelClient")
            .field("room_code", &self.room_code)
            .field("seat", &self.seat)
            .field("active", &self.is_active())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for DuelClient {
    fn drop(&mut self) {
        // Same teardown as `shutdown`, without waiting: the driver abandons a
        // live match, flushes the writer and exits on its own.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        drop(self.task.take());
    }
}

// ── Session driver ──────────────────────────────────────────────────

struct Driver {
    session: SessionState,
    config: DuelConfig,
    player_id: PlayerId,
    canvas: CanvasSize,
    rng: StdRng,
    watchdog: ConnectivityWatchdog,
    scheduler: PollScheduler,
    /// Authority only: when the next target is due.
    pending_spawn: Option<Instant>,
    /// Authority only: a spawn was skipped because the canvas had no size.
    spawn_on_layout: bool,
    peer_joined: bool,
    event_tx: mpsc::Sender<DuelEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    writer_tx: mpsc::UnboundedSender<Outgoing>,
}

impl Driver {
    /// Drive the session until it ends, the handle shuts it down, or the
    /// handle is dropped.
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut poll_rx: mpsc::Receiver<PollOutcome>,
        mut shutdown_rx: oneshot::Receiver<()>,
        active: Arc<AtomicBool>,
        writer: tokio::task::JoinHandle<()>,
    ) {
        info!(
            room = %self.session.room_code(),
            seat = %self.session.seat(),
            authority = self.session.is_authority(),
            "session started"
        );
        self.begin();

        loop {
            let grace = self.watchdog.timer().deadline();
            let grace_deadline = grace.map_or_else(Instant::now, |(deadline, _)| deadline);
            let spawn_due = self
                .pending_spawn
                .filter(|_| !self.session.is_game_paused());
            let spawn_deadline = spawn_due.unwrap_or_else(Instant::now);

            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        // Handle dropped.
                        None => {
                            debug!("command channel closed, stopping session");
                            self.leave().await;
                            break;
                        }
                    }
                }

                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    self.leave().await;
                    emit_final(&self.event_tx, DuelEvent::Stopped).await;
                    break;
                }

                Some(outcome) = poll_rx.recv() => {
                    self.handle_poll(outcome).await;
                }

                _ = tokio::time::sleep_until(grace_deadline), if grace.is_some() => {
                    if let Some((_, token)) = grace {
                        self.on_grace_expired(token).await;
                    }
                }

                _ = tokio::time::sleep_until(spawn_deadline), if spawn_due.is_some() => {
                    self.pending_spawn = None;
                    self.spawn_objective();
                }
            }

            if self.session.phase().is_ended() {
                break;
            }
        }

        active.store(false, Ordering::Release);
        self.scheduler.stop_all();
        self.watchdog.disarm();

        // Let the writer flush the ABANDON / match result queued on the way out.
        let Self { writer_tx, .. } = self;
        drop(writer_tx);
        if let Err(e) = writer.await {
            warn!("record writer terminated with join error: {e}");
        }
        debug!("session driver exited");
    }

    fn begin(&mut self) {
        self.publish();
        self.scheduler.start_feed(Feed::ScoreUpdate);
        self.scheduler.start_feed(Feed::GameState);
        if self.session.is_authority() {
            self.scheduler.start_peer_join();
        } else {
            self.scheduler.start_feed(Feed::Spawn);
        }
    }

    // ── Local commands ──────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Tap { x, y } => {
                let radius = self.config.target_radius;
                let on_target = self
                    .session
                    .current_objective()
                    .is_some_and(|target| target.contains(x, y, radius));
                if on_target {
                    self.claim_hit();
                }
            }
            Command::ClaimHit => self.claim_hit(),
            Command::Pause => {
                if self.session.pause() {
                    self.queue(Outgoing::Record(EventBody::Pause));
                    self.emit(DuelEvent::Paused {
                        origin: Origin::Local,
                    });
                    self.publish();
                }
            }
            Command::Resume => {
                if self.session.was_paused_by_network() {
                    debug!("resume ignored while paused by the network");
                    return;
                }
                if self.session.resume() == ResumeOutcome::Resumed {
                    self.queue(Outgoing::Record(EventBody::Resume));
                    self.emit(DuelEvent::Resumed {
                        origin: Origin::Local,
                    });
                    self.publish();
                    self.recheck_connectivity();
                }
            }
            Command::Abandon => self.abandon().await,
            Command::Connectivity(false) => {
                if self
                    .watchdog
                    .connectivity_lost(&mut self.session, Instant::now())
                {
                    self.emit(DuelEvent::ConnectionLost);
                    self.publish();
                }
            }
            Command::Connectivity(true) => {
                if let Some(phase) = self.watchdog.connectivity_restored(&mut self.session) {
                    self.emit(DuelEvent::ConnectionRestored {
                        resumed: phase == SessionPhase::Running,
                    });
                    self.publish();
                }
            }
            Command::Resize(canvas) => {
                self.canvas = canvas;
                if self.spawn_on_layout && !canvas.is_empty() {
                    self.spawn_on_layout = false;
                    self.spawn_objective();
                }
            }
        }
    }

    /// An outage that began during a manual pause is only watched once play
    /// resumes.
    fn recheck_connectivity(&mut self) {
        if self.watchdog.is_reachable() {
            return;
        }
        if self
            .watchdog
            .connectivity_lost(&mut self.session, Instant::now())
        {
            self.emit(DuelEvent::ConnectionLost);
            self.publish();
        }
    }

    fn claim_hit(&mut self) {
        if let Some(hit) = arbiter::claim_hit(&mut self.session) {
            debug!(objective = %hit.objective_id, seat = %hit.player_id, "hit claimed");
            self.emit(DuelEvent::HitClaimed {
                objective_id: hit.objective_id.clone(),
            });
            self.queue(Outgoing::Record(EventBody::HitRequest(hit)));
        }
    }

    // ── Poll results ────────────────────────────────────────────────

    async fn handle_poll(&mut self, outcome: PollOutcome) {
        if !self.session.is_game_running() {
            return;
        }
        match outcome {
            PollOutcome::PeerJoined(room) => self.on_peer_joined(room),
            PollOutcome::Record { feed, record } => {
                if !self.session.cursors.observe(feed, record.as_ref()) {
                    return;
                }
                if let Some(record) = record {
                    self.on_record(feed, record).await;
                }
            }
        }
    }

    fn on_peer_joined(&mut self, room: Room) {
        if self.peer_joined || !self.session.is_authority() {
            return;
        }
        self.peer_joined = true;
        self.scheduler.stop_peer_join();
        self.session.player2_name = room.player2_name.clone();
        info!(room = %room.code, player2 = %room.player2_name, "second player joined");
        self.emit(DuelEvent::PeerJoined {
            player2_name: room.player2_name,
        });
        self.scheduler.start_feed(Feed::HitRequest);
        self.spawn_objective();
    }

    async fn on_record(&mut self, feed: Feed, record: GameEvent) {
        let body = match record.body() {
            Ok(body) => body,
            Err(e) => {
                warn!(%feed, id = %record.id, "skipping record: {e}");
                return;
            }
        };

        // Our own PAUSE / RESUME was applied when we issued it.
        let own = record.player_id.as_deref() == Some(self.player_id.as_str());

        match (feed, body) {
            (Feed::Spawn, EventBody::Spawn(spawn)) => {
                if self.session.is_authority() {
                    return;
                }
                if arbiter::apply_spawn(&mut self.session, &spawn) {
                    self.emit(DuelEvent::TargetSpawned {
                        objective_id: spawn.objective_id,
                        x: spawn.x,
                        y: spawn.y,
                    });
                    self.publish();
                }
            }
            (Feed::HitRequest, EventBody::HitRequest(hit)) => {
                match arbiter::arbitrate_hit(&mut self.session, &hit) {
                    Ok(Some(update)) => {
                        info!(
                            objective = %hit.objective_id,
                            seat = %hit.player_id,
                            p1 = update.p1_score,
                            p2 = update.p2_score,
                            "point awarded"
                        );
                        self.queue(Outgoing::Record(EventBody::ScoreUpdate(update)));
                    }
                    Ok(None) => {}
                    Err(e) => error!("refusing to arbitrate: {e}"),
                }
            }
            (Feed::ScoreUpdate, EventBody::ScoreUpdate(update)) => {
                self.on_score_update(update).await;
            }
            (Feed::GameState, EventBody::Pause) if !own => {
                if self.session.pause() {
                    self.emit(DuelEvent::Paused {
                        origin: Origin::Remote,
                    });
                    self.publish();
                }
            }
            (Feed::GameState, EventBody::Resume) if !own => match self.session.resume() {
                ResumeOutcome::Resumed => {
                    self.emit(DuelEvent::Resumed {
                        origin: Origin::Remote,
                    });
                    self.publish();
                    self.recheck_connectivity();
                }
                ResumeOutcome::RejectedNetworkPause => {
                    debug!("remote resume ignored while paused by the network");
                }
                ResumeOutcome::NotPaused => {}
            },
            (Feed::GameState, EventBody::Abandon(abandon)) => {
                self.end_match(EndReason::Abandoned(abandon.abandoning_player))
                    .await;
            }
            (Feed::GameState, EventBody::Pause | EventBody::Resume) => {}
            (feed, body) => {
                debug!(%feed, event_type = %body.event_type(), "unexpected record on feed");
            }
        }
    }

    async fn on_score_update(&mut self, update: ScoreUpdatePayload) {
        let ScoreApplication::Applied {
            scores,
            cleared,
            outcome,
        } = arbiter::apply_score_update(&mut self.session, update, self.config.winning_score)
        else {
            return;
        };

        self.emit(DuelEvent::ScoreChanged { scores });
        if let Some(target) = cleared {
            self.emit(DuelEvent::TargetCleared {
                objective_id: target.objective_id,
                x: target.x,
                y: target.y,
            });
        }
        self.publish();

        match outcome {
            ScoreOutcome::Won(seat) => self.end_match(EndReason::ScoreReached(seat)).await,
            ScoreOutcome::Continue { match_point } => {
                if let Some(seat) = match_point {
                    self.emit(DuelEvent::MatchPoint {
                        seat,
                        name: self.session.name_of(seat).to_string(),
                    });
                }
                if self.session.is_authority() {
                    self.pending_spawn = Some(Instant::now() + self.config.spawn_delay);
                }
            }
        }
    }

    // ── Spawning ────────────────────────────────────────────────────

    fn spawn_objective(&mut self) {
        match arbiter::spawn_target(&mut self.session, self.canvas, &mut self.rng) {
            Ok(Some(spawn)) => {
                debug!(objective = %spawn.objective_id, x = spawn.x, y = spawn.y, "target spawned");
                self.emit(DuelEvent::TargetSpawned {
                    objective_id: spawn.objective_id.clone(),
                    x: spawn.x,
                    y: spawn.y,
                });
                self.queue(Outgoing::Record(EventBody::Spawn(spawn)));
                self.publish();
            }
            Ok(None) => {
                if self.session.is_game_paused() {
                    self.pending_spawn = Some(Instant::now());
                } else if self.canvas.is_empty() {
                    debug!("canvas not laid out yet, spawn deferred");
                    self.spawn_on_layout = true;
                }
            }
            Err(e) => error!("refusing to spawn: {e}"),
        }
    }

    // ── Termination ─────────────────────────────────────────────────

    async fn abandon(&mut self) {
        if !self.session.is_game_running() {
            return;
        }
        let seat = self.session.seat();
        self.queue(Outgoing::Record(EventBody::Abandon(AbandonPayload {
            abandoning_player: seat,
        })));
        self.end_match(EndReason::Abandoned(seat)).await;
    }

    /// Teardown of the handle. Before player 2 joins there is no match to
    /// forfeit.
    async fn leave(&mut self) {
        if self.session.is_authority() && !self.peer_joined {
            return;
        }
        self.abandon().await;
    }

    async fn on_grace_expired(&mut self, token: TimerToken) {
        let Some(reason) = self.watchdog.grace_expired(&mut self.session, token) else {
            return;
        };
        self.queue(Outgoing::Record(EventBody::Abandon(AbandonPayload {
            abandoning_player: self.session.seat(),
        })));
        self.finish_match(reason).await;
    }

    async fn end_match(&mut self, reason: EndReason) {
        if self.session.end(reason) {
            self.finish_match(reason).await;
        }
    }

    /// Exit actions of the terminal phase. The session is already ended.
    async fn finish_match(&mut self, reason: EndReason) {
        self.pending_spawn = None;
        self.spawn_on_layout = false;
        self.watchdog.disarm();
        self.scheduler.stop_all();
        self.publish();

        let winner = reason.winner();
        let winner_name = self.session.name_of(winner).to_string();
        let scores = self.session.scores();
        info!(?reason, %winner, p1 = scores.player1, p2 = scores.player2, "match ended");

        if self.session.is_authority() {
            self.queue(Outgoing::MatchResult(MatchResult {
                player1_name: self.session.name_of(Seat::Player1).to_string(),
                player2_name: self.session.name_of(Seat::Player2).to_string(),
                player1_score: scores.player1,
                player2_score: scores.player2,
                winner_name: winner_name.clone(),
            }));
        }

        emit_final(
            &self.event_tx,
            DuelEvent::MatchEnded {
                reason,
                winner,
                winner_name,
                scores,
            },
        )
        .await;
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn queue(&self, outgoing: Outgoing) {
        if self.writer_tx.send(outgoing).is_err() {
            debug!("record writer gone, dropping write");
        }
    }

    fn emit(&self, event: DuelEvent) {
        emit_event(&self.event_tx, event);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.session.snapshot());
    }
}

// ── Record writer ───────────────────────────────────────────────────

/// Appends queued records in order. Failures are logged and reported, never
/// retried; the protocol treats them as a missed beat.
async fn record_writer(
    store: Arc<dyn EventStore>,
    room_code: String,
    player_id: PlayerId,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    event_tx: mpsc::Sender<DuelEvent>,
) {
    while let Some(outgoing) = rx.recv().await {
        match outgoing {
            Outgoing::Record(body) => {
                let event_type = body.event_type();
                let result = match body.to_payload() {
                    Ok(payload) => {
                        store
                            .append(&room_code, event_type, Some(player_id.as_str()), payload)
                            .await
                    }
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    warn!(room = %room_code, %event_type, "failed to append record: {e}");
                    emit_event(
                        &event_tx,
                        DuelEvent::WriteFailed {
                            event_type: Some(event_type),
                            reason: e.to_string(),
                        },
                    );
                }
            }
            Outgoing::MatchResult(result) => {
                if let Err(e) = store.save_match_result(result).await {
                    warn!(room = %room_code, "failed to save match result: {e}");
                    emit_event(
                        &event_tx,
                        DuelEvent::WriteFailed {
                            event_type: None,
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }
    }
    debug!(room = %room_code, "record writer exited");
}

/// Emit an event. If the channel is full, log a warning and drop the event
/// rather than stall the session.
fn emit_event(event_tx: &mpsc::Sender<DuelEvent>, event: DuelEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit an event that must not be dropped (`MatchEnded`, `Stopped`).
async fn emit_final(event_tx: &mpsc::Sender<DuelEvent>, event: DuelEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::EventType;
    use crate::stores::MemoryStore;

    const CANVAS: CanvasSize = CanvasSize {
        width: 1000.0,
        height: 1000.0,
    };

    async fn ready_room(store: &MemoryStore) -> Room {
        let mut room = Room::waiting("AB12", "dev-1", "Ana");
        room.player2_id = "dev-2".into();
        room.player2_name = "Bo".into();
        room.status = crate::protocol::RoomStatus::Ready;
        store.create_room(room.clone()).await.unwrap();
        room
    }

    async fn next_matching(
        events: &mut mpsc::Receiver<DuelEvent>,
        mut pred: impl FnMut(&DuelEvent) -> bool,
    ) -> DuelEvent {
        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                let ev = events.recv().await.expect("event channel closed");
                if pred(&ev) {
                    return ev;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    #[test]
    fn config_defaults() {
        let config = DuelConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.peer_join_interval, Duration::from_secs(2));
        assert_eq!(config.spawn_delay, Duration::from_millis(500));
        assert_eq!(config.grace_period, Duration::from_secs(15));
        assert_eq!(config.winning_score, 10);
        assert_eq!(config.event_channel_capacity, 256);
        assert!(config.rng_seed.is_none());
    }

    #[test]
    fn config_clamps_degenerate_values() {
        let config = DuelConfig::default()
            .with_event_channel_capacity(0)
            .with_winning_score(0);
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.winning_score, 1);
    }

    #[test]
    fn guest_params_use_player2_identity() {
        let mut room = Room::waiting("AB12", "dev-1", "Ana");
        room.player2_id = "dev-2".into();
        room.player2_name = "Bo".into();
        let params = SessionParams::guest(&room, CANVAS);
        assert_eq!(params.seat, Seat::Player2);
        assert_eq!(params.player_id, "dev-2");
        assert_eq!(params.player2_name, "Bo");
    }

    #[tokio::test(start_paused = true)]
    async fn host_spawns_once_peer_has_joined() {
        let store = Arc::new(MemoryStore::new());
        let room = ready_room(&store).await;
        let (mut client, mut events) = DuelClient::start(
            store.clone(),
            DuelConfig::default().with_rng_seed(1),
            SessionParams::host(&room, CANVAS),
        );

        let joined = next_matching(&mut events, |e| matches!(e, DuelEvent::PeerJoined { .. })).await;
        assert_eq!(
            joined,
            DuelEvent::PeerJoined {
                player2_name: "Bo".into()
            }
        );
        next_matching(&mut events, |e| matches!(e, DuelEvent::TargetSpawned { .. })).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let spawns = store.events_of("AB12", EventType::Spawn);
        assert_eq!(spawns.len(), 1);
        assert_eq!(spawns[0].player_id.as_deref(), Some("dev-1"));
        assert!(client.snapshot().objective.is_some());

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn host_defers_first_spawn_until_layout() {
        let store = Arc::new(MemoryStore::new());
        let room = ready_room(&store).await;
        let (mut client, mut events) = DuelClient::start(
            store.clone(),
            DuelConfig::default(),
            SessionParams::host(&room, CanvasSize::default()),
        );

        next_matching(&mut events, |e| matches!(e, DuelEvent::PeerJoined { .. })).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.events_of("AB12", EventType::Spawn).is_empty());

        client.resize(CANVAS).unwrap();
        next_matching(&mut events, |e| matches!(e, DuelEvent::TargetSpawned { .. })).await;

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn tap_outside_target_does_not_claim() {
        let store = Arc::new(MemoryStore::new());
        let room = ready_room(&store).await;
        let (mut client, mut events) = DuelClient::start(
            store.clone(),
            DuelConfig::default().with_rng_seed(9),
            SessionParams::host(&room, CANVAS),
        );
        let DuelEvent::TargetSpawned { x, y, .. } =
            next_matching(&mut events, |e| matches!(e, DuelEvent::TargetSpawned { .. })).await
        else {
            unreachable!()
        };

        client.tap(x + 500.0, y + 500.0).unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(store.events_of("AB12", EventType::HitRequest).is_empty());

        client.tap(x + 10.0, y - 10.0).unwrap();
        next_matching(&mut events, |e| matches!(e, DuelEvent::HitClaimed { .. })).await;

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_emits_stopped_and_closes() {
        let store = Arc::new(MemoryStore::new());
        let room = ready_room(&store).await;
        let (mut client, mut events) = DuelClient::start(
            store,
            DuelConfig::default(),
            SessionParams::guest(&room, CANVAS),
        );

        client.shutdown().await;
        assert!(!client.is_active());
        assert!(matches!(client.pause(), Err(DuelError::SessionClosed)));

        let mut saw_stopped = false;
        while let Some(ev) = events.recv().await {
            saw_stopped |= ev == DuelEvent::Stopped;
        }
        assert!(saw_stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn abandon_ends_and_closes_the_handle() {
        let store = Arc::new(MemoryStore::new());
        let room = ready_room(&store).await;
        let (client, mut events) = DuelClient::start(
            store.clone(),
            DuelConfig::default(),
            SessionParams::guest(&room, CANVAS),
        );

        client.abandon().unwrap();
        let ended = next_matching(&mut events, |e| matches!(e, DuelEvent::MatchEnded { .. })).await;
        let DuelEvent::MatchEnded {
            reason,
            winner,
            winner_name,
            ..
        } = ended
        else {
            unreachable!()
        };
        assert_eq!(reason, EndReason::Abandoned(Seat::Player2));
        assert_eq!(winner, Seat::Player1);
        assert_eq!(winner_name, "Ana");

        while events.recv().await.is_some() {}
        assert!(!client.is_active());
        assert_eq!(client.snapshot().phase, SessionPhase::Ended);
        assert_eq!(store.events_of("AB12", EventType::Abandon).len(), 1);
        // Only the authority persists results.
        assert!(store.list_match_results().await.unwrap().is_empty());
        assert!(matches!(client.abandon(), Err(DuelError::SessionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn full_event_channel_does_not_stall_the_session() {
        let store = Arc::new(MemoryStore::new());
        let room = ready_room(&store).await;
        let (mut client, _events) = DuelClient::start(
            store.clone(),
            DuelConfig::default().with_event_channel_capacity(1),
            SessionParams::host(&room, CANVAS),
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.events_of("AB12", EventType::Spawn).len(), 1);

        client.claim_hit().unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.events_of("AB12", EventType::ScoreUpdate).len(), 1);
        assert_eq!(client.snapshot().scores.player1, 1);

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn double_shutdown_does_not_panic() {
        let store = Arc::new(MemoryStore::new());
        let room = ready_room(&store).await;
        let (mut client, _events) = DuelClient::start(
            store,
            DuelConfig::default(),
            SessionParams::guest(&room, CANVAS),
        );
        client.shutdown().await;
        client.shutdown().await;
        assert!(!client.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_without_explicit_shutdown_closes_events() {
        let store = Arc::new(MemoryStore::new());
        let room = ready_room(&store).await;
        let (client, mut events) = DuelClient::start(
            store.clone(),
            DuelConfig::default(),
            SessionParams::guest(&room, CANVAS),
        );
        drop(client);
        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            let mut seen = Vec::new();
            while let Some(ev) = events.recv().await {
                seen.push(ev);
            }
            seen
        })
        .await
        .expect("event channel never closed");

        assert_eq!(seen.last(), Some(&DuelEvent::Stopped));
        assert!(seen.iter().any(|e| matches!(
            e,
            DuelEvent::MatchEnded {
                reason: EndReason::Abandoned(Seat::Player2),
                ..
            }
        )));
        assert_eq!(store.events_of("AB12", EventType::Abandon).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn host_without_opponent_stops_without_abandoning() {
        let store = Arc::new(MemoryStore::new());
        let room = Room::waiting("AB12", "dev-1", "Ana");
        store.create_room(room.clone()).await.unwrap();
        let (mut client, mut events) = DuelClient::start(
            store.clone(),
            DuelConfig::default(),
            SessionParams::host(&room, CANVAS),
        );

        tokio::time::sleep(Duration::from_secs(3)).await;
        client.shutdown().await;

        let mut seen = Vec::new();
        while let Some(ev) = events.recv().await {
            seen.push(ev);
        }
        assert_eq!(seen, vec![DuelEvent::Stopped]);
        assert!(store.events_of("AB12", EventType::Abandon).is_empty());
        assert!(store.list_match_results().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let store = Arc::new(MemoryStore::new());
        let room = Room::waiting("AB12", "dev-1", "Ana");
        let (mut client, _events) = DuelClient::start(
            store,
            DuelConfig::default(),
            SessionParams::host(&room, CANVAS),
        );
        let debug = format!("{client:?}");
        assert!(debug.contains("DuelClient"));
        assert!(debug.contains("AB12"));
        assert!(debug.contains("Player1"));
        client.shutdown().await;
    }
}
