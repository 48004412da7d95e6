//! Match Session Management
//!
//! One tokio task per match owns the `MatchState` outright. Everything that
//! touches a match (hits, start, abort, snapshots) is a command on that
//! task's mpsc queue, so the order commands arrive in is the order the match
//! sees them. Outgoing protocol messages fan out over a broadcast channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::catalog::{ConfigCatalog, GameModeId};
use crate::config::settings::MatchSettings;
use crate::core::rng::derive_match_seed;
use crate::game::arbiter::HitRequest;
use crate::game::events::GameEvent;
use crate::game::ids::{MatchId, Millis};
use crate::game::phase::{MatchError, MatchPhase};
use crate::game::state::{MatchState, MatchSummary};
use crate::network::protocol::ServerMessage;

// =============================================================================
// CLOCK
// =============================================================================

/// Millisecond clock driving match time.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_ms(&self) -> Millis;
}

/// Wall clock (Unix epoch milliseconds).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Configuration shared by every session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Tick period
    pub tick_interval: Duration,
    /// Command queue depth per match
    pub command_capacity: usize,
    /// Broadcast buffer per match; slow subscribers lag past this
    pub broadcast_capacity: usize,
    /// Board and arrival settings for new matches
    pub match_settings: MatchSettings,
    /// Mixed into every match seed
    pub seed_salt: u64,
    /// How long a finished session keeps answering snapshots
    pub linger: Duration,
    /// A match still waiting this long after creation is aborted
    pub waiting_timeout: Duration,
    /// A started match with no commands for this long is aborted
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            command_capacity: 1024,
            broadcast_capacity: 256,
            match_settings: MatchSettings::default(),
            seed_salt: 0,
            linger: Duration::from_secs(5),
            waiting_timeout: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Commands accepted by a session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Queue a hit for the next tick.
    SubmitHit {
        /// The request
        request: HitRequest,
        /// When the server received it
        received_at: Millis,
    },
    /// Start the match.
    Start {
        /// Result of the transition
        reply: oneshot::Sender<Result<(), MatchError>>,
    },
    /// Abort the match.
    Abort {
        /// Acknowledgement
        reply: oneshot::Sender<()>,
    },
    /// Read the current state.
    Snapshot {
        /// Snapshot
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Resync data for a client that just joined, plus the running summary.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// `match.state_update` then `score.update`
    pub messages: Vec<ServerMessage>,
    /// Running summary
    pub summary: MatchSummary,
}

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session for this id.
    #[error("match {0} not found")]
    MatchNotFound(MatchId),

    /// The session task has exited.
    #[error("session for match {0} is closed")]
    SessionClosed(MatchId),

    /// The match refused the operation.
    #[error("match error: {0}")]
    Match(#[from] MatchError),
}

// =============================================================================
// SESSION TASK
// =============================================================================

/// The task that owns one match.
pub struct MatchSession {
    state: MatchState,
    commands: mpsc::Receiver<SessionCommand>,
    outbound: broadcast::Sender<ServerMessage>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    linger: Duration,
    waiting_timeout: Millis,
    idle_timeout: Millis,
    created_at: Millis,
    /// Last start, hit or snapshot
    last_activity: Millis,
}

fn duration_ms(duration: Duration) -> Millis {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl MatchSession {
    /// Run until the match finishes, is abandoned or every handle is dropped,
    /// then linger.
    pub async fn run(mut self) {
        let match_id = self.state.id();
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = self.clock.now_ms();
                    let result = self.state.tick(now);
                    self.publish(&result.events);
                    if result.match_ended {
                        break;
                    }
                    if self.abandoned(now) {
                        let events = self.state.abort(now);
                        self.publish(&events);
                        break;
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => {
                            debug!(%match_id, "all handles dropped, aborting");
                            let events = self.state.abort(self.clock.now_ms());
                            self.publish(&events);
                            return;
                        }
                    }
                    if self.state.is_finished() {
                        break;
                    }
                }
            }
        }

        let summary = self.state.summary();
        info!(
            %match_id,
            reason = ?summary.finish_reason,
            players = summary.standings.len(),
            "session finished"
        );

        // Finished: keep answering snapshots for late joiners, then close.
        let linger = tokio::time::sleep(self.linger);
        tokio::pin!(linger);
        loop {
            tokio::select! {
                _ = &mut linger => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        debug!(%match_id, "session closed");
    }

    /// Whether the match sat in `Waiting` or went idle for too long.
    fn abandoned(&self, now: Millis) -> bool {
        let match_id = self.state.id();
        match self.state.phase() {
            MatchPhase::Waiting if now.saturating_sub(self.created_at) >= self.waiting_timeout => {
                info!(%match_id, "never started, aborting");
                true
            }
            MatchPhase::InProgress if now.saturating_sub(self.last_activity) >= self.idle_timeout => {
                info!(%match_id, "idle, aborting");
                true
            }
            _ => false,
        }
    }

    fn handle(&mut self, command: SessionCommand) {
        let now = self.clock.now_ms();
        self.last_activity = now;

        match command {
            SessionCommand::SubmitHit { request, received_at } => {
                if self.state.is_finished() {
                    debug!(match_id = %self.state.id(), mole_id = %request.mole_id, "hit after finish ignored");
                    return;
                }
                self.state.enqueue_hit(request, received_at);
            }
            SessionCommand::Start { reply } => {
                let result = self.state.start(now).map(|events| self.publish(&events));
                if let Err(e) = &result {
                    warn!(match_id = %self.state.id(), "start refused: {}", e);
                }
                let _ = reply.send(result);
            }
            SessionCommand::Abort { reply } => {
                let events = self.state.abort(now);
                self.publish(&events);
                let _ = reply.send(());
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let match_id = self.state.id();
        SessionSnapshot {
            messages: vec![
                ServerMessage::from_game_event(match_id, &self.state.state_update()),
                ServerMessage::from_game_event(match_id, &self.state.score_update()),
            ],
            summary: self.state.summary(),
        }
    }

    fn publish(&self, events: &[GameEvent]) {
        let match_id = self.state.id();
        for event in events {
            #[cfg(feature = "debug-tracing")]
            tracing::trace!(%match_id, event = event.name(), ?event, "publish");

            // No subscribers is fine; the events are simply dropped.
            let _ = self.outbound.send(ServerMessage::from_game_event(match_id, event));
        }
    }
}

// =============================================================================
// SESSION HANDLE
// =============================================================================

/// Cheap, cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    match_id: MatchId,
    mode: GameModeId,
    commands: mpsc::Sender<SessionCommand>,
    outbound: broadcast::Sender<ServerMessage>,
    clock: Arc<dyn Clock>,
}

impl SessionHandle {
    /// Match identifier.
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Mode being played.
    pub fn mode(&self) -> GameModeId {
        self.mode
    }

    /// Subscribe to this match's outgoing messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.outbound.subscribe()
    }

    /// Whether the session task has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Queue a hit, stamped with the current time.
    pub async fn submit_hit(&self, request: HitRequest) -> Result<(), SessionError> {
        let received_at = self.clock.now_ms();
        self.send(SessionCommand::SubmitHit { request, received_at }).await
    }

    /// Start the match.
    pub async fn start(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Start { reply }).await?;
        rx.await.map_err(|_| SessionError::SessionClosed(self.match_id))??;
        Ok(())
    }

    /// Abort the match. Aborting a finished match is a no-op.
    pub async fn abort(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Abort { reply }).await?;
        rx.await.map_err(|_| SessionError::SessionClosed(self.match_id))
    }

    /// Current resync messages and summary.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| SessionError::SessionClosed(self.match_id))
    }

    async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::SessionClosed(self.match_id))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("match_id", &self.match_id)
            .field("mode", &self.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Manages all match sessions.
pub struct SessionManager {
    sessions: RwLock<BTreeMap<MatchId, SessionHandle>>,
    catalog: Arc<ConfigCatalog>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    /// Create a manager using the wall clock.
    pub fn new(catalog: Arc<ConfigCatalog>, config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            catalog,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create a match in `Waiting` and spawn its task.
    pub async fn create_session(&self, mode: GameModeId) -> SessionHandle {
        let match_id = MatchId::new_v4();
        let seed = derive_match_seed(match_id.as_bytes(), self.config.seed_salt);
        let state = MatchState::new(
            match_id,
            mode,
            self.catalog.clone(),
            &self.config.match_settings,
            seed,
        );

        let (command_tx, command_rx) = mpsc::channel(self.config.command_capacity);
        let (outbound, _) = broadcast::channel(self.config.broadcast_capacity);

        let now = self.clock.now_ms();
        let session = MatchSession {
            state,
            commands: command_rx,
            outbound: outbound.clone(),
            clock: self.clock.clone(),
            tick_interval: self.config.tick_interval,
            linger: self.config.linger,
            waiting_timeout: duration_ms(self.config.waiting_timeout),
            idle_timeout: duration_ms(self.config.idle_timeout),
            created_at: now,
            last_activity: now,
        };
        tokio::spawn(session.run());

        let handle = SessionHandle {
            match_id,
            mode,
            commands: command_tx,
            outbound,
            clock: self.clock.clone(),
        };

        self.sessions.write().await.insert(match_id, handle.clone());
        info!(%match_id, %mode, "session created");

        handle
    }

    /// Look up a session.
    pub async fn get_session(&self, id: &MatchId) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(SessionError::MatchNotFound(*id))
    }

    /// Forget a session. Its task keeps running until it finishes on its own.
    pub async fn remove_session(&self, id: &MatchId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Number of tracked sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions whose task has exited. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, handle| !handle.is_closed());
        before - sessions.len()
    }

    /// The catalog new matches are created from.
    pub fn catalog(&self) -> &Arc<ConfigCatalog> {
        &self.catalog
    }
}
