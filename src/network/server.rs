//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Assigns each connection a player id, routes lifecycle and hit messages to
//! match sessions, and forwards each joined match's broadcast to the socket.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::config::catalog::{ConfigCatalog, ConfigError};
use crate::config::settings::MatchSettings;
use crate::game::ids::{MatchId, PlayerId};
use crate::game::phase::MatchError;
use crate::network::protocol::{
    ClientMessage, ErrorCode, MatchJoinedPayload, MoleHitRequest, ServerMessage, WelcomePayload,
};
use crate::network::session::{SessionConfig, SessionError, SessionHandle, SessionManager};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Per-session settings
    pub session: SessionConfig,
    /// Optional JSON catalog replacing the built-in tables
    pub catalog_path: Option<PathBuf>,
    /// Server version
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            session: SessionConfig::default(),
            catalog_path: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    ///
    /// - `MOLE_BIND_ADDR`
    /// - `MOLE_MAX_CONNECTIONS`
    /// - `MOLE_TICK_MS`
    /// - `MOLE_SEED_SALT`
    /// - `MOLE_CATALOG_PATH`
    /// - `MOLE_WAITING_TIMEOUT_SECS`, `MOLE_IDLE_TIMEOUT_SECS`
    /// - plus the match settings read by [`MatchSettings::from_env`]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = std::env::var("MOLE_BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.bind_addr);

        let max_connections = std::env::var("MOLE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_connections);

        let tick_interval = std::env::var("MOLE_TICK_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(defaults.session.tick_interval);

        let seed_salt = std::env::var("MOLE_SEED_SALT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.session.seed_salt);

        let secs = |key: &str, default: Duration| {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        let waiting_timeout = secs("MOLE_WAITING_TIMEOUT_SECS", defaults.session.waiting_timeout);
        let idle_timeout = secs("MOLE_IDLE_TIMEOUT_SECS", defaults.session.idle_timeout);

        Self {
            bind_addr,
            max_connections,
            session: SessionConfig {
                tick_interval,
                seed_salt,
                waiting_timeout,
                idle_timeout,
                match_settings: MatchSettings::from_env(),
                ..defaults.session
            },
            catalog_path: std::env::var("MOLE_CATALOG_PATH").ok().map(PathBuf::from),
            version: defaults.version,
        }
    }

    /// Load the configured catalog, or the built-in one.
    pub fn load_catalog(&self) -> Result<Arc<ConfigCatalog>, ConfigError> {
        self.session.match_settings.validate()?;
        match &self.catalog_path {
            Some(path) => Ok(Arc::new(ConfigCatalog::load(path)?)),
            None => Ok(ConfigCatalog::builtin()),
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Configuration rejected at startup.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Connected client bookkeeping.
struct ConnectedClient {
    player_id: PlayerId,
    connected_at: Instant,
}

/// Per-connection state owned by the connection task.
struct Connection {
    addr: SocketAddr,
    player_id: PlayerId,
    sender: mpsc::Sender<ServerMessage>,
    /// Forwarding task per joined match
    subscriptions: BTreeMap<MatchId, JoinHandle<()>>,
}

impl Connection {
    async fn send(&self, message: ServerMessage) {
        let _ = self.sender.send(message).await;
    }

    async fn send_error(&self, code: ErrorCode, message: impl Into<String>) {
        self.send(ServerMessage::error(code, message)).await;
    }

    fn close(&mut self) {
        for (_, task) in std::mem::take(&mut self.subscriptions) {
            task.abort();
        }
    }
}

/// The game server.
pub struct GameServer {
    config: ServerConfig,
    sessions: Arc<SessionManager>,
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig, catalog: Arc<ConfigCatalog>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let sessions = SessionManager::new(catalog, config.session.clone());

        Self {
            config,
            sessions: Arc::new(sessions),
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Game server listening on {}", self.config.bind_addr);

        let cleanup_sessions = self.sessions.clone();
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_sessions).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();

        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let sessions = self.sessions.clone();
        let version = self.config.version.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(256);

            let player_id = PlayerId::new_v4();
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    player_id: player_id.clone(),
                    connected_at: Instant::now(),
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let mut conn = Connection {
                addr,
                player_id: player_id.clone(),
                sender: msg_tx,
                subscriptions: BTreeMap::new(),
            };

            conn.send(ServerMessage::Welcome(WelcomePayload {
                player_id,
                server_version: version,
            }))
            .await;

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        Self::handle_client_message(&mut conn, client_msg, &sessions).await;
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        conn.send_error(ErrorCode::InvalidMessage, "Invalid message format").await;
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(data))) => {
                                // Binary frames carry only hit requests
                                match MoleHitRequest::from_bytes(&data) {
                                    Ok(request) => {
                                        Self::handle_client_message(&mut conn, ClientMessage::MoleHit(request), &sessions).await;
                                    }
                                    Err(e) => {
                                        debug!("Invalid binary frame from {}: {}", addr, e);
                                        conn.send_error(ErrorCode::InvalidMessage, "Invalid binary frame").await;
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            // Cleanup
            conn.close();
            drop(conn);
            sender_task.abort();

            let removed = clients.write().await.remove(&addr);
            if let Some(client) = removed {
                info!(
                    player_id = %client.player_id,
                    connected_secs = client.connected_at.elapsed().as_secs(),
                    "Client {} cleaned up",
                    addr
                );
            }
        });
    }

    async fn handle_client_message(
        conn: &mut Connection,
        msg: ClientMessage,
        sessions: &SessionManager,
    ) {
        match msg {
            ClientMessage::CreateMatch(req) => {
                let handle = sessions.create_session(req.mode).await;
                Self::join(conn, handle).await;
            }
            ClientMessage::JoinMatch(req) => match sessions.get_session(&req.match_id).await {
                Ok(handle) => Self::join(conn, handle).await,
                Err(e) => Self::report(conn, &e).await,
            },
            ClientMessage::StartMatch(req) => {
                if !Self::require_joined(conn, req.match_id).await {
                    return;
                }
                let result = match sessions.get_session(&req.match_id).await {
                    Ok(handle) => handle.start().await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => info!(match_id = %req.match_id, player_id = %conn.player_id, "match start requested"),
                    Err(e) => Self::report(conn, &e).await,
                }
            }
            ClientMessage::AbortMatch(req) => {
                if !Self::require_joined(conn, req.match_id).await {
                    return;
                }
                let result = match sessions.get_session(&req.match_id).await {
                    Ok(handle) => handle.abort().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    Self::report(conn, &e).await;
                }
            }
            ClientMessage::MoleHit(request) => {
                if request.player_id != conn.player_id {
                    conn.send_error(ErrorCode::PlayerMismatch, "playerId does not match this connection").await;
                    return;
                }
                // Hits for matches this connection is not in are dropped silently.
                let Ok(handle) = Self::joined_session(conn, request.match_id, sessions).await else {
                    debug!(match_id = %request.match_id, addr = %conn.addr, "hit for unjoined match dropped");
                    return;
                };
                if let Err(e) = handle.submit_hit(request.into()).await {
                    debug!("hit not delivered: {}", e);
                }
            }
        }
    }

    /// Subscribe the connection to a match and send it a resync snapshot.
    async fn join(conn: &mut Connection, handle: SessionHandle) {
        let match_id = handle.match_id();
        if let Some(previous) = conn.subscriptions.remove(&match_id) {
            previous.abort();
        }

        // Subscribe before taking the snapshot so nothing falls in between.
        let mut rx = handle.subscribe();
        let snapshot = match handle.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                Self::report(conn, &e).await;
                return;
            }
        };

        conn.send(ServerMessage::MatchJoined(MatchJoinedPayload {
            match_id,
            mode: handle.mode(),
        }))
        .await;
        for message in snapshot.messages {
            conn.send(message).await;
        }

        let sender = conn.sender.clone();
        let forward = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if sender.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed events are recovered from full snapshots.
                        warn!(%match_id, skipped, "subscriber lagged, resyncing");
                        let Ok(snapshot) = handle.snapshot().await else { break };
                        for message in snapshot.messages {
                            if sender.send(message).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        conn.subscriptions.insert(match_id, forward);

        debug!(%match_id, player_id = %conn.player_id, "joined match");
    }

    async fn require_joined(conn: &Connection, match_id: MatchId) -> bool {
        let joined = conn.subscriptions.contains_key(&match_id);
        if !joined {
            conn.send_error(ErrorCode::NotInMatch, format!("not in match {}", match_id)).await;
        }
        joined
    }

    async fn joined_session(
        conn: &Connection,
        match_id: MatchId,
        sessions: &SessionManager,
    ) -> Result<SessionHandle, SessionError> {
        if !conn.subscriptions.contains_key(&match_id) {
            return Err(SessionError::MatchNotFound(match_id));
        }
        sessions.get_session(&match_id).await
    }

    async fn report(conn: &Connection, err: &SessionError) {
        let code = match err {
            SessionError::MatchNotFound(_) => ErrorCode::MatchNotFound,
            SessionError::SessionClosed(_) => ErrorCode::MatchNotFound,
            SessionError::Match(MatchError::InvalidTransition { .. }) => ErrorCode::InvalidTransition,
            SessionError::Match(MatchError::Config(_)) => ErrorCode::ConfigRejected,
        };
        conn.send_error(code, err.to_string()).await;
    }

    async fn run_cleanup_loop(sessions: Arc<SessionManager>) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            let removed = sessions.cleanup().await;
            if removed > 0 {
                info!("Removed {} closed sessions", removed);
            }
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get connected client count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.session_count().await
    }
}
