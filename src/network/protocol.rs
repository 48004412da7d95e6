//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object `{"event": <name>, "payload": {...}}` with
//! camelCase payload fields. Hit requests may also arrive as bincode binary
//! frames, since they are the only high-rate client message.

use serde::{Serialize, Deserialize};

use crate::config::catalog::{GameModeId, MoleType};
use crate::game::arbiter::HitRequest;
use crate::game::events::{DespawnReason, GameEvent};
use crate::game::ids::{MatchId, Millis, MoleId, PlayerId};
use crate::game::phase::MatchPhase;
use crate::game::score::PlayerScore;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ClientMessage {
    /// Create a match and join it as host.
    #[serde(rename = "match.create")]
    CreateMatch(CreateMatchRequest),

    /// Join an existing match.
    #[serde(rename = "match.join")]
    JoinMatch(MatchRef),

    /// Start a match (Waiting -> InProgress).
    #[serde(rename = "match.start")]
    StartMatch(MatchRef),

    /// Abort a match.
    #[serde(rename = "match.abort")]
    AbortMatch(MatchRef),

    /// Attempt to hit a mole.
    #[serde(rename = "mole.hit")]
    MoleHit(MoleHitRequest),
}

/// `match.create` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchRequest {
    /// Mode to play
    pub mode: GameModeId,
}

/// Payload naming a single match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRef {
    /// Target match
    pub match_id: MatchId,
}

/// `mole.hit` request payload.
///
/// Flat, so it also travels as a bincode binary frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoleHitRequest {
    /// Target mole
    pub mole_id: MoleId,
    /// Match the mole belongs to
    pub match_id: MatchId,
    /// Requesting player
    pub player_id: PlayerId,
}

impl MoleHitRequest {
    /// Encode as a binary frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode a binary frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl From<MoleHitRequest> for HitRequest {
    fn from(request: MoleHitRequest) -> Self {
        HitRequest {
            mole_id: request.mole_id,
            match_id: request.match_id,
            player_id: request.player_id,
        }
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerMessage {
    /// A mole appeared.
    #[serde(rename = "mole.spawned")]
    MoleSpawned(MoleSpawnedPayload),

    /// A mole left the board.
    #[serde(rename = "mole.despawned")]
    MoleDespawned(MoleDespawnedPayload),

    /// A hit was confirmed.
    #[serde(rename = "mole.hit")]
    MoleHit(MoleHitBroadcast),

    /// Full score snapshot.
    #[serde(rename = "score.update")]
    ScoreUpdate(ScoreUpdatePayload),

    /// Phase / countdown update.
    #[serde(rename = "match.state_update")]
    StateUpdate(MatchStateUpdatePayload),

    /// Connection accepted; carries the id the server assigned.
    #[serde(rename = "session.welcome")]
    Welcome(WelcomePayload),

    /// The connection is now subscribed to a match.
    #[serde(rename = "match.joined")]
    MatchJoined(MatchJoinedPayload),

    /// Request refused.
    #[serde(rename = "error")]
    Error(ServerError),
}

/// `mole.spawned` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoleSpawnedPayload {
    /// Mole identifier
    pub mole_id: MoleId,
    /// Match identifier
    pub match_id: MatchId,
    /// Hole the mole occupies
    pub hole_index: u8,
    /// Mole type
    #[serde(rename = "type")]
    pub mole_type: MoleType,
    /// Epoch milliseconds
    pub spawned_at: Millis,
    /// Epoch milliseconds
    pub despawns_at: Millis,
}

/// `mole.despawned` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoleDespawnedPayload {
    /// Mole identifier
    pub mole_id: MoleId,
    /// Match identifier
    pub match_id: MatchId,
    /// `hit` or `timeout`
    pub reason: DespawnReason,
}

/// `mole.hit` broadcast payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoleHitBroadcast {
    /// Mole identifier
    pub mole_id: MoleId,
    /// Match identifier
    pub match_id: MatchId,
    /// Player identifier
    pub player_id: PlayerId,
    /// Points applied
    pub points_delta: i32,
}

/// `score.update` payload. Always the full table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdatePayload {
    /// Match identifier
    pub match_id: MatchId,
    /// Every player's total
    pub scores: Vec<PlayerScore>,
}

/// `match.state_update` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchStateUpdatePayload {
    /// Match identifier
    pub match_id: MatchId,
    /// Current phase
    pub phase: MatchPhase,
    /// `null` for untimed modes
    pub remaining_time_seconds: Option<u32>,
}

/// `session.welcome` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    /// Player identifier
    pub player_id: PlayerId,
    /// Server version
    pub server_version: String,
}

/// `match.joined` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchJoinedPayload {
    /// Match identifier
    pub match_id: MatchId,
    /// Mode being played
    pub mode: GameModeId,
}

/// Error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be parsed
    InvalidMessage,
    /// No such match
    MatchNotFound,
    /// Connection has not joined the match
    NotInMatch,
    /// `playerId` does not belong to this connection
    PlayerMismatch,
    /// Match is in the wrong phase for the request
    InvalidTransition,
    /// Match configuration was rejected at start
    ConfigRejected,
    /// Internal error
    InternalError,
}

impl ServerMessage {
    /// Wrap a game event for the wire.
    pub fn from_game_event(match_id: MatchId, event: &GameEvent) -> Self {
        match event {
            GameEvent::MoleSpawned { mole_id, hole_index, mole_type, spawned_at, despawns_at } => {
                ServerMessage::MoleSpawned(MoleSpawnedPayload {
                    mole_id: *mole_id,
                    match_id,
                    hole_index: *hole_index,
                    mole_type: *mole_type,
                    spawned_at: *spawned_at,
                    despawns_at: *despawns_at,
                })
            }
            GameEvent::MoleDespawned { mole_id, reason } => {
                ServerMessage::MoleDespawned(MoleDespawnedPayload {
                    mole_id: *mole_id,
                    match_id,
                    reason: *reason,
                })
            }
            GameEvent::MoleHit { mole_id, player_id, points_delta } => {
                ServerMessage::MoleHit(MoleHitBroadcast {
                    mole_id: *mole_id,
                    match_id,
                    player_id: player_id.clone(),
                    points_delta: *points_delta,
                })
            }
            GameEvent::ScoreUpdated { scores } => ServerMessage::ScoreUpdate(ScoreUpdatePayload {
                match_id,
                scores: scores.clone(),
            }),
            GameEvent::StateUpdated { phase, remaining_time_seconds } => {
                ServerMessage::StateUpdate(MatchStateUpdatePayload {
                    match_id,
                    phase: *phase,
                    remaining_time_seconds: *remaining_time_seconds,
                })
            }
        }
    }

    /// Build an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError {
            code,
            message: message.into(),
        })
    }

    /// Event name on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::MoleSpawned(_) => "mole.spawned",
            ServerMessage::MoleDespawned(_) => "mole.despawned",
            ServerMessage::MoleHit(_) => "mole.hit",
            ServerMessage::ScoreUpdate(_) => "score.update",
            ServerMessage::StateUpdate(_) => "match.state_update",
            ServerMessage::Welcome(_) => "session.welcome",
            ServerMessage::MatchJoined(_) => "match.joined",
            ServerMessage::Error(_) => "error",
        }
    }

    /// Match this message belongs to, if any.
    pub fn match_id(&self) -> Option<MatchId> {
        match self {
            ServerMessage::MoleSpawned(p) => Some(p.match_id),
            ServerMessage::MoleDespawned(p) => Some(p.match_id),
            ServerMessage::MoleHit(p) => Some(p.match_id),
            ServerMessage::ScoreUpdate(p) => Some(p.match_id),
            ServerMessage::StateUpdate(p) => Some(p.match_id),
            ServerMessage::MatchJoined(p) => Some(p.match_id),
            ServerMessage::Welcome(_) | ServerMessage::Error(_) => None,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
