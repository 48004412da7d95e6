//! Network Layer
//!
//! WebSocket server for real-time multiplayer communication.
//! This layer is **non-deterministic** (wall clock, socket timing); all match
//! rules run through `game/`.

pub mod protocol;
pub mod session;
pub mod server;

pub use protocol::{
    ClientMessage, ServerMessage, ErrorCode, MoleHitRequest, MoleHitBroadcast,
    MoleSpawnedPayload, MoleDespawnedPayload, ScoreUpdatePayload, MatchStateUpdatePayload,
};
pub use session::{
    Clock, MatchSession, SessionConfig, SessionError, SessionHandle, SessionManager,
    SessionSnapshot, SystemClock,
};
pub use server::{GameServer, ServerConfig, GameServerError};
