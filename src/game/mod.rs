//! Game Logic Module
//!
//! The per-match core. Deterministic given a seed and a hit queue; no I/O.
//!
//! ## Module Structure
//!
//! - `ids`: Match, player and mole identifiers
//! - `mole`: Moles and the hole board
//! - `scheduler`: Spawn timing, hole and type selection, timeouts
//! - `arbiter`: First-hit-wins validation
//! - `score`: Per-player totals and snapshots
//! - `phase`: Match phase machine and win conditions
//! - `state`: Root aggregate and the tick loop
//! - `events`: Game events handed to the protocol layer

pub mod ids;
pub mod mole;
pub mod scheduler;
pub mod arbiter;
pub mod score;
pub mod phase;
pub mod state;
pub mod events;

// Re-export key types
pub use ids::{MatchId, Millis, MoleId, PlayerId};
pub use mole::{Mole, MoleBoard, MoleState};
pub use scheduler::{MoleSpawnScheduler, SpawnTable};
pub use arbiter::{HitArbiter, HitRequest, HitVerdict, RejectReason};
pub use score::{PlayerScore, ScoreAggregator};
pub use phase::{FinishReason, MatchError, MatchPhase, MatchStateMachine, ScoreTarget, WinCondition};
pub use state::{MatchState, MatchSummary, TickResult};
pub use events::{DespawnReason, GameEvent};
