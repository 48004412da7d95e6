//! Game Events
//!
//! Events produced by the match core, in the order they happened.
//! The network layer turns each one into a protocol message tagged with the
//! match id; nothing here knows about the wire.

use serde::{Serialize, Deserialize};

use crate::config::catalog::MoleType;
use crate::game::ids::{Millis, MoleId, PlayerId};
use crate::game::phase::MatchPhase;
use crate::game::score::PlayerScore;

/// Why a mole left the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DespawnReason {
    /// A player hit it first
    Hit,
    /// Visible window ran out (or the match ended)
    Timeout,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A mole became visible
    MoleSpawned {
        /// New mole
        mole_id: MoleId,
        /// Hole it occupies
        hole_index: u8,
        /// Drawn type
        mole_type: MoleType,
        /// Spawn time (ms)
        spawned_at: Millis,
        /// Timeout deadline (ms)
        despawns_at: Millis,
    },

    /// A mole left the board
    MoleDespawned {
        /// Mole that left
        mole_id: MoleId,
        /// Hit or timeout
        reason: DespawnReason,
    },

    /// A hit was confirmed
    MoleHit {
        /// Mole that was hit
        mole_id: MoleId,
        /// Winning player
        player_id: PlayerId,
        /// Base points of the mole's type
        points_delta: i32,
    },

    /// Full score snapshot after a change
    ScoreUpdated {
        /// Every player's total
        scores: Vec<PlayerScore>,
    },

    /// Phase or remaining time changed
    StateUpdated {
        /// Current phase
        phase: MatchPhase,
        /// None for untimed modes
        remaining_time_seconds: Option<u32>,
    },
}

impl GameEvent {
    /// Create mole spawned event.
    pub fn mole_spawned(
        mole_id: MoleId,
        hole_index: u8,
        mole_type: MoleType,
        spawned_at: Millis,
        despawns_at: Millis,
    ) -> Self {
        GameEvent::MoleSpawned {
            mole_id,
            hole_index,
            mole_type,
            spawned_at,
            despawns_at,
        }
    }

    /// Create mole despawned event.
    pub fn mole_despawned(mole_id: MoleId, reason: DespawnReason) -> Self {
        GameEvent::MoleDespawned { mole_id, reason }
    }

    /// Create confirmed hit event.
    pub fn mole_hit(mole_id: MoleId, player_id: PlayerId, points_delta: i32) -> Self {
        GameEvent::MoleHit {
            mole_id,
            player_id,
            points_delta,
        }
    }

    /// Create state update event.
    pub fn state_updated(phase: MatchPhase, remaining_time_seconds: Option<u32>) -> Self {
        GameEvent::StateUpdated {
            phase,
            remaining_time_seconds,
        }
    }

    /// Event name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::MoleSpawned { .. } => "mole.spawned",
            GameEvent::MoleDespawned { .. } => "mole.despawned",
            GameEvent::MoleHit { .. } => "mole.hit",
            GameEvent::ScoreUpdated { .. } => "score.update",
            GameEvent::StateUpdated { .. } => "match.state_update",
        }
    }
}
