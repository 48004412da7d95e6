//! Per-match runtime settings.
//!
//! Unlike the catalog these are deployment knobs (board size, pacing), read
//! from the environment at startup and copied into every new match.

use serde::{Serialize, Deserialize};

use crate::config::catalog::ConfigError;

/// Default board size (3x3 grid).
pub const DEFAULT_HOLE_COUNT: u8 = 9;

/// Default mean gap between spawns at multiplier 1.0.
pub const DEFAULT_MEAN_SPAWN_GAP_MS: u64 = 1200;

/// Inter-arrival distribution for mole spawns.
///
/// The mean is divided by the mode's spawn rate multiplier, so a faster mode
/// spawns more often without changing which types it spawns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArrivalDistribution {
    /// Gap drawn uniformly from `[mean/2, 3*mean/2]`.
    Uniform {
        /// Mean gap at multiplier 1.0
        mean_gap_ms: u64,
    },
    /// Memoryless gaps (Poisson arrivals), floored at 1ms.
    Exponential {
        /// Mean gap at multiplier 1.0
        mean_gap_ms: u64,
    },
}

impl Default for ArrivalDistribution {
    fn default() -> Self {
        ArrivalDistribution::Uniform {
            mean_gap_ms: DEFAULT_MEAN_SPAWN_GAP_MS,
        }
    }
}

impl ArrivalDistribution {
    /// Mean gap at multiplier 1.0.
    pub fn mean_gap_ms(&self) -> u64 {
        match *self {
            ArrivalDistribution::Uniform { mean_gap_ms } => mean_gap_ms,
            ArrivalDistribution::Exponential { mean_gap_ms } => mean_gap_ms,
        }
    }
}

/// Settings applied to every match created by this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSettings {
    /// Number of holes on the board
    pub hole_count: u8,
    /// Spawn arrival distribution
    pub arrival: ArrivalDistribution,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            hole_count: DEFAULT_HOLE_COUNT,
            arrival: ArrivalDistribution::default(),
        }
    }
}

impl MatchSettings {
    /// Create settings from environment variables.
    ///
    /// - `MOLE_HOLE_COUNT`
    /// - `MOLE_MEAN_SPAWN_GAP_MS`
    /// - `MOLE_ARRIVAL` (`uniform` or `exponential`)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let hole_count = std::env::var("MOLE_HOLE_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.hole_count);

        let mean_gap_ms = std::env::var("MOLE_MEAN_SPAWN_GAP_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MEAN_SPAWN_GAP_MS);

        let arrival = match std::env::var("MOLE_ARRIVAL").as_deref() {
            Ok("exponential") => ArrivalDistribution::Exponential { mean_gap_ms },
            _ => ArrivalDistribution::Uniform { mean_gap_ms },
        };

        Self { hole_count, arrival }
    }

    /// Check the settings can run a match.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hole_count == 0 {
            return Err(ConfigError::NoHoles);
        }
        if self.arrival.mean_gap_ms() == 0 {
            return Err(ConfigError::ZeroSpawnGap);
        }
        Ok(())
    }
}
