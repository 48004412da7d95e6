//! Config Catalog
//!
//! Immutable gameplay tables shared by every match in the process:
//! mole type definitions, base spawn weights, visibility timing and the
//! per-mode presets. Loaded once, validated, and never mutated afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use serde::{Serialize, Deserialize};
use thiserror::Error;

// =============================================================================
// CLOSED CATEGORIES
// =============================================================================

/// Mole type identifier.
///
/// Declaration order is the order used to build cumulative spawn buckets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoleType {
    /// Common, low value
    Standard,
    /// Rare, high value
    Deluxe,
    /// Negative value, punishes random swinging
    Penalty,
}

impl MoleType {
    /// All mole types in declared order.
    pub const ALL: [MoleType; 3] = [MoleType::Standard, MoleType::Deluxe, MoleType::Penalty];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            MoleType::Standard => "standard",
            MoleType::Deluxe => "deluxe",
            MoleType::Penalty => "penalty",
        }
    }
}

impl fmt::Display for MoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Game mode identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameModeId {
    /// Fixed-length match, highest score wins
    Timed,
    /// First to the score target wins
    ScoreChase,
    /// Head-to-head with more penalty moles
    Versus,
}

impl GameModeId {
    /// All modes.
    pub const ALL: [GameModeId; 3] = [GameModeId::Timed, GameModeId::ScoreChase, GameModeId::Versus];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            GameModeId::Timed => "timed",
            GameModeId::ScoreChase => "score_chase",
            GameModeId::Versus => "versus",
        }
    }
}

impl fmt::Display for GameModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameModeId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameModeId::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownMode(s.to_string()))
    }
}

// =============================================================================
// EXHAUSTIVE TABLES
// =============================================================================

/// One value per mole type.
///
/// Lookups go through an exhaustive `match`, so adding a mole type fails to
/// compile until every table provides it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerMoleType<T> {
    /// Standard mole entry
    pub standard: T,
    /// Deluxe mole entry
    pub deluxe: T,
    /// Penalty mole entry
    pub penalty: T,
}

impl<T> PerMoleType<T> {
    /// Entry for a mole type.
    pub fn get(&self, mole_type: MoleType) -> &T {
        match mole_type {
            MoleType::Standard => &self.standard,
            MoleType::Deluxe => &self.deluxe,
            MoleType::Penalty => &self.penalty,
        }
    }

    /// Build a new table by mapping every entry.
    pub fn map<U>(&self, mut f: impl FnMut(MoleType, &T) -> U) -> PerMoleType<U> {
        PerMoleType {
            standard: f(MoleType::Standard, &self.standard),
            deluxe: f(MoleType::Deluxe, &self.deluxe),
            penalty: f(MoleType::Penalty, &self.penalty),
        }
    }

    /// Iterate in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (MoleType, &T)> {
        MoleType::ALL.into_iter().map(move |t| (t, self.get(t)))
    }
}

/// One value per game mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerMode<T> {
    /// `timed` entry
    pub timed: T,
    /// `score_chase` entry
    pub score_chase: T,
    /// `versus` entry
    pub versus: T,
}

impl<T> PerMode<T> {
    /// Entry for a mode.
    pub fn get(&self, mode: GameModeId) -> &T {
        match mode {
            GameModeId::Timed => &self.timed,
            GameModeId::ScoreChase => &self.score_chase,
            GameModeId::Versus => &self.versus,
        }
    }

    /// Iterate over all modes.
    pub fn iter(&self) -> impl Iterator<Item = (GameModeId, &T)> {
        GameModeId::ALL.into_iter().map(move |m| (m, self.get(m)))
    }
}

// =============================================================================
// CATALOG ENTRIES
// =============================================================================

/// Static metadata for a mole type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoleTypeDefinition {
    /// Type this entry describes
    pub id: MoleType,
    /// Score delta applied on a confirmed hit (may be negative)
    pub base_points: i32,
    /// Short UI label
    pub display_name: String,
}

/// Global bounds on how long a mole stays visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnTiming {
    /// Shortest visible window
    pub min_visible_seconds: u32,
    /// Longest visible window
    pub max_visible_seconds: u32,
}

impl SpawnTiming {
    /// Check `0 < min <= max`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_visible_seconds == 0 || self.min_visible_seconds > self.max_visible_seconds {
            return Err(ConfigError::InvalidTiming {
                min: self.min_visible_seconds,
                max: self.max_visible_seconds,
            });
        }
        Ok(())
    }

    /// Lower bound in milliseconds.
    pub fn min_visible_ms(&self) -> u64 {
        u64::from(self.min_visible_seconds) * 1000
    }

    /// Upper bound in milliseconds.
    pub fn max_visible_ms(&self) -> u64 {
        u64::from(self.max_visible_seconds) * 1000
    }
}

/// Spawn tuning for one mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeSpawnConfig {
    /// Arrival-rate knob; higher means shorter gaps between spawns.
    /// Does not change the relative odds between mole types.
    pub spawn_rate_multiplier: f64,
    /// Sparse per-type weight overrides
    #[serde(default)]
    pub weight_overrides: BTreeMap<MoleType, u32>,
}

impl ModeSpawnConfig {
    /// `override[type]` if present, else `base[type]`.
    pub fn effective_weights(&self, base: &PerMoleType<u32>) -> PerMoleType<u32> {
        base.map(|mole_type, weight| {
            self.weight_overrides
                .get(&mole_type)
                .copied()
                .unwrap_or(*weight)
        })
    }

    pub(crate) fn validate(&self, mode: GameModeId) -> Result<(), ConfigError> {
        if !self.spawn_rate_multiplier.is_finite() || self.spawn_rate_multiplier <= 0.0 {
            return Err(ConfigError::InvalidMultiplier {
                mode,
                value: self.spawn_rate_multiplier,
            });
        }
        Ok(())
    }
}

/// How a mode's match ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeRules {
    /// Countdown length; `None` for untimed modes
    #[serde(default)]
    pub time_limit_seconds: Option<u32>,
    /// First player reaching this total wins; `None` disables
    #[serde(default)]
    pub score_target: Option<i64>,
}

/// Everything a match snapshots from its mode at start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModePreset {
    /// Spawn tuning
    pub spawn: ModeSpawnConfig,
    /// End rules
    #[serde(default)]
    pub rules: ModeRules,
}

// =============================================================================
// CATALOG
// =============================================================================

/// Process-wide read-only gameplay configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigCatalog {
    /// Visibility bounds
    pub timing: SpawnTiming,
    /// Relative spawn odds before mode overrides
    pub base_weights: PerMoleType<u32>,
    /// Type definitions
    pub mole_types: PerMoleType<MoleTypeDefinition>,
    /// Mode presets
    pub modes: PerMode<ModePreset>,
}

impl Default for ConfigCatalog {
    fn default() -> Self {
        Self {
            timing: SpawnTiming {
                min_visible_seconds: 3,
                max_visible_seconds: 15,
            },
            base_weights: PerMoleType {
                standard: 8,
                deluxe: 2,
                penalty: 1,
            },
            mole_types: PerMoleType {
                standard: definition(MoleType::Standard, 5, "Standard Mole"),
                deluxe: definition(MoleType::Deluxe, 15, "Deluxe Mole"),
                penalty: definition(MoleType::Penalty, -10, "Penalty Mole"),
            },
            modes: PerMode {
                timed: ModePreset {
                    spawn: ModeSpawnConfig {
                        spawn_rate_multiplier: 1.0,
                        weight_overrides: BTreeMap::new(),
                    },
                    rules: ModeRules {
                        time_limit_seconds: Some(180),
                        score_target: None,
                    },
                },
                score_chase: ModePreset {
                    spawn: ModeSpawnConfig {
                        spawn_rate_multiplier: 1.25,
                        weight_overrides: BTreeMap::from([(MoleType::Deluxe, 3)]),
                    },
                    rules: ModeRules {
                        time_limit_seconds: None,
                        score_target: Some(100),
                    },
                },
                versus: ModePreset {
                    spawn: ModeSpawnConfig {
                        spawn_rate_multiplier: 1.0,
                        weight_overrides: BTreeMap::from([(MoleType::Penalty, 2)]),
                    },
                    rules: ModeRules {
                        time_limit_seconds: Some(180),
                        score_target: None,
                    },
                },
            },
        }
    }
}

fn definition(id: MoleType, base_points: i32, display_name: &str) -> MoleTypeDefinition {
    MoleTypeDefinition {
        id,
        base_points,
        display_name: display_name.to_string(),
    }
}

impl ConfigCatalog {
    /// The built-in catalog, initialised once per process.
    pub fn builtin() -> Arc<ConfigCatalog> {
        static BUILTIN: OnceLock<Arc<ConfigCatalog>> = OnceLock::new();
        BUILTIN.get_or_init(|| Arc::new(ConfigCatalog::default())).clone()
    }

    /// Parse and validate a catalog from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let catalog: ConfigCatalog = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Check table consistency.
    ///
    /// Per-mode weight totals are checked when a match starts, since an
    /// unusable mode should not prevent the others from running.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timing.validate()?;

        for (slot, def) in self.mole_types.iter() {
            if def.id != slot {
                return Err(ConfigError::MismatchedTypeId { slot, found: def.id });
            }
        }

        for (mode, preset) in self.modes.iter() {
            preset.spawn.validate(mode)?;
        }

        Ok(())
    }

    /// Preset for a mode.
    pub fn mode(&self, mode: GameModeId) -> &ModePreset {
        self.modes.get(mode)
    }

    /// Points awarded for hitting a mole of this type.
    pub fn base_points(&self, mole_type: MoleType) -> i32 {
        self.mole_types.get(mole_type).base_points
    }

    /// Base weights merged with the mode's overrides.
    pub fn effective_weights(&self, mode: GameModeId) -> PerMoleType<u32> {
        self.mode(mode).spawn.effective_weights(&self.base_weights)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Fatal configuration errors. Raised at load or match start; a match that
/// fails with one of these never leaves `Waiting`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Every type has zero effective weight.
    #[error("total spawn weight for mode '{mode}' is zero")]
    ZeroTotalWeight {
        /// Offending mode
        mode: GameModeId,
    },

    /// Visibility bounds are not `0 < min <= max`.
    #[error("invalid visibility bounds: min={min}s max={max}s")]
    InvalidTiming {
        /// Configured minimum
        min: u32,
        /// Configured maximum
        max: u32,
    },

    /// Spawn rate multiplier is not a positive finite number.
    #[error("invalid spawn rate multiplier {value} for mode '{mode}'")]
    InvalidMultiplier {
        /// Offending mode
        mode: GameModeId,
        /// Configured value
        value: f64,
    },

    /// Match configured without any holes.
    #[error("hole count must be at least 1")]
    NoHoles,

    /// Arrival distribution mean is zero.
    #[error("mean spawn gap must be at least 1ms")]
    ZeroSpawnGap,

    /// A type definition sits in the wrong slot.
    #[error("mole type slot '{slot}' holds definition for '{found}'")]
    MismatchedTypeId {
        /// Table slot
        slot: MoleType,
        /// Id found in that slot
        found: MoleType,
    },

    /// Mode name not recognised.
    #[error("unknown game mode '{0}'")]
    UnknownMode(String),

    /// Catalog JSON could not be parsed.
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    /// Catalog file could not be read.
    #[error("failed to read catalog {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// TESTS
// =============================================================================
