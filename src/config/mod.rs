//! Configuration
//!
//! - `catalog`: immutable gameplay tables (mole types, weights, timing, modes)
//! - `settings`: per-process match knobs read from the environment

pub mod catalog;
pub mod settings;

pub use catalog::{
    ConfigCatalog, ConfigError, GameModeId, ModePreset, ModeRules, ModeSpawnConfig,
    MoleType, MoleTypeDefinition, PerMode, PerMoleType, SpawnTiming,
};
pub use settings::{ArrivalDistribution, MatchSettings};
