//! # Mole Buster Match Server
//!
//! Authoritative match core for a multiplayer whack-a-mole game: spawn
//! scheduling, first-hit-wins arbitration, scoring and match lifecycle.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MOLE BUSTER SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  └── rng.rs      - Xorshift128+ PRNG, match seed derivation  │
//! │                                                              │
//! │  config/         - Read-only configuration                   │
//! │  ├── catalog.rs  - Mole types, weights, timing, mode presets │
//! │  └── settings.rs - Hole count, arrival distribution          │
//! │                                                              │
//! │  game/           - Match logic (deterministic)               │
//! │  ├── mole.rs     - Moles and the hole board                  │
//! │  ├── scheduler.rs- Spawn timing, type draw, timeouts         │
//! │  ├── arbiter.rs  - First-hit-wins validation                 │
//! │  ├── score.rs    - Per-player totals                         │
//! │  ├── phase.rs    - Waiting / InProgress / Finished           │
//! │  └── state.rs    - Root aggregate and tick loop              │
//! │                                                              │
//! │  network/        - Networking (non-deterministic)            │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  └── session.rs  - Per-match session tasks                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `game/` modules never read the clock or the OS RNG:
//! - Time is passed in explicitly as milliseconds
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - All randomness from seeded Xorshift128+
//! - Hits are resolved in queue order, never by timestamp
//!
//! Given the same seed, tick times and hit queue, a match produces
//! **identical events**.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod config;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::{DeterministicRng, derive_match_seed};
pub use config::{ConfigCatalog, ConfigError, GameModeId, MatchSettings, MoleType};
pub use game::{GameEvent, HitRequest, MatchId, MatchPhase, MatchState, MoleId, PlayerId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
