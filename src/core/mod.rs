//! Core deterministic primitives.
//!
//! Everything random in a match flows through the seeded generator here,
//! so a match can be replayed from its seed and hit queue.

pub mod rng;

pub use rng::{DeterministicRng, derive_match_seed};
