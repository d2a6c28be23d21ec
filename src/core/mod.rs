//! Core deterministic primitives.
//!
//! Everything random inside a match is drawn from here so the game layer
//! stays replayable.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, derive_match_seed};
