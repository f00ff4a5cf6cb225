//! Core deterministic primitives.
//!
//! Coordinates, hashing and randomness shared by the engine and the
//! commit-reveal protocol. Nothing here depends on game rules.

pub mod coord;
pub mod rng;
pub mod hash;

// Re-export core types
pub use coord::Coord;
pub use rng::{DeterministicRng, OsSaltSource, Salt, SaltSource};
pub use hash::{Digest, StateHasher, compute_state_hash};
