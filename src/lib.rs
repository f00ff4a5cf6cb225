//! # Stratagem Server
//!
//! Deterministic turn resolution and commit-reveal verification for a
//! two-player, simultaneous-move, hidden-rank wargame.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    STRATAGEM SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── coord.rs    - Grid coordinates and paths                │
//! │  ├── rng.rs      - Xorshift128+ PRNG and salt sources        │
//! │  └── hash.rs     - Domain-separated SHA-256 hashing          │
//! │                                                              │
//! │  game/           - Turn resolution engine (deterministic)    │
//! │  ├── rank.rs     - Rank table, mobility, exceptions          │
//! │  ├── board.rs    - Grid topology and population limits       │
//! │  ├── state.rs    - Teams, pawns, board snapshots             │
//! │  ├── setup.rs    - Placement validation and auto-setup       │
//! │  ├── movement.rs - Move validation and generation            │
//! │  ├── battle.rs   - Contest detection and fights              │
//! │  ├── resolve.rs  - Turn resolution and win check             │
//! │  └── events.rs   - Battle events                             │
//! │                                                              │
//! │  proof/          - Commit-reveal protocol (deterministic)    │
//! │  ├── commitment.rs - Salted rank and move commitments        │
//! │  ├── merkle.rs   - Merkle tree over setup leaves             │
//! │  ├── protocol.rs - Verifier phase machine                    │
//! │  ├── vault.rs    - Local secret storage                      │
//! │  └── agent.rs    - Committing player                         │
//! │                                                              │
//! │  network/        - Sessions (non-deterministic)              │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── session.rs  - One task per match                        │
//! │  └── client.rs   - Retrying client                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/`, `game/` and `proof/` verification paths are **100% deterministic**:
//! - No floating-point arithmetic
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness injected through [`core::rng::SaltSource`]
//!
//! Given identical setups and moves, resolution produces **identical
//! deltas and state hashes** on any platform.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod proof;

// Re-export commonly used types
pub use crate::core::coord::Coord;
pub use crate::core::rng::{DeterministicRng, OsSaltSource, SaltSource};
pub use game::state::{BoardState, PawnId, Team};
pub use game::resolve::{resolve, MatchOutcome, TurnResolveDelta};
pub use proof::protocol::{Match, Phase, ProtocolError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
