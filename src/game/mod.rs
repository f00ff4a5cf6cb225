//! Game Logic Module
//!
//! Board model and the turn resolution engine. 100% deterministic.
//!
//! ## Module Structure
//!
//! - `rank`: Rank table, mobility, battle exceptions
//! - `board`: Static grid topology and population limits
//! - `state`: Teams, pawn identities, board snapshots
//! - `setup`: Placement validation and seeded auto-setup
//! - `movement`: Move validation and legal-move generation
//! - `battle`: Contest detection and battle outcomes
//! - `resolve`: Authoritative turn resolution and win check
//! - `events`: Battle events for presentation and replay

pub mod rank;
pub mod board;
pub mod state;
pub mod setup;
pub mod movement;
pub mod battle;
pub mod resolve;
pub mod events;

// Re-export key types
pub use rank::{Rank, RankRules, Mobility};
pub use board::Board;
pub use state::{BoardState, PawnId, PawnState, Team};
pub use movement::{QueuedMove, InvalidMove};
pub use resolve::{resolve, plan, MatchOutcome, WinReason, ResolveError, TurnPlan, TurnResolveDelta};
pub use events::BattleEvent;
