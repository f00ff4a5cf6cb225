//! Battle Events
//!
//! Immutable records of every battle in a turn, for presentation and replay.
//! Events carry an explicit total order (by participant identity) so both
//! participants compute the same list.

use serde::{Serialize, Deserialize};
use crate::core::coord::Coord;
use crate::game::rank::Rank;
use crate::game::state::PawnId;

/// A rank disclosed by a battle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RevealedRank {
    /// Pawn whose rank was shown
    pub pawn: PawnId,
    /// The rank
    pub rank: Rank,
    /// Was it hidden from the opponent before this battle?
    pub was_hidden: bool,
}

/// What happened in a battle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleEvent {
    /// Pawns involved, ascending
    pub participants: Vec<PawnId>,
    /// Pawns removed, ascending
    pub casualties: Vec<PawnId>,
    /// Tile where the outcome happened
    pub tile: Coord,
    /// Ranks shown, in participant order
    pub revealed: Vec<RevealedRank>,
}

impl BattleEvent {
    /// Did this pawn take part?
    pub fn involves(&self, pawn: &PawnId) -> bool {
        self.participants.contains(pawn)
    }

    /// Did this pawn die here?
    pub fn killed(&self, pawn: &PawnId) -> bool {
        self.casualties.contains(pawn)
    }

    /// Survivor, if exactly one pawn lived.
    pub fn survivor(&self) -> Option<PawnId> {
        let mut alive = self.participants.iter().filter(|p| !self.casualties.contains(*p));
        match (alive.next(), alive.next()) {
            (Some(p), None) => Some(*p),
            _ => None,
        }
    }
}

impl PartialOrd for BattleEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BattleEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Sort by: participants (lowest id first), then tile
        self.participants
            .cmp(&other.participants)
            .then(self.tile.cmp(&other.tile))
            .then(self.casualties.cmp(&other.casualties))
            .then(self.revealed.cmp(&other.revealed))
    }
}
