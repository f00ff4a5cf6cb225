//! Hash Commitments
//!
//! Commit to a hidden value now, reveal it later. Every commitment is
//! `SHA-256(domain || fields || salt)`; the salt keeps small value spaces
//! (twelve ranks, a handful of moves) from being brute-forced.

use serde::{Serialize, Deserialize};

use crate::core::coord::Coord;
use crate::core::hash::{Digest, StateHasher};
use crate::core::rng::{Salt, SaltSource};
use crate::game::movement::QueuedMove;
use crate::game::rank::Rank;
use crate::game::state::PawnId;

/// Domain separator for rank commitments.
const RANK_COMMIT_DOMAIN: &[u8] = b"STRATAGEM_RANK_COMMIT_V1";

/// Domain separator for move commitments.
const MOVE_COMMIT_DOMAIN: &[u8] = b"STRATAGEM_MOVE_COMMIT_V1";

/// Pre-image of a rank commitment (kept secret until a battle needs it).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenRank {
    /// Pawn the rank belongs to
    pub pawn: PawnId,
    /// The hidden rank
    pub rank: Rank,
    /// Random salt
    #[serde(with = "crate::core::hash::hex_serde")]
    pub salt: Salt,
}

impl HiddenRank {
    /// Pair a rank with a fresh salt.
    pub fn new(pawn: PawnId, rank: Rank, salts: &mut impl SaltSource) -> Self {
        Self {
            pawn,
            rank,
            salt: salts.next_salt(),
        }
    }

    /// Commitment digest.
    pub fn commit(&self) -> Digest {
        let mut hasher = StateHasher::new(RANK_COMMIT_DOMAIN);
        hasher.update_bytes(&self.pawn.to_bytes());
        hasher.update_u8(self.rank.tag());
        hasher.update_bytes(&self.salt);
        hasher.finalize()
    }
}

/// Pre-image of a move commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenMove {
    /// Pawn that moves
    pub pawn: PawnId,
    /// Random salt
    #[serde(with = "crate::core::hash::hex_serde")]
    pub salt: Salt,
    /// Where the pawn stands
    pub origin: Coord,
    /// Where it goes
    pub target: Coord,
}

impl HiddenMove {
    /// Hide a queued move behind a fresh salt.
    pub fn new(mv: &QueuedMove, salts: &mut impl SaltSource) -> Self {
        Self {
            pawn: mv.pawn,
            salt: salts.next_salt(),
            origin: mv.origin,
            target: mv.target,
        }
    }

    /// Commitment digest.
    pub fn commit(&self) -> Digest {
        let mut hasher = StateHasher::new(MOVE_COMMIT_DOMAIN);
        hasher.update_bytes(&self.pawn.to_bytes());
        hasher.update_coord(self.origin);
        hasher.update_coord(self.target);
        hasher.update_bytes(&self.salt);
        hasher.finalize()
    }

    /// The move in engine form.
    pub fn to_queued(&self) -> QueuedMove {
        QueuedMove::new(self.pawn.team, self.pawn, self.origin, self.target)
    }
}

/// Public half of a rank commitment: one Merkle leaf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupCommit {
    /// Pawn committed to
    pub pawn: PawnId,
    /// `HiddenRank::commit` of its rank
    #[serde(with = "crate::core::hash::hex_serde")]
    pub hash: Digest,
}

impl From<&HiddenRank> for SetupCommit {
    fn from(hidden: &HiddenRank) -> Self {
        Self {
            pawn: hidden.pawn,
            hash: hidden.commit(),
        }
    }
}
