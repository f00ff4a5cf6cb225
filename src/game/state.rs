//! Board State Definitions
//!
//! Teams, pawn identities and the per-turn snapshot the engine resolves.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use std::sync::Arc;
use serde::{Serialize, Deserialize};

use crate::core::coord::Coord;
use crate::core::hash::{Digest, StateHasher, compute_state_hash};
use crate::game::board::Board;
use crate::game::rank::{Rank, RankRules};

// =============================================================================
// TEAM
// =============================================================================

/// One of the two sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Team {
    /// Sets up on the low rows
    Red = 0,
    /// Sets up on the high rows
    Blue = 1,
}

impl Team {
    /// Both teams, Red first.
    pub const BOTH: [Team; 2] = [Team::Red, Team::Blue];

    /// The other side.
    #[inline]
    pub fn opponent(self) -> Team {
        match self {
            Team::Red => Team::Blue,
            Team::Blue => Team::Red,
        }
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Team::Red => "red",
            Team::Blue => "blue",
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PAWN ID
// =============================================================================

/// Pawn identity: owning team plus the coordinate it was set up on.
///
/// Never changes. Ordered by (team, origin); this order fixes Merkle leaf
/// positions and battle event order. Serialized as `"red:3:6"` so it can key
/// JSON maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PawnId {
    /// Owning team
    pub team: Team,
    /// Setup coordinate
    pub origin: Coord,
}

impl PawnId {
    /// Create a pawn id.
    pub const fn new(team: Team, origin: Coord) -> Self {
        Self { team, origin }
    }

    /// Canonical bytes fed into commitments (team tag, x, y).
    pub fn to_bytes(&self) -> [u8; 9] {
        let mut out = [0u8; 9];
        out[0] = self.team as u8;
        out[1..].copy_from_slice(&self.origin.to_le_bytes());
        out
    }
}

impl std::fmt::Display for PawnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.team, self.origin.x, self.origin.y)
    }
}

impl From<PawnId> for String {
    fn from(id: PawnId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for PawnId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::str::FromStr for PawnId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let team = match parts.next() {
            Some("red") => Team::Red,
            Some("blue") => Team::Blue,
            _ => return Err(format!("invalid team in pawn id {s:?}")),
        };
        let x = parts
            .next()
            .and_then(|p| p.parse::<i32>().ok())
            .ok_or_else(|| format!("invalid x in pawn id {s:?}"))?;
        let y = parts
            .next()
            .and_then(|p| p.parse::<i32>().ok())
            .ok_or_else(|| format!("invalid y in pawn id {s:?}"))?;
        if parts.next().is_some() {
            return Err(format!("trailing data in pawn id {s:?}"));
        }
        Ok(PawnId::new(team, Coord::new(x, y)))
    }
}

// =============================================================================
// PAWN STATE
// =============================================================================

/// Mutable state of one pawn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PawnState {
    /// Identity
    pub id: PawnId,
    /// Rank, or None while hidden from this observer
    pub rank: Option<Rank>,
    /// Current tile, or [`Coord::OFF_BOARD`] once captured
    pub position: Coord,
    /// Still on the board?
    pub alive: bool,
    /// Moved during the last resolved turn
    pub moved: bool,
    /// Moved more than one tile during the last resolved turn
    pub moved_as_scout: bool,
    /// Rank has been disclosed to the opponent
    pub revealed: bool,
}

impl PawnState {
    /// Create a pawn standing on its setup tile.
    pub fn new(id: PawnId, rank: Option<Rank>) -> Self {
        Self {
            id,
            rank,
            position: id.origin,
            alive: true,
            moved: false,
            moved_as_scout: false,
            revealed: false,
        }
    }

    /// Owning team.
    #[inline]
    pub fn team(&self) -> Team {
        self.id.team
    }

    /// Remove from the board.
    pub fn kill(&mut self) {
        self.alive = false;
        self.position = Coord::OFF_BOARD;
    }

    /// Hash this pawn's state for verification.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_bytes(&self.id.to_bytes());
        match self.rank {
            Some(rank) => hasher.update_u8(rank.tag()),
            None => hasher.update_u8(u8::MAX),
        }
        hasher.update_coord(self.position);
        hasher.update_bool(self.alive);
        hasher.update_bool(self.moved);
        hasher.update_bool(self.moved_as_scout);
        hasher.update_bool(self.revealed);
    }
}

// =============================================================================
// BOARD STATE
// =============================================================================

/// Snapshot of a match between turns.
#[derive(Clone, Debug)]
pub struct BoardState {
    /// Static topology
    pub board: Arc<Board>,
    /// Battle and movement rules
    pub rules: Arc<RankRules>,
    /// Number of turns resolved so far
    pub turn: u32,
    /// Every pawn ever placed, alive or not
    pub pawns: BTreeMap<PawnId, PawnState>,
}

impl BoardState {
    /// Create an empty board state.
    pub fn new(board: Arc<Board>, rules: Arc<RankRules>) -> Self {
        Self {
            board,
            rules,
            turn: 0,
            pawns: BTreeMap::new(),
        }
    }

    /// Place a pawn on its setup tile.
    ///
    /// Returns false if the tile is impassable, occupied, or the id is taken.
    pub fn add_pawn(&mut self, id: PawnId, rank: Option<Rank>) -> bool {
        if !self.board.is_passable(id.origin)
            || self.pawns.contains_key(&id)
            || self.occupant(id.origin).is_some()
        {
            return false;
        }
        self.pawns.insert(id, PawnState::new(id, rank));
        true
    }

    /// Get a pawn.
    pub fn pawn(&self, id: &PawnId) -> Option<&PawnState> {
        self.pawns.get(id)
    }

    /// Get a pawn mutably.
    pub fn pawn_mut(&mut self, id: &PawnId) -> Option<&mut PawnState> {
        self.pawns.get_mut(id)
    }

    /// Alive pawn standing on a tile.
    pub fn occupant(&self, c: Coord) -> Option<&PawnState> {
        self.pawns.values().find(|p| p.alive && p.position == c)
    }

    /// Map of occupied tiles to their pawn.
    ///
    /// Returns the first conflicting tile if two alive pawns share one.
    pub fn occupancy(&self) -> Result<BTreeMap<Coord, PawnId>, Coord> {
        let mut occupied = BTreeMap::new();
        for pawn in self.pawns.values().filter(|p| p.alive) {
            if occupied.insert(pawn.position, pawn.id).is_some() {
                return Err(pawn.position);
            }
        }
        Ok(occupied)
    }

    /// Pawns of one team in id order.
    pub fn team_pawns(&self, team: Team) -> impl Iterator<Item = &PawnState> {
        self.pawns.values().filter(move |p| p.team() == team)
    }

    /// Number of alive pawns a team has.
    pub fn alive_count(&self, team: Team) -> usize {
        self.team_pawns(team).filter(|p| p.alive).count()
    }

    /// Record a rank learned from a verified proof.
    pub fn learn_rank(&mut self, id: &PawnId, rank: Rank) -> bool {
        match self.pawns.get_mut(id) {
            Some(pawn) => {
                pawn.rank = Some(rank);
                true
            }
            None => false,
        }
    }

    /// Hash the whole snapshot.
    ///
    /// Both participants compare this after each turn.
    pub fn compute_hash(&self) -> Digest {
        compute_state_hash(self.turn, |hasher| {
            hasher.update_u32(self.pawns.len() as u32);
            for pawn in self.pawns.values() {
                pawn.hash_into(hasher);
            }
        })
    }
}
