//! Army Setup
//!
//! Checking a placement against the board's zones and population limits,
//! generating one from a seeded RNG, and placing it on a board state.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::coord::Coord;
use crate::core::rng::DeterministicRng;
use crate::game::board::Board;
use crate::game::rank::{Mobility, Rank, RankRules};
use crate::game::state::{BoardState, PawnId, Team};

/// A team's placement: setup tile to rank.
pub type Placement = BTreeMap<Coord, Rank>;

/// Why a placement was refused.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SetupError {
    /// Nothing placed.
    #[error("setup is empty")]
    Empty,
    /// Tile is impassable or belongs to the other team.
    #[error("{coord} is not a setup tile for {team}")]
    OutsideZone {
        /// Offending tile
        coord: Coord,
        /// Team placing
        team: Team,
    },
    /// More pawns of a rank than the board allows.
    #[error("{got} pawns of rank {rank}, board allows {max}")]
    TooMany {
        /// Rank over the limit
        rank: Rank,
        /// Board maximum
        max: u32,
        /// Pawns placed
        got: u32,
    },
    /// The objective rank was not placed.
    #[error("setup has no {0}")]
    MissingObjective(Rank),
    /// Tile already holds a pawn.
    #[error("{0} is already occupied")]
    Occupied(Coord),
    /// Commitment team differs from the submitting team.
    #[error("setup submitted by {submitter} claims team {claimed}")]
    TeamMismatch {
        /// Who sent it
        submitter: Team,
        /// Team named in the payload
        claimed: Team,
    },
    /// Pawn belongs to the other team.
    #[error("{0} is not owned by the committing team")]
    WrongOwner(PawnId),
    /// Commits are not strictly ascending by pawn id.
    #[error("commits out of order at {0}")]
    Unordered(PawnId),
    /// The published root does not rebuild from the commits.
    #[error("merkle root does not match the commits")]
    RootMismatch,
    /// Cleartext ranks are not allowed in security mode.
    #[error("cleartext ranks are forbidden in security mode")]
    CleartextForbidden,
    /// A cleartext rank does not open its commitment.
    #[error("cleartext for {0} does not match its commitment")]
    CleartextMismatch(PawnId),
}

/// Rank counts of a placement.
pub fn count_ranks<'a>(ranks: impl IntoIterator<Item = &'a Rank>) -> BTreeMap<Rank, u32> {
    let mut counts = BTreeMap::new();
    for rank in ranks {
        *counts.entry(*rank).or_insert(0) += 1;
    }
    counts
}

/// Check that a set of tiles lies in the team's setup zone.
pub fn check_zone<'a>(
    board: &Board,
    team: Team,
    coords: impl IntoIterator<Item = &'a Coord>,
) -> Result<(), SetupError> {
    for coord in coords {
        let allowed = board
            .tile(*coord)
            .map(|t| t.passable && t.setup_team == Some(team))
            .unwrap_or(false);
        if !allowed {
            return Err(SetupError::OutsideZone { coord: *coord, team });
        }
    }
    Ok(())
}

/// Check rank counts against the board's population limits.
pub fn check_population(
    board: &Board,
    rules: &RankRules,
    counts: &BTreeMap<Rank, u32>,
) -> Result<(), SetupError> {
    for (rank, got) in counts {
        let max = board.max_pawns(*rank);
        if *got > max {
            return Err(SetupError::TooMany { rank: *rank, max, got: *got });
        }
    }
    if counts.get(&rules.objective).copied().unwrap_or(0) == 0 {
        return Err(SetupError::MissingObjective(rules.objective));
    }
    Ok(())
}

/// Validate a full placement.
pub fn validate_setup(
    board: &Board,
    rules: &RankRules,
    team: Team,
    placement: &Placement,
) -> Result<(), SetupError> {
    if placement.is_empty() {
        return Err(SetupError::Empty);
    }
    check_zone(board, team, placement.keys())?;
    check_population(board, rules, &count_ranks(placement.values()))
}

/// Generate a legal placement.
///
/// The objective and immobile ranks fill the back zones first; the rest of
/// the army is shuffled over the remaining tiles. Tiles inside one zone are
/// shuffled too, so the same seed always gives the same army.
pub fn auto_setup(
    board: &Board,
    rules: &RankRules,
    team: Team,
    rng: &mut DeterministicRng,
) -> Placement {
    let mut zones: BTreeMap<u8, Vec<Coord>> = BTreeMap::new();
    for coord in board.setup_tiles(team) {
        let zone = board
            .tile(coord)
            .and_then(|t| t.auto_setup_zone)
            .unwrap_or(u8::MAX);
        zones.entry(zone).or_default().push(coord);
    }
    let mut tiles = Vec::new();
    for (_, mut coords) in zones {
        rng.shuffle(&mut coords);
        tiles.extend(coords);
    }

    let mut back = Vec::new();
    let mut rest = Vec::new();
    for (rank, count) in board.population() {
        for _ in 0..*count {
            if rules.is_objective(*rank) {
                back.insert(0, *rank);
            } else if rules.mobility(*rank) == Mobility::Immobile {
                back.push(*rank);
            } else {
                rest.push(*rank);
            }
        }
    }
    rng.shuffle(&mut rest);

    tiles
        .into_iter()
        .zip(back.into_iter().chain(rest))
        .collect()
}

/// Put a team's army on the board.
///
/// Pass `None` ranks for the opponent's view of a committed setup.
pub fn place_army(
    state: &mut BoardState,
    team: Team,
    pawns: impl IntoIterator<Item = (Coord, Option<Rank>)>,
) -> Result<Vec<PawnId>, SetupError> {
    let mut placed = Vec::new();
    for (coord, rank) in pawns {
        let id = PawnId::new(team, coord);
        if !state.add_pawn(id, rank) {
            return Err(SetupError::Occupied(coord));
        }
        placed.push(id);
    }
    Ok(placed)
}
