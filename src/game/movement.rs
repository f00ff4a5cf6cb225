//! Move Validation
//!
//! Queued moves come from untrusted players. Validation never fails the
//! engine: an invalid move is reported as [`InvalidMove`] and dropped.
//!
//! All checks run against the pre-move board. Sliding pawns may not pass
//! through any occupied or impassable tile; only the final tile may hold an
//! enemy.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::coord::Coord;
use crate::game::rank::Mobility;
use crate::game::state::{BoardState, PawnId, PawnState, Team};

/// One side's move for a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueuedMove {
    /// Moving side
    pub team: Team,
    /// Pawn that moves
    pub pawn: PawnId,
    /// Where the pawn stands now
    pub origin: Coord,
    /// Where it wants to go
    pub target: Coord,
}

impl QueuedMove {
    /// Create a move.
    pub fn new(team: Team, pawn: PawnId, origin: Coord, target: Coord) -> Self {
        Self { team, pawn, origin, target }
    }
}

/// Why a queued move was dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum InvalidMove {
    /// The pawn belongs to the other side.
    #[error("pawn is not owned by the moving team")]
    WrongTeam,
    /// No such pawn.
    #[error("unknown pawn")]
    UnknownPawn,
    /// The pawn has been captured.
    #[error("pawn is not alive")]
    Dead,
    /// The pawn is not standing on the stated origin.
    #[error("pawn is not at the stated origin")]
    OriginMismatch,
    /// Target is outside the grid.
    #[error("target is off the board")]
    OffBoard,
    /// Target is a lake.
    #[error("target is impassable")]
    Impassable,
    /// Origin equals target.
    #[error("target equals origin")]
    NotMoving,
    /// A friendly pawn holds the target.
    #[error("target holds a friendly pawn")]
    FriendlyOccupied,
    /// The rank never moves.
    #[error("rank is immobile")]
    Immobile,
    /// Target is not on the same row or column.
    #[error("target is not in a straight line")]
    NotAligned,
    /// A stepping rank asked to move more than one tile.
    #[error("rank may only step one tile")]
    TooFar,
    /// Something stands between origin and target.
    #[error("path is blocked")]
    PathBlocked,
}

/// A move that passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidMove {
    /// The move as submitted
    pub mv: QueuedMove,
    /// Tiles travelled, origin excluded, target included
    pub path: Vec<Coord>,
    /// The pawn's rank must be proven before this move can be trusted
    pub needs_rank: bool,
}

impl ValidMove {
    /// Moved more than one tile.
    #[inline]
    pub fn is_slide(&self) -> bool {
        self.path.len() > 1
    }

    /// Tiles strictly between origin and target.
    pub fn interior(&self) -> &[Coord] {
        &self.path[..self.path.len().saturating_sub(1)]
    }
}

/// Validate a move against the pre-move board.
///
/// A pawn whose rank is unknown to this observer may step or slide; a slide
/// then sets `needs_rank` so the owner has to prove it is allowed to.
pub fn validate_move(state: &BoardState, mv: &QueuedMove) -> Result<ValidMove, InvalidMove> {
    if mv.pawn.team != mv.team {
        return Err(InvalidMove::WrongTeam);
    }
    let pawn = state.pawn(&mv.pawn).ok_or(InvalidMove::UnknownPawn)?;
    if !pawn.alive {
        return Err(InvalidMove::Dead);
    }
    if pawn.position != mv.origin {
        return Err(InvalidMove::OriginMismatch);
    }
    if !state.board.contains(mv.target) {
        return Err(InvalidMove::OffBoard);
    }
    if !state.board.is_passable(mv.target) {
        return Err(InvalidMove::Impassable);
    }
    if mv.target == mv.origin {
        return Err(InvalidMove::NotMoving);
    }
    if let Some(occupant) = state.occupant(mv.target) {
        if occupant.team() == mv.team {
            return Err(InvalidMove::FriendlyOccupied);
        }
    }

    let mobility = pawn.rank.map(|rank| state.rules.mobility(rank));
    let distance = mv.origin.manhattan(mv.target);

    match mobility {
        Some(Mobility::Immobile) => return Err(InvalidMove::Immobile),
        Some(Mobility::Step) => {
            if distance != 1 {
                return Err(if mv.origin.direction_to(mv.target).is_some() {
                    InvalidMove::TooFar
                } else {
                    InvalidMove::NotAligned
                });
            }
        }
        Some(Mobility::Slide) | None => {
            if mv.origin.direction_to(mv.target).is_none() {
                return Err(InvalidMove::NotAligned);
            }
            let blocked = mv
                .origin
                .between(mv.target)
                .into_iter()
                .any(|c| !state.board.is_passable(c) || state.occupant(c).is_some());
            if blocked {
                return Err(InvalidMove::PathBlocked);
            }
        }
    }

    Ok(ValidMove {
        mv: *mv,
        path: mv.origin.path_to(mv.target),
        needs_rank: mobility.is_none() && distance > 1,
    })
}

/// Every legal move for one pawn, in direction then distance order.
///
/// Pawns with an unknown rank are treated as stepping pawns.
pub fn pawn_moves(state: &BoardState, pawn: &PawnState) -> Vec<QueuedMove> {
    if !pawn.alive {
        return Vec::new();
    }
    let mobility = pawn
        .rank
        .map(|rank| state.rules.mobility(rank))
        .unwrap_or(Mobility::Step);
    let max_steps = match mobility {
        Mobility::Immobile => return Vec::new(),
        Mobility::Step => 1,
        Mobility::Slide => i32::MAX,
    };

    let mut moves = Vec::new();
    for dir in Coord::DIRECTIONS {
        let mut cursor = pawn.position;
        let mut steps = 0;
        while steps < max_steps {
            cursor = cursor.offset(dir);
            steps += 1;
            if !state.board.is_passable(cursor) {
                break;
            }
            match state.occupant(cursor) {
                Some(other) if other.team() == pawn.team() => break,
                Some(_) => {
                    moves.push(QueuedMove::new(pawn.team(), pawn.id, pawn.position, cursor));
                    break;
                }
                None => {
                    moves.push(QueuedMove::new(pawn.team(), pawn.id, pawn.position, cursor));
                }
            }
        }
    }
    moves
}

/// Every legal move for a team.
pub fn legal_moves(state: &BoardState, team: Team) -> Vec<QueuedMove> {
    state
        .team_pawns(team)
        .flat_map(|pawn| pawn_moves(state, pawn))
        .collect()
}

/// Alive pawns of a team whose rank is unknown here but which look able to
/// move.
pub fn unproven_movers(state: &BoardState, team: Team) -> BTreeSet<PawnId> {
    state
        .team_pawns(team)
        .filter(|pawn| pawn.rank.is_none() && !pawn_moves(state, pawn).is_empty())
        .map(|pawn| pawn.id)
        .collect()
}

/// Does the team have at least one legal move?
pub fn has_legal_move(state: &BoardState, team: Team) -> bool {
    state
        .team_pawns(team)
        .any(|pawn| !pawn_moves(state, pawn).is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;
    use crate::game::board::Board;
    use crate::game::rank::{Rank, RankRules};

    fn state_with(pawns: &[(Team, (i32, i32), Option<Rank>)]) -> BoardState {
        let mut state = BoardState::new(Arc::new(Board::classic()), Arc::new(RankRules::classic()));
        for (team, (x, y), rank) in pawns {
            assert!(state.add_pawn(PawnId::new(*team, Coord::new(*x, *y)), *rank));
        }
        state
    }

    fn mv(team: Team, from: (i32, i32), to: (i32, i32)) -> QueuedMove {
        let origin = Coord::new(from.0, from.1);
        QueuedMove::new(team, PawnId::new(team, origin), origin, Coord::new(to.0, to.1))
    }

    #[test]
    fn test_step_move() {
        let state = state_with(&[(Team::Red, (0, 0), Some(Rank::Marshal))]);
        let valid = validate_move(&state, &mv(Team::Red, (0, 0), (1, 0))).unwrap();
        assert_eq!(valid.path, vec![Coord::new(1, 0)]);
        assert!(!valid.is_slide());
        assert!(!valid.needs_rank);

        assert_eq!(
            validate_move(&state, &mv(Team::Red, (0, 0), (2, 0))),
            Err(InvalidMove::TooFar)
        );
        assert_eq!(
            validate_move(&state, &mv(Team::Red, (0, 0), (1, 1))),
            Err(InvalidMove::NotAligned)
        );
    }

    #[test]
    fn test_scout_slide_and_block() {
        let state = state_with(&[
            (Team::Red, (5, 1), Some(Rank::Scout)),
            (Team::Blue, (5, 6), Some(Rank::Miner)),
        ]);
        // Slide up to the enemy is fine
        let valid = validate_move(&state, &mv(Team::Red, (5, 1), (5, 6))).unwrap();
        assert!(valid.is_slide());
        assert_eq!(valid.interior().len(), 4);

        // Cannot pass through it
        assert_eq!(
            validate_move(&state, &mv(Team::Red, (5, 1), (5, 8))),
            Err(InvalidMove::PathBlocked)
        );
    }

    #[test]
    fn test_slide_blocked_by_lake() {
        let state = state_with(&[(Team::Red, (2, 1), Some(Rank::Scout))]);
        assert_eq!(
            validate_move(&state, &mv(Team::Red, (2, 1), (2, 8))),
            Err(InvalidMove::PathBlocked)
        );
        assert_eq!(
            validate_move(&state, &mv(Team::Red, (2, 1), (2, 4))),
            Err(InvalidMove::Impassable)
        );
    }

    #[test]
    fn test_immobile_and_friendly() {
        let state = state_with(&[
            (Team::Red, (0, 0), Some(Rank::Bomb)),
            (Team::Red, (1, 0), Some(Rank::Sergeant)),
        ]);
        assert_eq!(
            validate_move(&state, &mv(Team::Red, (0, 0), (0, 1))),
            Err(InvalidMove::Immobile)
        );
        assert_eq!(
            validate_move(&state, &mv(Team::Red, (1, 0), (0, 0))),
            Err(InvalidMove::FriendlyOccupied)
        );
    }

    #[test]
    fn test_identity_checks() {
        let state = state_with(&[(Team::Red, (0, 0), Some(Rank::Sergeant))]);
        let mut wrong_team = mv(Team::Red, (0, 0), (0, 1));
        wrong_team.team = Team::Blue;
        assert_eq!(validate_move(&state, &wrong_team), Err(InvalidMove::WrongTeam));

        let mut wrong_origin = mv(Team::Red, (0, 0), (0, 1));
        wrong_origin.origin = Coord::new(1, 0);
        assert_eq!(validate_move(&state, &wrong_origin), Err(InvalidMove::OriginMismatch));

        assert_eq!(
            validate_move(&state, &mv(Team::Red, (3, 3), (3, 4))),
            Err(InvalidMove::UnknownPawn)
        );
        assert_eq!(
            validate_move(&state, &mv(Team::Red, (0, 0), (0, -1))),
            Err(InvalidMove::OffBoard)
        );
        assert_eq!(
            validate_move(&state, &mv(Team::Red, (0, 0), (0, 0))),
            Err(InvalidMove::NotMoving)
        );
    }

    #[test]
    fn test_hidden_rank_slide_needs_proof() {
        let state = state_with(&[(Team::Blue, (0, 9), None)]);
        let step = validate_move(&state, &mv(Team::Blue, (0, 9), (0, 8))).unwrap();
        assert!(!step.needs_rank);

        let slide = validate_move(&state, &mv(Team::Blue, (0, 9), (0, 6))).unwrap();
        assert!(slide.needs_rank);
    }

    #[test]
    fn test_legal_moves() {
        let state = state_with(&[
            (Team::Red, (0, 0), Some(Rank::Scout)),
            (Team::Red, (1, 0), Some(Rank::Bomb)),
            (Team::Blue, (0, 3), Some(Rank::Flag)),
        ]);
        let moves = legal_moves(&state, Team::Red);
        // Scout can go up to (0,3) where it captures; right is friendly; others off-board.
        let targets: Vec<Coord> = moves.iter().map(|m| m.target).collect();
        assert_eq!(targets, vec![Coord::new(0, 1), Coord::new(0, 2), Coord::new(0, 3)]);
        for m in &moves {
            assert!(validate_move(&state, m).is_ok());
        }

        assert!(has_legal_move(&state, Team::Red));
        assert!(!has_legal_move(&state, Team::Blue));
    }

    #[test]
    fn test_unproven_movers() {
        let state = state_with(&[
            (Team::Red, (0, 0), None),
            (Team::Red, (1, 0), None),
            (Team::Red, (0, 1), None),
            (Team::Red, (5, 0), Some(Rank::Bomb)),
            (Team::Red, (8, 0), None),
        ]);
        // (0,0) is boxed in by its own side; known ranks are never listed
        let movers = unproven_movers(&state, Team::Red);
        let expected: BTreeSet<PawnId> = [(1, 0), (0, 1), (8, 0)]
            .into_iter()
            .map(|(x, y)| PawnId::new(Team::Red, Coord::new(x, y)))
            .collect();
        assert_eq!(movers, expected);
        assert!(unproven_movers(&state, Team::Blue).is_empty());
    }
}
