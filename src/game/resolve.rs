//! Turn Resolution
//!
//! The authoritative turn function. Both participants run it on the same
//! inputs and must produce identical deltas.
//!
//! # Determinism
//!
//! - BTreeMap/BTreeSet for every collection that is iterated
//! - contests are found from positions only, then decided by rank
//! - battle events are sorted before they leave this module
//! - no clocks, no randomness

use std::collections::{BTreeMap, BTreeSet};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::coord::Coord;
use crate::core::hash::Digest;
use crate::game::battle::{detect_contests, fight, Contest};
use crate::game::events::BattleEvent;
use crate::game::movement::{has_legal_move, validate_move, InvalidMove, QueuedMove, ValidMove};
use crate::game::state::{BoardState, PawnId, PawnState, Team};

/// Engine invariant violations.
///
/// Malformed player moves never produce these; they are dropped instead.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A battle must have one or two participants.
    #[error("battle has {participants} participants")]
    MalformedBattle {
        /// How many were supplied
        participants: usize,
    },
    /// A rank needed to resolve the turn has not been supplied.
    #[error("rank of {0} is required but unknown")]
    UnknownRank(PawnId),
    /// Two alive pawns share a tile.
    #[error("two alive pawns occupy {0}")]
    OccupancyConflict(Coord),
}

/// Why a match ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinReason {
    /// The objective pawn was captured
    FlagCaptured,
    /// The side could not move
    NoLegalMoves,
    /// The side gave up or failed to prove a commitment
    Forfeit,
    /// The session's turn cap was reached
    TurnLimit,
}

/// Final result of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MatchOutcome {
    /// One side won
    Winner {
        /// Winning team
        team: Team,
        /// How
        reason: WinReason,
    },
    /// Nobody won
    Draw {
        /// How
        reason: WinReason,
    },
}

impl MatchOutcome {
    /// The winning team, if any.
    pub fn winner(&self) -> Option<Team> {
        match self {
            MatchOutcome::Winner { team, .. } => Some(*team),
            MatchOutcome::Draw { .. } => None,
        }
    }

    /// Reason the match ended.
    pub fn reason(&self) -> WinReason {
        match self {
            MatchOutcome::Winner { reason, .. } | MatchOutcome::Draw { reason } => *reason,
        }
    }
}

/// One pawn before and after a turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPawnDelta {
    /// State before the turn
    pub pre: PawnState,
    /// State after the turn
    pub post: PawnState,
}

impl SnapshotPawnDelta {
    /// Did anything about this pawn change?
    pub fn changed(&self) -> bool {
        self.pre != self.post
    }
}

/// Everything a turn produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnResolveDelta {
    /// Turn number of the resulting state
    pub turn: u32,
    /// Every pawn, keyed by id
    pub pawn_deltas: BTreeMap<PawnId, SnapshotPawnDelta>,
    /// Moves that passed validation, Red first
    pub applied_moves: Vec<QueuedMove>,
    /// Battles in ascending participant order
    pub battles: Vec<BattleEvent>,
    /// Set when the match ended this turn
    pub outcome: Option<MatchOutcome>,
    /// Hash of the resulting state
    #[serde(with = "crate::core::hash::hex_serde")]
    pub state_hash: Digest,
}

/// Position-only analysis of a turn.
///
/// Computed before any rank is disclosed so the protocol knows which ranks
/// have to be proven.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnPlan {
    /// Red's move, if it validated
    pub red: Option<ValidMove>,
    /// Blue's move, if it validated
    pub blue: Option<ValidMove>,
    /// Dropped moves and why
    pub rejected: Vec<(Team, InvalidMove)>,
    /// Battles that will happen
    pub contests: Vec<Contest>,
    /// Pawns whose rank the engine reads
    pub required_ranks: BTreeSet<PawnId>,
}

impl TurnPlan {
    /// Required ranks not yet known in `state`.
    pub fn unknown_ranks(&self, state: &BoardState) -> BTreeSet<PawnId> {
        self.required_ranks
            .iter()
            .filter(|id| state.pawn(id).map(|p| p.rank.is_none()).unwrap_or(true))
            .copied()
            .collect()
    }

    /// Valid moves, Red first.
    pub fn valid_moves(&self) -> impl Iterator<Item = &ValidMove> {
        self.red.iter().chain(self.blue.iter())
    }
}

/// Validate both moves and find the contests they cause.
pub fn plan(state: &BoardState, red: Option<&QueuedMove>, blue: Option<&QueuedMove>) -> TurnPlan {
    let mut turn_plan = TurnPlan::default();

    for (team, mv) in [(Team::Red, red), (Team::Blue, blue)] {
        let Some(mv) = mv else { continue };
        let checked = if mv.team != team {
            Err(InvalidMove::WrongTeam)
        } else {
            validate_move(state, mv)
        };
        match checked {
            Ok(valid) => {
                if valid.needs_rank {
                    turn_plan.required_ranks.insert(valid.mv.pawn);
                }
                match team {
                    Team::Red => turn_plan.red = Some(valid),
                    Team::Blue => turn_plan.blue = Some(valid),
                }
            }
            Err(reason) => {
                debug!(%team, pawn = %mv.pawn, %reason, "dropping invalid move");
                turn_plan.rejected.push((team, reason));
            }
        }
    }

    turn_plan.contests = detect_contests(state, turn_plan.red.as_ref(), turn_plan.blue.as_ref());
    for contest in &turn_plan.contests {
        turn_plan.required_ranks.extend(contest.participants.iter().copied());
    }

    turn_plan
}

/// Resolve one turn.
///
/// `state` must know the rank of every pawn the plan requires. Returns the
/// next state and a delta describing the turn.
pub fn resolve(
    state: &BoardState,
    red: Option<&QueuedMove>,
    blue: Option<&QueuedMove>,
) -> Result<(BoardState, TurnResolveDelta), ResolveError> {
    state.occupancy().map_err(ResolveError::OccupancyConflict)?;

    let turn_plan = plan(state, red, blue);
    #[cfg(feature = "debug-tracing")]
    tracing::trace!(turn = state.turn, plan = ?turn_plan, "turn plan");
    if let Some(id) = turn_plan.unknown_ranks(state).into_iter().next() {
        return Err(ResolveError::UnknownRank(id));
    }

    let mut battles = turn_plan
        .contests
        .iter()
        .map(|contest| fight(state, contest))
        .collect::<Result<Vec<_>, _>>()?;
    battles.sort();

    let mut next = state.clone();
    next.turn += 1;
    for pawn in next.pawns.values_mut() {
        pawn.moved = false;
        pawn.moved_as_scout = false;
    }

    // Moves first, then battles override positions
    for valid in turn_plan.valid_moves() {
        if let Some(pawn) = next.pawn_mut(&valid.mv.pawn) {
            pawn.position = valid.mv.target;
            pawn.moved = true;
            if valid.is_slide() {
                pawn.moved_as_scout = true;
                pawn.revealed = true;
            }
        }
    }

    let paired = battles_in_contest_order(&turn_plan, &battles);
    for (contest, event) in turn_plan.contests.iter().zip(paired) {
        debug!(
            participants = ?event.participants,
            casualties = ?event.casualties,
            tile = %event.tile,
            "battle"
        );
        for id in &contest.participants {
            let Some(pawn) = next.pawn_mut(id) else { continue };
            pawn.revealed = true;
            if event.killed(id) {
                pawn.kill();
            } else if let Some(dest) = contest.destinations.get(id) {
                pawn.position = *dest;
            }
        }
    }

    next.occupancy().map_err(ResolveError::OccupancyConflict)?;

    let outcome = check_outcome(&next, &battles);
    if let Some(outcome) = &outcome {
        info!(turn = next.turn, ?outcome, "match decided");
    }

    let pawn_deltas = state
        .pawns
        .iter()
        .filter_map(|(id, pre)| {
            next.pawn(id).map(|post| {
                (*id, SnapshotPawnDelta { pre: pre.clone(), post: post.clone() })
            })
        })
        .collect();

    let delta = TurnResolveDelta {
        turn: next.turn,
        pawn_deltas,
        applied_moves: turn_plan.valid_moves().map(|v| v.mv).collect(),
        battles,
        outcome,
        state_hash: next.compute_hash(),
    };

    Ok((next, delta))
}

/// Pair each contest with its event after sorting.
fn battles_in_contest_order<'a>(
    turn_plan: &TurnPlan,
    battles: &'a [BattleEvent],
) -> Vec<&'a BattleEvent> {
    turn_plan
        .contests
        .iter()
        .filter_map(|c| battles.iter().find(|b| b.participants == c.participants))
        .collect()
}

/// Win check on the post-turn board.
///
/// A captured objective decides the match before mobility is considered.
pub fn check_outcome(next: &BoardState, battles: &[BattleEvent]) -> Option<MatchOutcome> {
    let flag_lost = |team: Team| {
        battles.iter().any(|b| {
            b.revealed.iter().any(|r| {
                r.pawn.team == team && next.rules.is_objective(r.rank) && b.killed(&r.pawn)
            })
        })
    };

    match (flag_lost(Team::Red), flag_lost(Team::Blue)) {
        (true, true) => return Some(MatchOutcome::Draw { reason: WinReason::FlagCaptured }),
        (true, false) => {
            return Some(MatchOutcome::Winner { team: Team::Blue, reason: WinReason::FlagCaptured })
        }
        (false, true) => {
            return Some(MatchOutcome::Winner { team: Team::Red, reason: WinReason::FlagCaptured })
        }
        (false, false) => {}
    }

    match (has_legal_move(next, Team::Red), has_legal_move(next, Team::Blue)) {
        (false, false) => Some(MatchOutcome::Draw { reason: WinReason::NoLegalMoves }),
        (false, true) => Some(MatchOutcome::Winner { team: Team::Blue, reason: WinReason::NoLegalMoves }),
        (true, false) => Some(MatchOutcome::Winner { team: Team::Red, reason: WinReason::NoLegalMoves }),
        (true, true) => None,
    }
}
