//! Contest Detection and Battles
//!
//! Contest detection looks only at positions and the two validated moves, so
//! the set of battles is known before any hidden rank is disclosed. Battles
//! then compare ranks through [`RankRules::fight`].
//!
//! Interactions between the two movers, evaluated on the pre-move board:
//! - both targets equal: battle on that tile
//! - each reaches the other's path or origin (same line, opposite ways):
//!   head-on battle, the survivor ends on its own target
//! - one mover stops strictly inside the other's slide path: the slider is
//!   intercepted there
//! - anything else (crossing, chasing into a vacated tile): no battle
//!
//! A mover that is not caught by the other mover attacks whatever enemy
//! stands still on its target.

use std::collections::BTreeMap;

use crate::core::coord::Coord;
use crate::game::events::{BattleEvent, RevealedRank};
use crate::game::movement::ValidMove;
use crate::game::rank::FightOutcome;
use crate::game::resolve::ResolveError;
use crate::game::state::{BoardState, PawnId};

/// How two pawns came to fight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContestKind {
    /// Mover against a stationary enemy
    Attack,
    /// Both movers chose the same tile
    Collide,
    /// Movers ran into each other along one line
    HeadOn,
    /// A mover stopped inside the other's slide path
    Intercept,
}

/// A battle that will happen this turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contest {
    /// Interaction type
    pub kind: ContestKind,
    /// Pawns involved, ascending
    pub participants: Vec<PawnId>,
    /// Tile reported when nobody survives
    pub tile: Coord,
    /// Where each participant stands if it survives
    pub destinations: BTreeMap<PawnId, Coord>,
}

impl Contest {
    fn between(kind: ContestKind, tile: Coord, a: (PawnId, Coord), b: (PawnId, Coord)) -> Self {
        let mut participants = vec![a.0, b.0];
        participants.sort();
        Self {
            kind,
            participants,
            tile,
            destinations: BTreeMap::from([a, b]),
        }
    }
}

/// Find every contest implied by this turn's valid moves.
pub fn detect_contests(
    state: &BoardState,
    red: Option<&ValidMove>,
    blue: Option<&ValidMove>,
) -> Vec<Contest> {
    let mut contests = Vec::new();

    if let (Some(r), Some(b)) = (red, blue) {
        if let Some(contest) = mover_contest(r, b) {
            contests.push(contest);
            return contests;
        }
    }

    for (mover, other) in [(red, blue), (blue, red)] {
        if let Some(m) = mover {
            if let Some(contest) = stationary_attack(state, m, other) {
                contests.push(contest);
            }
        }
    }

    contests.sort_by(|a, b| a.participants.cmp(&b.participants));
    contests
}

/// Contest between the two movers, if their moves interact.
fn mover_contest(r: &ValidMove, b: &ValidMove) -> Option<Contest> {
    let (rt, bt) = (r.mv.target, b.mv.target);
    let (rp, bp) = (r.mv.pawn, b.mv.pawn);

    if rt == bt {
        return Some(Contest::between(ContestKind::Collide, rt, (rp, rt), (bp, bt)));
    }

    let r_reaches_b = rt == b.mv.origin || b.path.contains(&rt);
    let b_reaches_r = bt == r.mv.origin || r.path.contains(&bt);
    if r_reaches_b && b_reaches_r {
        let tile = if rp < bp { rt } else { bt };
        return Some(Contest::between(ContestKind::HeadOn, tile, (rp, rt), (bp, bt)));
    }

    if r.interior().contains(&bt) {
        return Some(Contest::between(ContestKind::Intercept, bt, (rp, bt), (bp, bt)));
    }
    if b.interior().contains(&rt) {
        return Some(Contest::between(ContestKind::Intercept, rt, (rp, rt), (bp, rt)));
    }

    None
}

/// Mover landing on an enemy that does not move this turn.
fn stationary_attack(
    state: &BoardState,
    mover: &ValidMove,
    other: Option<&ValidMove>,
) -> Option<Contest> {
    let target = mover.mv.target;
    let defender = state.occupant(target)?;
    if defender.team() == mover.mv.team {
        return None;
    }
    if other.map(|o| o.mv.pawn == defender.id).unwrap_or(false) {
        return None;
    }
    Some(Contest::between(
        ContestKind::Attack,
        target,
        (mover.mv.pawn, target),
        (defender.id, defender.position),
    ))
}

/// Decide a contest: who dies, what gets revealed.
///
/// Only reads `state`; the caller applies the result.
pub fn fight(state: &BoardState, contest: &Contest) -> Result<BattleEvent, ResolveError> {
    let participants = &contest.participants;
    if participants.is_empty() || participants.len() > 2 {
        return Err(ResolveError::MalformedBattle {
            participants: participants.len(),
        });
    }

    let mut revealed = Vec::with_capacity(participants.len());
    for id in participants {
        let pawn = state.pawn(id).ok_or(ResolveError::UnknownRank(*id))?;
        let rank = pawn.rank.ok_or(ResolveError::UnknownRank(*id))?;
        revealed.push(RevealedRank {
            pawn: *id,
            rank,
            was_hidden: !pawn.revealed,
        });
    }

    let casualties = match revealed.as_slice() {
        [first, second] => match state.rules.fight(first.rank, second.rank) {
            FightOutcome::FirstWins => vec![second.pawn],
            FightOutcome::SecondWins => vec![first.pawn],
            FightOutcome::BothDie => vec![first.pawn, second.pawn],
        },
        _ => Vec::new(),
    };

    let survivor = participants.iter().find(|p| !casualties.contains(*p));
    let tile = match (survivor, casualties.len()) {
        (Some(p), n) if n + 1 == participants.len() => {
            contest.destinations.get(p).copied().unwrap_or(contest.tile)
        }
        _ => contest.tile,
    };

    Ok(BattleEvent {
        participants: participants.clone(),
        casualties,
        tile,
        revealed,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;
    use crate::game::board::Board;
    use crate::game::movement::{validate_move, QueuedMove};
    use crate::game::rank::{Rank, RankRules};
    use crate::game::state::Team;

    fn setup(pawns: &[(Team, (i32, i32), Rank)]) -> BoardState {
        let mut state = BoardState::new(Arc::new(Board::classic()), Arc::new(RankRules::classic()));
        for (team, (x, y), rank) in pawns {
            assert!(state.add_pawn(PawnId::new(*team, Coord::new(*x, *y)), Some(*rank)));
        }
        state
    }

    fn valid(state: &BoardState, team: Team, from: (i32, i32), to: (i32, i32)) -> ValidMove {
        let origin = Coord::new(from.0, from.1);
        let mv = QueuedMove::new(team, PawnId::new(team, origin), origin, Coord::new(to.0, to.1));
        validate_move(state, &mv).unwrap()
    }

    #[test]
    fn test_collide_same_target() {
        let state = setup(&[
            (Team::Red, (4, 3), Rank::Captain),
            (Team::Blue, (4, 5), Rank::Major),
        ]);
        let r = valid(&state, Team::Red, (4, 3), (4, 4));
        let b = valid(&state, Team::Blue, (4, 5), (4, 4));
        let contests = detect_contests(&state, Some(&r), Some(&b));
        assert_eq!(contests.len(), 1);
        assert_eq!(contests[0].kind, ContestKind::Collide);
        assert_eq!(contests[0].tile, Coord::new(4, 4));
    }

    #[test]
    fn test_swap_is_head_on() {
        let state = setup(&[
            (Team::Red, (4, 4), Rank::Captain),
            (Team::Blue, (4, 5), Rank::Major),
        ]);
        let r = valid(&state, Team::Red, (4, 4), (4, 5));
        let b = valid(&state, Team::Blue, (4, 5), (4, 4));
        let contests = detect_contests(&state, Some(&r), Some(&b));
        assert_eq!(contests.len(), 1);
        assert_eq!(contests[0].kind, ContestKind::HeadOn);
    }

    #[test]
    fn test_intercept_mid_slide() {
        let state = setup(&[
            (Team::Red, (5, 1), Rank::Scout),
            (Team::Blue, (4, 3), Rank::Sergeant),
        ]);
        let r = valid(&state, Team::Red, (5, 1), (5, 8));
        let b = valid(&state, Team::Blue, (4, 3), (5, 3));
        let contests = detect_contests(&state, Some(&r), Some(&b));
        assert_eq!(contests.len(), 1);
        assert_eq!(contests[0].kind, ContestKind::Intercept);
        assert_eq!(contests[0].tile, Coord::new(5, 3));
    }

    #[test]
    fn test_chase_into_vacated_tile() {
        let state = setup(&[
            (Team::Red, (4, 3), Rank::Captain),
            (Team::Blue, (4, 4), Rank::Major),
        ]);
        let r = valid(&state, Team::Red, (4, 3), (4, 4));
        let b = valid(&state, Team::Blue, (4, 4), (5, 4));
        assert!(detect_contests(&state, Some(&r), Some(&b)).is_empty());
    }

    #[test]
    fn test_crossing_paths_no_battle() {
        let state = setup(&[
            (Team::Red, (0, 3), Rank::Scout),
            (Team::Blue, (4, 9), Rank::Scout),
        ]);
        // Both slides pass over (4,3)
        let r = valid(&state, Team::Red, (0, 3), (9, 3));
        let b = valid(&state, Team::Blue, (4, 9), (4, 0));
        assert!(detect_contests(&state, Some(&r), Some(&b)).is_empty());
    }

    #[test]
    fn test_two_independent_attacks_sorted() {
        let state = setup(&[
            (Team::Red, (0, 3), Rank::Marshal),
            (Team::Blue, (0, 4), Rank::General),
            (Team::Blue, (9, 6), Rank::Sergeant),
            (Team::Red, (9, 5), Rank::Miner),
        ]);
        let r = valid(&state, Team::Red, (0, 3), (0, 4));
        let b = valid(&state, Team::Blue, (9, 6), (9, 5));
        let contests = detect_contests(&state, Some(&r), Some(&b));
        assert_eq!(contests.len(), 2);
        assert!(contests.iter().all(|c| c.kind == ContestKind::Attack));
        assert!(contests[0].participants < contests[1].participants);
    }

    #[test]
    fn test_fight_reports_reveals_and_tile() {
        let state = setup(&[
            (Team::Red, (0, 3), Rank::Marshal),
            (Team::Blue, (0, 4), Rank::General),
        ]);
        let r = valid(&state, Team::Red, (0, 3), (0, 4));
        let contests = detect_contests(&state, Some(&r), None);
        let event = fight(&state, &contests[0]).unwrap();

        let general = PawnId::new(Team::Blue, Coord::new(0, 4));
        assert_eq!(event.casualties, vec![general]);
        assert_eq!(event.tile, Coord::new(0, 4));
        assert_eq!(event.revealed.len(), 2);
        assert!(event.revealed.iter().all(|r| r.was_hidden));
    }

    #[test]
    fn test_fight_requires_ranks() {
        let mut state = setup(&[
            (Team::Red, (0, 3), Rank::Marshal),
            (Team::Blue, (0, 4), Rank::General),
        ]);
        let r = valid(&state, Team::Red, (0, 3), (0, 4));
        let contests = detect_contests(&state, Some(&r), None);
        let general = PawnId::new(Team::Blue, Coord::new(0, 4));
        state.pawn_mut(&general).unwrap().rank = None;

        assert!(matches!(
            fight(&state, &contests[0]),
            Err(ResolveError::UnknownRank(id)) if id == general
        ));
    }

    #[test]
    fn test_malformed_battle() {
        let state = setup(&[]);
        let contest = Contest {
            kind: ContestKind::Attack,
            participants: Vec::new(),
            tile: Coord::new(0, 0),
            destinations: BTreeMap::new(),
        };
        assert!(matches!(
            fight(&state, &contest),
            Err(ResolveError::MalformedBattle { participants: 0 })
        ));
    }
}
