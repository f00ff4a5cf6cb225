//! Ranks and Battle Rules
//!
//! A rank's strength is data, not code: [`RankRules`] holds a power table,
//! a mobility table and a short list of named exceptions that are consulted
//! before the numeric comparison. The classic table ships as the default;
//! any other balance can be loaded from JSON.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use thiserror::Error;

// =============================================================================
// RANK
// =============================================================================

/// Pawn rank, fixed at setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rank {
    /// Capturing it wins the match
    Flag = 0,
    /// Sole counter to the Marshal
    Spy = 1,
    /// Slides any distance in a straight line
    Scout = 2,
    /// Defuses bombs
    Miner = 3,
    Sergeant = 4,
    Lieutenant = 5,
    Captain = 6,
    Major = 7,
    Colonel = 8,
    General = 9,
    /// Highest power
    Marshal = 10,
    /// Immobile, defeats every attacker except the Miner
    Bomb = 11,
}

impl Rank {
    /// Every rank in ascending tag order.
    pub const ALL: [Rank; 12] = [
        Rank::Flag,
        Rank::Spy,
        Rank::Scout,
        Rank::Miner,
        Rank::Sergeant,
        Rank::Lieutenant,
        Rank::Captain,
        Rank::Major,
        Rank::Colonel,
        Rank::General,
        Rank::Marshal,
        Rank::Bomb,
    ];

    /// Stable byte tag used in commitments.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Get rank from tag (0-11).
    pub fn from_tag(tag: u8) -> Option<Rank> {
        Rank::ALL.get(tag as usize).copied()
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

// =============================================================================
// RULES
// =============================================================================

/// How a rank moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mobility {
    /// Never moves (flags, bombs)
    Immobile,
    /// One orthogonal tile
    Step,
    /// Any distance along a clear row or column
    Slide,
}

/// "`winner` always defeats `loser`", regardless of power or who moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankException {
    pub winner: Rank,
    pub loser: Rank,
}

/// Result of comparing two ranks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FightOutcome {
    /// The first rank survives
    FirstWins,
    /// The second rank survives
    SecondWins,
    /// Neither survives
    BothDie,
}

/// Errors loading a rank table.
#[derive(Debug, Error)]
pub enum RulesError {
    /// JSON did not parse.
    #[error("invalid rank rules: {0}")]
    Parse(#[from] serde_json::Error),

    /// A rank is missing from a table.
    #[error("rank {0} has no {1} entry")]
    MissingEntry(Rank, &'static str),
}

/// Power order, mobility and exceptions for every rank.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRules {
    /// Numeric power; higher wins.
    pub power: BTreeMap<Rank, u8>,
    /// Movement class per rank.
    pub mobility: BTreeMap<Rank, Mobility>,
    /// Checked before the power comparison.
    pub exceptions: Vec<RankException>,
    /// Losing this rank loses the match.
    pub objective: Rank,
}

impl Default for RankRules {
    fn default() -> Self {
        Self::classic()
    }
}

impl RankRules {
    /// Classic table: Spy beats Marshal, Miner beats Bomb.
    pub fn classic() -> Self {
        let power = Rank::ALL.iter().map(|rank| (*rank, rank.tag())).collect();
        let mobility = Rank::ALL
            .iter()
            .map(|rank| {
                let mobility = match rank {
                    Rank::Flag | Rank::Bomb => Mobility::Immobile,
                    Rank::Scout => Mobility::Slide,
                    _ => Mobility::Step,
                };
                (*rank, mobility)
            })
            .collect();

        Self {
            power,
            mobility,
            exceptions: vec![
                RankException { winner: Rank::Spy, loser: Rank::Marshal },
                RankException { winner: Rank::Miner, loser: Rank::Bomb },
            ],
            objective: Rank::Flag,
        }
    }

    /// Load from JSON, requiring a power and mobility entry for every rank.
    pub fn from_json(json: &str) -> Result<Self, RulesError> {
        let rules: RankRules = serde_json::from_str(json)?;
        for rank in Rank::ALL {
            if !rules.power.contains_key(&rank) {
                return Err(RulesError::MissingEntry(rank, "power"));
            }
            if !rules.mobility.contains_key(&rank) {
                return Err(RulesError::MissingEntry(rank, "mobility"));
            }
        }
        Ok(rules)
    }

    /// Power of a rank (0 when absent).
    #[inline]
    pub fn power(&self, rank: Rank) -> u8 {
        self.power.get(&rank).copied().unwrap_or(0)
    }

    /// Mobility of a rank (immobile when absent).
    #[inline]
    pub fn mobility(&self, rank: Rank) -> Mobility {
        self.mobility.get(&rank).copied().unwrap_or(Mobility::Immobile)
    }

    /// Is this the rank whose capture ends the match?
    #[inline]
    pub fn is_objective(&self, rank: Rank) -> bool {
        rank == self.objective
    }

    /// Compare two ranks: exceptions first, then power.
    pub fn fight(&self, first: Rank, second: Rank) -> FightOutcome {
        for exception in &self.exceptions {
            if exception.winner == first && exception.loser == second {
                return FightOutcome::FirstWins;
            }
            if exception.winner == second && exception.loser == first {
                return FightOutcome::SecondWins;
            }
        }

        match self.power(first).cmp(&self.power(second)) {
            std::cmp::Ordering::Greater => FightOutcome::FirstWins,
            std::cmp::Ordering::Less => FightOutcome::SecondWins,
            std::cmp::Ordering::Equal => FightOutcome::BothDie,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_order() {
        let rules = RankRules::classic();
        assert_eq!(rules.fight(Rank::Marshal, Rank::General), FightOutcome::FirstWins);
        assert_eq!(rules.fight(Rank::Sergeant, Rank::Captain), FightOutcome::SecondWins);
        assert_eq!(rules.fight(Rank::Scout, Rank::Scout), FightOutcome::BothDie);
    }

    #[test]
    fn test_exceptions_override_power() {
        let rules = RankRules::classic();
        assert_eq!(rules.fight(Rank::Spy, Rank::Marshal), FightOutcome::FirstWins);
        assert_eq!(rules.fight(Rank::Marshal, Rank::Spy), FightOutcome::SecondWins);
        assert_eq!(rules.fight(Rank::Miner, Rank::Bomb), FightOutcome::FirstWins);
        assert_eq!(rules.fight(Rank::Bomb, Rank::Miner), FightOutcome::SecondWins);

        // The spy is still weak against everyone else
        assert_eq!(rules.fight(Rank::Spy, Rank::General), FightOutcome::SecondWins);
        // Bombs beat everyone else
        assert_eq!(rules.fight(Rank::Marshal, Rank::Bomb), FightOutcome::SecondWins);
    }

    #[test]
    fn test_anything_captures_flag() {
        let rules = RankRules::classic();
        for rank in Rank::ALL {
            if rank != Rank::Flag {
                assert_eq!(rules.fight(rank, Rank::Flag), FightOutcome::FirstWins, "{rank}");
            }
        }
    }

    #[test]
    fn test_mobility() {
        let rules = RankRules::classic();
        assert_eq!(rules.mobility(Rank::Scout), Mobility::Slide);
        assert_eq!(rules.mobility(Rank::Bomb), Mobility::Immobile);
        assert_eq!(rules.mobility(Rank::Flag), Mobility::Immobile);
        assert_eq!(rules.mobility(Rank::Marshal), Mobility::Step);
    }

    #[test]
    fn test_rules_json_roundtrip_and_validation() {
        let rules = RankRules::classic();
        let json = serde_json::to_string(&rules).unwrap();
        assert_eq!(RankRules::from_json(&json).unwrap(), rules);

        let mut partial = rules.clone();
        partial.power.remove(&Rank::Major);
        let json = serde_json::to_string(&partial).unwrap();
        assert!(matches!(
            RankRules::from_json(&json),
            Err(RulesError::MissingEntry(Rank::Major, "power"))
        ));
    }

    #[test]
    fn test_tag_roundtrip() {
        for rank in Rank::ALL {
            assert_eq!(Rank::from_tag(rank.tag()), Some(rank));
        }
        assert_eq!(Rank::from_tag(12), None);
    }
}
