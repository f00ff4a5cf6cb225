//! Board Topology
//!
//! Static grid definition: passability, setup zones and per-rank population
//! limits. Immutable for the lifetime of a match.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::coord::Coord;
use crate::game::rank::Rank;
use crate::game::state::Team;

/// A single board tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    /// Can pawns stand on or cross this tile?
    pub passable: bool,
    /// Only this team may place pawns here during setup.
    #[serde(default)]
    pub setup_team: Option<Team>,
    /// Auto-setup band (0 = back row). Used only by [`crate::game::setup::auto_setup`].
    #[serde(default)]
    pub auto_setup_zone: Option<u8>,
}

impl Tile {
    /// Open tile with no setup restriction.
    pub const OPEN: Tile = Tile {
        passable: true,
        setup_team: None,
        auto_setup_zone: None,
    };

    /// Impassable tile (lake).
    pub const BLOCKED: Tile = Tile {
        passable: false,
        setup_team: None,
        auto_setup_zone: None,
    };
}

/// Errors building or loading a board.
#[derive(Debug, Error)]
pub enum BoardError {
    /// JSON did not parse.
    #[error("invalid board definition: {0}")]
    Parse(#[from] serde_json::Error),

    /// Width or height is not positive.
    #[error("board dimensions must be positive, got {width}x{height}")]
    Dimensions {
        /// Declared width.
        width: i32,
        /// Declared height.
        height: i32,
    },

    /// Tile list length does not match the dimensions.
    #[error("expected {expected} tiles, got {got}")]
    TileCount {
        /// width * height
        expected: usize,
        /// Actual tiles supplied
        got: usize,
    },
}

/// Board definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Display name.
    pub name: String,
    width: i32,
    height: i32,
    /// Row-major tiles, index = y * width + x.
    tiles: Vec<Tile>,
    /// Maximum pawns of each rank per team.
    max_pawns: BTreeMap<Rank, u32>,
}

impl Board {
    /// Create an open board of the given size.
    pub fn new(
        name: impl Into<String>,
        width: i32,
        height: i32,
        max_pawns: BTreeMap<Rank, u32>,
    ) -> Result<Self, BoardError> {
        if width <= 0 || height <= 0 {
            return Err(BoardError::Dimensions { width, height });
        }
        Ok(Self {
            name: name.into(),
            width,
            height,
            tiles: vec![Tile::OPEN; (width * height) as usize],
            max_pawns,
        })
    }

    /// Classic 10x10 board: two 2x2 lakes, four setup rows per team.
    ///
    /// Red sets up on rows 0-3, Blue on rows 6-9.
    pub fn classic() -> Self {
        let mut tiles = Vec::with_capacity(100);
        for y in 0..10 {
            for x in 0..10 {
                let lake = (y == 4 || y == 5) && matches!(x, 2 | 3 | 6 | 7);
                let (setup_team, zone) = match y {
                    0..=3 => (Some(Team::Red), Some(y as u8)),
                    6..=9 => (Some(Team::Blue), Some((9 - y) as u8)),
                    _ => (None, None),
                };
                tiles.push(if lake {
                    Tile::BLOCKED
                } else {
                    Tile {
                        passable: true,
                        setup_team,
                        auto_setup_zone: zone,
                    }
                });
            }
        }

        Self {
            name: "classic".to_string(),
            width: 10,
            height: 10,
            tiles,
            max_pawns: classic_population(),
        }
    }

    /// Load a board definition from JSON.
    pub fn from_json(json: &str) -> Result<Self, BoardError> {
        let board: Board = serde_json::from_str(json)?;
        if board.width <= 0 || board.height <= 0 {
            return Err(BoardError::Dimensions {
                width: board.width,
                height: board.height,
            });
        }
        let expected = (board.width * board.height) as usize;
        if board.tiles.len() != expected {
            return Err(BoardError::TileCount {
                expected,
                got: board.tiles.len(),
            });
        }
        Ok(board)
    }

    /// Board width in tiles.
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Board height in tiles.
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Is the coordinate on the board?
    #[inline]
    pub fn contains(&self, c: Coord) -> bool {
        c.x >= 0 && c.y >= 0 && c.x < self.width && c.y < self.height
    }

    /// Tile at a coordinate.
    pub fn tile(&self, c: Coord) -> Option<&Tile> {
        if !self.contains(c) {
            return None;
        }
        self.tiles.get((c.y * self.width + c.x) as usize)
    }

    /// Replace a tile (board authoring and tests).
    pub fn set_tile(&mut self, c: Coord, tile: Tile) -> bool {
        if !self.contains(c) {
            return false;
        }
        let index = (c.y * self.width + c.x) as usize;
        self.tiles[index] = tile;
        true
    }

    /// On board and passable.
    #[inline]
    pub fn is_passable(&self, c: Coord) -> bool {
        self.tile(c).map(|t| t.passable).unwrap_or(false)
    }

    /// Passable tiles a team may use at setup, in coordinate order.
    pub fn setup_tiles(&self, team: Team) -> Vec<Coord> {
        let mut coords: Vec<Coord> = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| Coord::new(x, y)))
            .filter(|c| {
                self.tile(*c)
                    .map(|t| t.passable && t.setup_team == Some(team))
                    .unwrap_or(false)
            })
            .collect();
        coords.sort();
        coords
    }

    /// Maximum pawns of a rank per team.
    pub fn max_pawns(&self, rank: Rank) -> u32 {
        self.max_pawns.get(&rank).copied().unwrap_or(0)
    }

    /// Full population table.
    pub fn population(&self) -> &BTreeMap<Rank, u32> {
        &self.max_pawns
    }
}

/// Classic 40-pawn army.
pub fn classic_population() -> BTreeMap<Rank, u32> {
    BTreeMap::from([
        (Rank::Flag, 1),
        (Rank::Spy, 1),
        (Rank::Scout, 8),
        (Rank::Miner, 5),
        (Rank::Sergeant, 4),
        (Rank::Lieutenant, 4),
        (Rank::Captain, 4),
        (Rank::Major, 3),
        (Rank::Colonel, 2),
        (Rank::General, 1),
        (Rank::Marshal, 1),
        (Rank::Bomb, 6),
    ])
}
