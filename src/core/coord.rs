//! Board Coordinates
//!
//! Integer grid coordinates with an explicit off-board sentinel.
//! Ordering is (x, y) lexicographic so coordinates can key a BTreeMap.

use serde::{Serialize, Deserialize};

/// Sentinel component used for captured pawns.
pub const OFF_BOARD_COMPONENT: i32 = -666;

/// A tile coordinate on the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// Column
    pub x: i32,
    /// Row
    pub y: i32,
}

impl Coord {
    /// Position of every removed pawn.
    pub const OFF_BOARD: Coord = Coord {
        x: OFF_BOARD_COMPONENT,
        y: OFF_BOARD_COMPONENT,
    };

    /// The four orthogonal unit steps, in fixed order.
    pub const DIRECTIONS: [Coord; 4] = [
        Coord { x: 1, y: 0 },
        Coord { x: -1, y: 0 },
        Coord { x: 0, y: 1 },
        Coord { x: 0, y: -1 },
    ];

    /// Create a coordinate.
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Is this the off-board sentinel?
    #[inline]
    pub fn is_off_board(self) -> bool {
        self == Self::OFF_BOARD
    }

    /// Component-wise addition.
    #[inline]
    pub fn offset(self, delta: Coord) -> Coord {
        Coord::new(self.x.wrapping_add(delta.x), self.y.wrapping_add(delta.y))
    }

    /// Manhattan distance.
    #[inline]
    pub fn manhattan(self, other: Coord) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Unit step from `self` toward `other` if they share a row or column.
    ///
    /// Returns None for identical or non-aligned coordinates.
    pub fn direction_to(self, other: Coord) -> Option<Coord> {
        if self == other {
            return None;
        }
        if self.x == other.x {
            Some(Coord::new(0, (other.y - self.y).signum()))
        } else if self.y == other.y {
            Some(Coord::new((other.x - self.x).signum(), 0))
        } else {
            None
        }
    }

    /// Tiles strictly between `self` and `other` along a straight line.
    ///
    /// Empty when adjacent, identical, or not aligned.
    pub fn between(self, other: Coord) -> Vec<Coord> {
        let Some(step) = self.direction_to(other) else {
            return Vec::new();
        };
        let mut tiles = Vec::new();
        let mut cursor = self.offset(step);
        while cursor != other {
            tiles.push(cursor);
            cursor = cursor.offset(step);
        }
        tiles
    }

    /// Tiles travelled from `self` to `other`: origin excluded, target included.
    pub fn path_to(self, other: Coord) -> Vec<Coord> {
        let mut tiles = self.between(other);
        if self.direction_to(other).is_some() {
            tiles.push(other);
        }
        tiles
    }

    /// Write this coordinate as 8 little-endian bytes.
    pub fn to_le_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[..4].copy_from_slice(&self.x.to_le_bytes());
        out[4..].copy_from_slice(&self.y.to_le_bytes());
        out
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_to() {
        let a = Coord::new(5, 1);
        assert_eq!(a.direction_to(Coord::new(5, 9)), Some(Coord::new(0, 1)));
        assert_eq!(a.direction_to(Coord::new(0, 1)), Some(Coord::new(-1, 0)));
        assert_eq!(a.direction_to(Coord::new(6, 2)), None);
        assert_eq!(a.direction_to(a), None);
    }

    #[test]
    fn test_between_and_path() {
        let a = Coord::new(0, 0);
        let b = Coord::new(0, 3);
        assert_eq!(a.between(b), vec![Coord::new(0, 1), Coord::new(0, 2)]);
        assert_eq!(a.path_to(b), vec![Coord::new(0, 1), Coord::new(0, 2), b]);

        // Adjacent tiles have nothing in between
        assert!(a.between(Coord::new(1, 0)).is_empty());
        assert_eq!(a.path_to(Coord::new(1, 0)), vec![Coord::new(1, 0)]);

        // Diagonal has no path
        assert!(a.path_to(Coord::new(2, 2)).is_empty());
    }

    #[test]
    fn test_off_board_sentinel() {
        assert!(Coord::OFF_BOARD.is_off_board());
        assert_eq!(Coord::OFF_BOARD, Coord::new(-666, -666));
        assert!(!Coord::new(0, 0).is_off_board());
    }
}
