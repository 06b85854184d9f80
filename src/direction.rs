use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Integer cell coordinate / displacement on the world grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vector {
    pub x: i32,
    pub y: i32,
}

impl Vector {
    pub const ZERO: Vector = Vector { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0
    }

    /// Euclidean length of the displacement.
    pub fn length(&self) -> f32 {
        ((self.x * self.x + self.y * self.y) as f32).sqrt()
    }

    /// Chessboard distance, the number of 8-way steps to cover this displacement.
    pub fn chebyshev(&self) -> i32 {
        self.x.abs().max(self.y.abs())
    }
}

impl Add for Vector {
    type Output = Vector;
    fn add(self, rhs: Vector) -> Vector {
        Vector::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector {
    type Output = Vector;
    fn sub(self, rhs: Vector) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl AddAssign for Vector {
    fn add_assign(&mut self, rhs: Vector) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vector {
    fn sub_assign(&mut self, rhs: Vector) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Neg for Vector {
    type Output = Vector;
    fn neg(self) -> Vector {
        Vector::new(-self.x, -self.y)
    }
}

/// One of the 8 compass directions, clockwise from north. Y grows southwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

/// Slope bound between "straight" and "diagonal" sectors when quantizing a
/// displacement to a compass direction: tan(67.5 degrees).
const SILVER_RATIO: f32 = 2.414_213_5;

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn dx(self) -> i32 {
        match self {
            Direction::North | Direction::South => 0,
            Direction::NorthEast | Direction::East | Direction::SouthEast => 1,
            Direction::SouthWest | Direction::West | Direction::NorthWest => -1,
        }
    }

    pub fn dy(self) -> i32 {
        match self {
            Direction::East | Direction::West => 0,
            Direction::SouthEast | Direction::South | Direction::SouthWest => 1,
            Direction::North | Direction::NorthEast | Direction::NorthWest => -1,
        }
    }

    pub fn vector(self) -> Vector {
        Vector::new(self.dx(), self.dy())
    }

    /// Rotate counter-clockwise by `count` eighth turns.
    pub fn left(self, count: i32) -> Direction {
        Direction::ALL[(self as i32 - count).rem_euclid(8) as usize]
    }

    /// Rotate clockwise by `count` eighth turns.
    pub fn right(self, count: i32) -> Direction {
        Direction::ALL[(self as i32 + count).rem_euclid(8) as usize]
    }

    pub fn opposite(self) -> Direction {
        self.right(4)
    }

    /// Quantize a displacement to the nearest compass direction. A delta whose
    /// slope stays within the silver-ratio sector of an axis maps to that axis,
    /// anything in between maps to the diagonal. Returns `None` for the zero
    /// displacement.
    pub fn from_delta(dx: i32, dy: i32) -> Option<Direction> {
        if dx == 0 && dy == 0 {
            return None;
        }
        let ax = dx.abs() as f32;
        let ay = dy.abs() as f32;
        let (sx, sy) = if ax > ay * SILVER_RATIO {
            (dx.signum(), 0)
        } else if ay > ax * SILVER_RATIO {
            (0, dy.signum())
        } else {
            (dx.signum(), dy.signum())
        };
        let direction = match (sx, sy) {
            (0, -1) => Direction::North,
            (1, -1) => Direction::NorthEast,
            (1, 0) => Direction::East,
            (1, 1) => Direction::SouthEast,
            (0, 1) => Direction::South,
            (-1, 1) => Direction::SouthWest,
            (-1, 0) => Direction::West,
            (-1, -1) => Direction::NorthWest,
            _ => unreachable!("signum pair out of range"),
        };
        Some(direction)
    }

    pub fn from_vector(v: Vector) -> Option<Direction> {
        Self::from_delta(v.x, v.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_is_cyclic() {
        for dir in Direction::ALL {
            assert_eq!(dir.left(8), dir);
            assert_eq!(dir.right(8), dir);
            assert_eq!(dir.left(3), dir.right(5));
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn opposite_negates_the_step() {
        for dir in Direction::ALL {
            assert_eq!(dir.opposite().vector(), -dir.vector());
        }
    }

    #[test]
    fn unit_deltas_map_to_their_direction() {
        for dir in Direction::ALL {
            assert_eq!(Direction::from_delta(dir.dx(), dir.dy()), Some(dir));
        }
        assert_eq!(Direction::from_delta(0, 0), None);
    }

    #[test]
    fn long_deltas_quantize_by_sector() {
        // Slope well below the diagonal sector stays on the axis.
        assert_eq!(Direction::from_delta(10, 1), Some(Direction::East));
        assert_eq!(Direction::from_delta(-10, -1), Some(Direction::West));
        assert_eq!(Direction::from_delta(1, 10), Some(Direction::South));
        // Slope near 1 lands on the diagonal.
        assert_eq!(Direction::from_delta(9, 8), Some(Direction::SouthEast));
        assert_eq!(Direction::from_delta(-7, -8), Some(Direction::NorthWest));
    }

    #[test]
    fn vector_algebra() {
        let a = Vector::new(3, -4);
        assert_eq!(a.length(), 5.0);
        assert_eq!(a.chebyshev(), 4);
        assert_eq!(a + Vector::new(-3, 4), Vector::ZERO);
        assert!((a - a).is_zero());
    }
}
