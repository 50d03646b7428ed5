//! Piece shapes, rotation states and wall kick tables
//!
//! Canonical shapes are stored once and never mutated. Every rotated footprint
//! is derived by `rotated_matrix`, and kick candidates come from
//! `kick_offsets`. Both are pure functions of the shape and rotation state.
//!
//! Coordinates are grid coordinates: x grows to the right, y grows downward.

use serde::{Deserialize, Serialize};

/// Column where new pieces appear
pub const SPAWN_X: i32 = 3;
/// Row where new pieces appear (above the visible grid)
pub const SPAWN_Y: i32 = -2;

/// The seven piece identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeId {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl ShapeId {
    pub const ALL: [ShapeId; 7] = [
        ShapeId::I,
        ShapeId::O,
        ShapeId::T,
        ShapeId::S,
        ShapeId::Z,
        ShapeId::J,
        ShapeId::L,
    ];

    /// Zero-based identity
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Value written into the grid when this shape locks
    pub fn cell_value(self) -> u8 {
        self.index() + 1
    }

    fn canonical(self) -> &'static [&'static [bool]] {
        const X: bool = true;
        const O: bool = false;
        match self {
            ShapeId::I => &[&[X, X, X, X]],
            ShapeId::O => &[&[X, X], &[X, X]],
            ShapeId::T => &[&[O, X, O], &[X, X, X]],
            ShapeId::S => &[&[O, X, X], &[X, X, O]],
            ShapeId::Z => &[&[X, X, O], &[O, X, X]],
            ShapeId::J => &[&[X, O, O], &[X, X, X]],
            ShapeId::L => &[&[O, O, X], &[X, X, X]],
        }
    }
}

/// Explicit rotation state, clockwise from spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    Spawn,
    Right,
    Reverse,
    Left,
}

impl Rotation {
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Self {
        match index % 4 {
            0 => Rotation::Spawn,
            1 => Rotation::Right,
            2 => Rotation::Reverse,
            _ => Rotation::Left,
        }
    }

    /// `(current + dir + 4) mod 4`; positive is clockwise
    pub fn turn(self, dir: i8) -> Self {
        let next = (self.index() as i16 + dir as i16).rem_euclid(4);
        Self::from_index(next as u8)
    }
}

/// Occupancy footprint of a piece, rows top to bottom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matrix {
    rows: Vec<Vec<bool>>,
}

impl Matrix {
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Self {
        Self { rows }
    }

    pub fn width(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<bool>] {
        &self.rows
    }

    /// Offsets `(dx, dy)` of every occupied cell
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.rows.iter().enumerate().flat_map(|(dy, row)| {
            row.iter()
                .enumerate()
                .filter(|&(_, &filled)| filled)
                .map(move |(dx, _)| (dx as i32, dy as i32))
        })
    }

    /// Quarter turn clockwise
    pub fn rotate_cw(&self) -> Self {
        let (w, h) = (self.width(), self.height());
        let rows = (0..w)
            .map(|r| (0..h).map(|c| self.rows[h - 1 - c][r]).collect())
            .collect();
        Self { rows }
    }
}

/// Footprint of `shape` in `rotation`, derived from the canonical table
pub fn rotated_matrix(shape: ShapeId, rotation: Rotation) -> Matrix {
    let canonical = shape
        .canonical()
        .iter()
        .map(|row| row.to_vec())
        .collect();
    let mut matrix = Matrix::from_rows(canonical);
    for _ in 0..rotation.index() {
        matrix = matrix.rotate_cw();
    }
    matrix
}

type KickRow = [(i32, i32); 5];

// Guideline SRS offsets with the y axis flipped for a downward-growing grid.
// Row order: 0->R, R->0, R->2, 2->R, 2->L, L->2, L->0, 0->L
static JLSTZ_KICKS: [KickRow; 8] = [
    [(0, 0), (-1, 0), (-1, -1), (0, 2), (-1, 2)],
    [(0, 0), (1, 0), (1, 1), (0, -2), (1, -2)],
    [(0, 0), (1, 0), (1, 1), (0, -2), (1, -2)],
    [(0, 0), (-1, 0), (-1, -1), (0, 2), (-1, 2)],
    [(0, 0), (1, 0), (1, -1), (0, 2), (1, 2)],
    [(0, 0), (-1, 0), (-1, 1), (0, -2), (-1, -2)],
    [(0, 0), (-1, 0), (-1, 1), (0, -2), (-1, -2)],
    [(0, 0), (1, 0), (1, -1), (0, 2), (1, 2)],
];

static I_KICKS: [KickRow; 8] = [
    [(0, 0), (-2, 0), (1, 0), (-2, 1), (1, -2)],
    [(0, 0), (2, 0), (-1, 0), (2, -1), (-1, 2)],
    [(0, 0), (-1, 0), (2, 0), (-1, -2), (2, 1)],
    [(0, 0), (1, 0), (-2, 0), (1, 2), (-2, -1)],
    [(0, 0), (2, 0), (-1, 0), (2, -1), (-1, 2)],
    [(0, 0), (-2, 0), (1, 0), (-2, 1), (1, -2)],
    [(0, 0), (1, 0), (-2, 0), (1, 2), (-2, -1)],
    [(0, 0), (-1, 0), (2, 0), (-1, -2), (2, 1)],
];

static NO_KICK: [(i32, i32); 1] = [(0, 0)];

fn kick_row(from: Rotation, to: Rotation) -> Option<usize> {
    use Rotation::*;
    match (from, to) {
        (Spawn, Right) => Some(0),
        (Right, Spawn) => Some(1),
        (Right, Reverse) => Some(2),
        (Reverse, Right) => Some(3),
        (Reverse, Left) => Some(4),
        (Left, Reverse) => Some(5),
        (Left, Spawn) => Some(6),
        (Spawn, Left) => Some(7),
        _ => None,
    }
}

/// Ordered kick candidates for rotating `shape` from `from` to `to`.
///
/// The O piece, and any non-adjacent transition, only tests the unmodified
/// position.
pub fn kick_offsets(shape: ShapeId, from: Rotation, to: Rotation) -> &'static [(i32, i32)] {
    let Some(row) = kick_row(from, to) else {
        return &NO_KICK;
    };
    match shape {
        ShapeId::O => &NO_KICK,
        ShapeId::I => &I_KICKS[row],
        _ => &JLSTZ_KICKS[row],
    }
}

/// The currently falling piece of one match instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePiece {
    pub shape: ShapeId,
    pub matrix: Matrix,
    pub x: i32,
    pub y: i32,
    pub rotation: Rotation,
}

impl ActivePiece {
    /// A fresh piece at the spawn offset in spawn orientation
    pub fn spawn(shape: ShapeId) -> Self {
        Self {
            shape,
            matrix: rotated_matrix(shape, Rotation::Spawn),
            x: SPAWN_X,
            y: SPAWN_Y,
            rotation: Rotation::Spawn,
        }
    }

    /// Absolute grid coordinates of every occupied cell
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.matrix
            .cells()
            .map(move |(dx, dy)| (self.x + dx, self.y + dy))
    }
}
