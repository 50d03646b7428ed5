//! Board grid - fixed 10x20 occupancy matrix
//!
//! Cell values: 0 = empty, 1-7 = locked shape id + 1, 8 = garbage.
//! Rows are indexed top to bottom. Every accessor checks bounds before
//! touching the backing array.

use serde::{Deserialize, Serialize};

use super::piece::Matrix;

pub const COLS: usize = 10;
pub const ROWS: usize = 20;

pub const EMPTY: u8 = 0;
pub const GARBAGE: u8 = 8;

pub type Row = [u8; COLS];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Grid {
    cells: [Row; ROWS],
}

impl Grid {
    pub fn new() -> Self {
        Self {
            cells: [[EMPTY; COLS]; ROWS],
        }
    }

    fn in_bounds(col: i32, row: i32) -> bool {
        col >= 0 && col < COLS as i32 && row >= 0 && row < ROWS as i32
    }

    /// Cell value, or `None` outside the grid
    pub fn get(&self, col: i32, row: i32) -> Option<u8> {
        if !Self::in_bounds(col, row) {
            return None;
        }
        Some(self.cells[row as usize][col as usize])
    }

    /// Write a cell; out-of-bounds writes are dropped and return false
    pub fn set(&mut self, col: i32, row: i32, value: u8) -> bool {
        if !Self::in_bounds(col, row) {
            return false;
        }
        self.cells[row as usize][col as usize] = value;
        true
    }

    pub fn rows(&self) -> &[Row; ROWS] {
        &self.cells
    }

    pub fn is_row_full(&self, row: usize) -> bool {
        self.cells
            .get(row)
            .map(|r| r.iter().all(|&c| c != EMPTY))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|r| r.iter().all(|&c| c == EMPTY))
    }

    /// Whether `matrix` placed with its origin at `(x, y)` overlaps a wall,
    /// the floor, or a filled cell. Cells above the grid only hit the walls.
    pub fn collides(&self, matrix: &Matrix, x: i32, y: i32) -> bool {
        matrix.cells().any(|(dx, dy)| {
            let col = x + dx;
            let row = y + dy;
            if col < 0 || col >= COLS as i32 || row >= ROWS as i32 {
                return true;
            }
            row >= 0 && self.cells[row as usize][col as usize] != EMPTY
        })
    }

    /// Remove every full row, shifting everything above down.
    /// Scans bottom to top and returns the number of rows removed.
    pub fn clear_full_rows(&mut self) -> u32 {
        let mut cleared = 0;
        let mut row = ROWS;
        while row > 0 {
            if self.is_row_full(row - 1) {
                self.cells.copy_within(0..row - 1, 1);
                self.cells[0] = [EMPTY; COLS];
                cleared += 1;
                // the row that slid into place needs checking too
            } else {
                row -= 1;
            }
        }
        cleared
    }

    /// Push a garbage row with a single hole at `hole` onto the bottom.
    /// The top row is discarded.
    pub fn push_garbage_row(&mut self, hole: usize) {
        let mut garbage = [GARBAGE; COLS];
        if let Some(cell) = garbage.get_mut(hole) {
            *cell = EMPTY;
        }
        self.cells.copy_within(1..ROWS, 0);
        self.cells[ROWS - 1] = garbage;
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}
