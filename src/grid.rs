use std::sync::Mutex;

use crate::ink::InkColor;

/// Background fill for a freshly allocated grid: all channels dark, alpha
/// opaque.
pub const OPAQUE_BLACK: u32 = 0xFF00_0000;

fn channel_shift(color: InkColor) -> u32 {
    match color {
        InkColor::Red => 0,
        InkColor::Green => 8,
        InkColor::Blue => 16,
    }
}

/// Extract the 8-bit channel matching `color` from a packed cell value.
pub fn channel(cell: u32, color: InkColor) -> u8 {
    ((cell >> channel_shift(color)) & 0xFF) as u8
}

/// Unpack a cell into `[red, green, blue, alpha]` bytes.
pub fn unpack(cell: u32) -> [u8; 4] {
    [
        channel(cell, InkColor::Red),
        channel(cell, InkColor::Green),
        channel(cell, InkColor::Blue),
        ((cell >> 24) & 0xFF) as u8,
    ]
}

/// A 2D grid with a packed color value per cell, shared by all traveler
/// threads. Cells pack four 8-bit channels (alpha in the high byte, then
/// blue, green, red) so a whole cell is read and written as one word. All
/// mutation goes through one mutex over the whole matrix.
#[derive(Debug)]
pub struct SharedGrid {
    rows: usize,
    cols: usize,
    cells: Mutex<Vec<u32>>,
}

impl SharedGrid {
    /// Create a new grid filled with the opaque background color.
    pub fn new(rows: usize, cols: usize) -> Self {
        SharedGrid {
            rows,
            cols,
            cells: Mutex::new(vec![OPAQUE_BLACK; rows * cols]),
        }
    }

    /// Map a coordinate pair to an index into the cell slice. Coordinates
    /// outside the grid are a movement-policy bug, not a recoverable
    /// condition, and panic rather than clamp.
    fn index(&self, row: usize, col: usize) -> usize {
        assert!(
            row < self.rows && col < self.cols,
            "cell ({}, {}) lies outside the {}x{} grid",
            row,
            col,
            self.rows,
            self.cols
        );
        row * self.cols + col
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Brighten the channel matching `color` at one cell, saturating at 255.
    /// The read-modify-write of the cell happens under the grid lock, so
    /// concurrent painters never lose an update.
    pub fn paint_step(&self, row: usize, col: usize, color: InkColor, increment: u8) {
        let index = self.index(row, col);
        let shift = channel_shift(color);
        let mut cells = self.cells.lock().unwrap();
        let cell = cells[index];
        let value = channel(cell, color).saturating_add(increment);
        cells[index] = (cell & !(0xFF << shift)) | ((value as u32) << shift);
    }

    /// Clone the whole matrix under the lock. The copy is internally
    /// consistent: no cell in it is ever a torn read of a concurrent paint.
    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot {
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.lock().unwrap().clone(),
        }
    }
}

/// An immutable whole-grid copy handed out to rendering code.
#[derive(Debug, Clone)]
pub struct GridSnapshot {
    rows: usize,
    cols: usize,
    cells: Vec<u32>,
}

impl GridSnapshot {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cell(&self, row: usize, col: usize) -> u32 {
        self.cells[row * self.cols + col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_packing_matches_layout() {
        let cell = 0xFF00_0000 | (3 << 16) | (2 << 8) | 1;
        assert_eq!(channel(cell, InkColor::Red), 1);
        assert_eq!(channel(cell, InkColor::Green), 2);
        assert_eq!(channel(cell, InkColor::Blue), 3);
        assert_eq!(unpack(cell), [1, 2, 3, 0xFF]);
    }

    #[test]
    fn test_paint_touches_only_its_channel() {
        let grid = SharedGrid::new(4, 4);
        grid.paint_step(2, 3, InkColor::Green, 32);
        let snapshot = grid.snapshot();
        assert_eq!(channel(snapshot.cell(2, 3), InkColor::Green), 32);
        assert_eq!(channel(snapshot.cell(2, 3), InkColor::Red), 0);
        assert_eq!(channel(snapshot.cell(2, 3), InkColor::Blue), 0);
        assert_eq!(snapshot.cell(0, 0), OPAQUE_BLACK);
    }

    #[test]
    fn test_paint_is_monotonic_and_saturates() {
        let grid = SharedGrid::new(2, 2);
        let mut previous = 0;
        for _ in 0..12 {
            grid.paint_step(1, 1, InkColor::Red, 25);
            let value = channel(grid.snapshot().cell(1, 1), InkColor::Red);
            assert!(value >= previous);
            previous = value;
        }
        assert_eq!(previous, 255);
        assert_eq!(channel(grid.snapshot().cell(1, 1), InkColor::Blue), 0);
    }

    #[test]
    #[should_panic]
    fn test_out_of_bounds_paint_panics() {
        let grid = SharedGrid::new(4, 4);
        grid.paint_step(4, 0, InkColor::Red, 1);
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let grid = SharedGrid::new(3, 3);
        let before = grid.snapshot();
        grid.paint_step(0, 1, InkColor::Blue, 200);
        assert_eq!(before.cell(0, 1), OPAQUE_BLACK);
        assert_eq!(channel(grid.snapshot().cell(0, 1), InkColor::Blue), 200);
    }
}
