use std::thread;

use rand::Rng;

use crate::ink::InkColor;
use crate::sim::{SimState, TravelerStatus};

/// Ink units one single-cell step costs.
const INK_PER_STEP: u32 = 1;

/// How much a visit brightens the cell channel matching the traveler color.
const TRAIL_INCREMENT: u8 = 48;

/// The four cardinal headings a traveler can hold. North points toward row
/// zero, West toward column zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::North | Direction::South)
    }

    /// Row and column deltas of one step along this heading.
    fn step(self) -> (isize, isize) {
        match self {
            Direction::North => (-1, 0),
            Direction::South => (1, 0),
            Direction::East => (0, 1),
            Direction::West => (0, -1),
        }
    }
}

/// True for the four extreme row/column combinations. Reaching one of them
/// terminates a traveler.
pub(crate) fn is_corner(row: usize, col: usize, rows: usize, cols: usize) -> bool {
    (row == 0 || row == rows - 1) && (col == 0 || col == cols - 1)
}

/// Cells between the position and the grid edge along `dir`: the horizon
/// that bounds one straight run.
pub(crate) fn travel_room(row: usize, col: usize, rows: usize, cols: usize, dir: Direction) -> usize {
    match dir {
        Direction::North => row,
        Direction::South => rows - 1 - row,
        Direction::West => col,
        Direction::East => cols - 1 - col,
    }
}

/// Heading for the next run. Runs alternate axes: a vertical run is followed
/// by a horizontal one and vice versa, with the choice forced inward at the
/// grid edges and a fair coin elsewhere. The returned heading always has at
/// least one cell of room.
pub(crate) fn next_direction(
    row: usize,
    col: usize,
    rows: usize,
    cols: usize,
    prev: Direction,
    rng: &mut impl Rng,
) -> Direction {
    if prev.is_vertical() {
        if col == 0 {
            Direction::East
        } else if col == cols - 1 {
            Direction::West
        } else if rng.gen() {
            Direction::East
        } else {
            Direction::West
        }
    } else if row == 0 {
        Direction::South
    } else if row == rows - 1 {
        Direction::North
    } else if rng.gen() {
        Direction::South
    } else {
        Direction::North
    }
}

/// Initial heading for a freshly placed traveler: uniform among the headings
/// with at least one cell of room, so even an edge start cannot face off the
/// grid.
pub(crate) fn initial_direction(
    row: usize,
    col: usize,
    rows: usize,
    cols: usize,
    rng: &mut impl Rng,
) -> Direction {
    let candidates: Vec<Direction> = Direction::ALL
        .iter()
        .copied()
        .filter(|&dir| travel_room(row, col, rows, cols, dir) > 0)
        .collect();
    candidates[rng.gen_range(0..candidates.len())]
}

/// A single traveler entity. Owns its position and heading; everything it
/// shares with other threads (ink, grid, counters) is reached through
/// [`SimState`].
#[derive(Debug)]
pub(crate) struct Traveler {
    pub index: usize,
    pub color: InkColor,
    pub row: usize,
    pub col: usize,
    pub dir: Direction,
}

impl Traveler {
    /// Construct a traveler with random color, position and heading.
    pub fn new(index: usize, rows: usize, cols: usize, rng: &mut impl Rng) -> Self {
        let row = rng.gen_range(0..rows);
        let col = rng.gen_range(0..cols);
        Traveler {
            index,
            color: InkColor::ALL[rng.gen_range(0..3)],
            row,
            col,
            dir: initial_direction(row, col, rows, cols, rng),
        }
    }

    /// Roster-board entry describing this traveler.
    pub fn status(&self) -> TravelerStatus {
        TravelerStatus {
            color: self.color,
            row: self.row,
            col: self.col,
            live: true,
        }
    }

    /// Thread body. Alternates straight runs until the traveler stands on a
    /// corner, then retires and returns. A raised stop flag exits without
    /// retiring: shutdown abandons travelers, it does not terminate them.
    pub fn run(mut self, state: &SimState) {
        let rows = state.grid().rows();
        let cols = state.grid().cols();
        let mut rng = rand::thread_rng();
        log::debug!(
            "traveler {} starting at ({}, {}) heading {:?}",
            self.index,
            self.row,
            self.col,
            self.dir
        );
        while !state.stopping() {
            // A run is bounded by the edge it heads toward, so it can only
            // meet a corner on its final step. Checking between runs covers
            // every termination.
            if is_corner(self.row, self.col, rows, cols) {
                state.retire_traveler(self.index);
                log::debug!(
                    "traveler {} terminated at corner ({}, {})",
                    self.index,
                    self.row,
                    self.col
                );
                return;
            }
            let room = travel_room(self.row, self.col, rows, cols, self.dir);
            let distance = rng.gen_range(1..=room);
            for _ in 0..distance {
                if !self.acquire_ink(state) {
                    return;
                }
                self.advance(state);
                let pause = state.step_pause();
                if !pause.is_zero() {
                    thread::sleep(pause);
                }
            }
            self.dir = next_direction(self.row, self.col, rows, cols, self.dir, &mut rng);
        }
    }

    /// Obtain one step's worth of own-color ink, re-checking the stop flag
    /// between bounded waits. No ink is spent and no movement happens until
    /// this succeeds.
    fn acquire_ink(&self, state: &SimState) -> bool {
        loop {
            if state.stopping() {
                return false;
            }
            if state
                .reservoir()
                .acquire_timeout(self.color, INK_PER_STEP, state.ink_patience())
            {
                return true;
            }
        }
    }

    /// Move one cell along the current heading and paint the cell moved onto.
    fn advance(&mut self, state: &SimState) {
        let (dr, dc) = self.dir.step();
        let row = self.row as isize + dr;
        let col = self.col as isize + dc;
        assert!(
            row >= 0
                && col >= 0
                && (row as usize) < state.grid().rows()
                && (col as usize) < state.grid().cols(),
            "traveler {} stepped off the grid to ({}, {})",
            self.index,
            row,
            col
        );
        self.row = row as usize;
        self.col = col as usize;
        state
            .grid()
            .paint_step(self.row, self.col, self.color, TRAIL_INCREMENT);
        state.update_board(self.index, self.row, self.col);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimConfig, SimState};
    use std::time::Duration;

    #[test]
    fn test_corner_detection() {
        assert!(is_corner(0, 0, 5, 7));
        assert!(is_corner(0, 6, 5, 7));
        assert!(is_corner(4, 0, 5, 7));
        assert!(is_corner(4, 6, 5, 7));
        assert!(!is_corner(0, 3, 5, 7));
        assert!(!is_corner(2, 0, 5, 7));
        assert!(!is_corner(3, 3, 5, 7));
    }

    #[test]
    fn test_travel_room_measures_to_each_edge() {
        assert_eq!(travel_room(3, 5, 8, 8, Direction::North), 3);
        assert_eq!(travel_room(3, 5, 8, 8, Direction::South), 4);
        assert_eq!(travel_room(3, 5, 8, 8, Direction::West), 5);
        assert_eq!(travel_room(3, 5, 8, 8, Direction::East), 2);
    }

    #[test]
    fn test_direction_forced_inward_at_edges() {
        let mut rng = rand::thread_rng();
        for _ in 0..16 {
            assert_eq!(
                next_direction(3, 0, 8, 8, Direction::North, &mut rng),
                Direction::East
            );
            assert_eq!(
                next_direction(3, 7, 8, 8, Direction::South, &mut rng),
                Direction::West
            );
            assert_eq!(
                next_direction(0, 3, 8, 8, Direction::East, &mut rng),
                Direction::South
            );
            assert_eq!(
                next_direction(7, 3, 8, 8, Direction::West, &mut rng),
                Direction::North
            );
        }
    }

    #[test]
    fn test_axis_alternates_after_vertical_run() {
        // One-cell horizon from (1, 1) heading north on a 4x4 grid; after
        // that step the next heading must be horizontal, freely chosen.
        assert_eq!(travel_room(1, 1, 4, 4, Direction::North), 1);
        let mut rng = rand::thread_rng();
        for _ in 0..32 {
            let dir = next_direction(0, 1, 4, 4, Direction::North, &mut rng);
            assert!(matches!(dir, Direction::East | Direction::West));
        }
    }

    #[test]
    fn test_initial_direction_always_has_room() {
        let mut rng = rand::thread_rng();
        for row in 0..3 {
            for col in 0..3 {
                for _ in 0..16 {
                    let dir = initial_direction(row, col, 3, 3, &mut rng);
                    assert!(travel_room(row, col, 3, 3, dir) > 0);
                }
            }
        }
    }

    #[test]
    fn test_traveler_walks_to_a_corner() {
        // Generous ink and no pacing: the walk must end on a corner and
        // retire exactly once, touching only its own color's tank.
        let config = SimConfig {
            rows: 12,
            cols: 12,
            travelers: 1,
            producers: 0,
            max_level: 1_000_000,
            initial_levels: [1_000_000; 3],
            step_pause: Duration::ZERO,
            ink_patience: Duration::from_millis(1),
            ..SimConfig::default()
        };
        let traveler = Traveler {
            index: 0,
            color: InkColor::Red,
            row: 5,
            col: 7,
            dir: Direction::North,
        };
        let state = SimState::new(config, vec![traveler.status()]);
        traveler.run(&state);

        assert_eq!(state.live_travelers(), 0);
        let board = state.board_snapshot();
        assert!(!board[0].live);
        assert!(is_corner(board[0].row, board[0].col, 12, 12));
        assert!(state.reservoir().level(InkColor::Red) < 1_000_000);
        assert_eq!(state.reservoir().level(InkColor::Green), 1_000_000);
        assert_eq!(state.reservoir().level(InkColor::Blue), 1_000_000);
    }
}
