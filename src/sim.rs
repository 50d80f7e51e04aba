use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::grid::{GridSnapshot, SharedGrid};
use crate::ink::{InkColor, InkReservoir};
use crate::producer::Producer;
use crate::traveler::Traveler;

/// Everything that can abort a simulation or its frame export.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to spawn {role} thread")]
    Spawn {
        role: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Tunable simulation parameters, fixed for the lifetime of one run. The
/// defaults mirror the classic 20x20 setup: ten travelers, one producer per
/// color, tanks capped at fifty units.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub rows: usize,
    pub cols: usize,
    pub travelers: usize,
    pub producers: usize,
    /// Upper bound of each ink tank.
    pub max_level: u32,
    /// Units added by one refill, manual or produced.
    pub max_add: u32,
    /// Starting levels, indexed red/green/blue.
    pub initial_levels: [u32; 3],
    /// Pause after each successful traveler step, so motion stays gradual.
    pub step_pause: Duration,
    /// Longest single wait for ink before a traveler re-checks the world.
    pub ink_patience: Duration,
    /// Starting producer cadence.
    pub refill_interval: Duration,
    /// Floor the speed-up throttle cannot pass.
    pub min_refill_interval: Duration,
    /// Cap the slow-down throttle cannot pass.
    pub max_refill_interval: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            rows: 20,
            cols: 20,
            travelers: 10,
            producers: 3,
            max_level: 50,
            max_add: 10,
            initial_levels: [20, 10, 40],
            step_pause: Duration::from_millis(150),
            ink_patience: Duration::from_millis(50),
            refill_interval: Duration::from_millis(100),
            min_refill_interval: Duration::from_millis(1),
            max_refill_interval: Duration::from_secs(10),
        }
    }
}

impl SimConfig {
    fn validate(&self) -> Result<(), SimError> {
        if self.rows < 2 || self.cols < 2 {
            return Err(SimError::Config(format!(
                "grid must be at least 2x2, got {}x{}",
                self.rows, self.cols
            )));
        }
        if self.travelers == 0 {
            return Err(SimError::Config("at least one traveler is required".into()));
        }
        if self.max_add == 0 {
            return Err(SimError::Config("refill amount must be positive".into()));
        }
        if let Some(&level) = self.initial_levels.iter().find(|&&l| l > self.max_level) {
            return Err(SimError::Config(format!(
                "initial ink level {} exceeds the maximum of {}",
                level, self.max_level
            )));
        }
        if self.min_refill_interval > self.refill_interval
            || self.refill_interval > self.max_refill_interval
        {
            return Err(SimError::Config(format!(
                "refill interval {:?} outside [{:?}, {:?}]",
                self.refill_interval, self.min_refill_interval, self.max_refill_interval
            )));
        }
        Ok(())
    }
}

/// Entry in the shared traveler roster board, read by rendering code and
/// written by the traveler it describes.
#[derive(Debug, Clone, Copy)]
pub struct TravelerStatus {
    pub color: InkColor,
    pub row: usize,
    pub col: usize,
    pub live: bool,
}

/// State shared by every worker thread and by the snapshot consumers. The
/// live-traveler counter and the producer cadence are atomics; the roster
/// board sits behind its own mutex.
#[derive(Debug)]
pub struct SimState {
    config: SimConfig,
    reservoir: InkReservoir,
    grid: SharedGrid,
    live_travelers: AtomicUsize,
    refill_interval_us: AtomicU64,
    stopping: AtomicBool,
    board: Mutex<Vec<TravelerStatus>>,
}

impl SimState {
    pub(crate) fn new(config: SimConfig, board: Vec<TravelerStatus>) -> Self {
        let reservoir = InkReservoir::new(config.max_level, config.initial_levels);
        let grid = SharedGrid::new(config.rows, config.cols);
        let refill_us = config.refill_interval.as_micros() as u64;
        SimState {
            reservoir,
            grid,
            live_travelers: AtomicUsize::new(board.len()),
            refill_interval_us: AtomicU64::new(refill_us),
            stopping: AtomicBool::new(false),
            board: Mutex::new(board),
            config,
        }
    }

    pub(crate) fn config(&self) -> &SimConfig {
        &self.config
    }

    pub(crate) fn reservoir(&self) -> &InkReservoir {
        &self.reservoir
    }

    pub(crate) fn grid(&self) -> &SharedGrid {
        &self.grid
    }

    pub(crate) fn stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub(crate) fn request_stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    pub(crate) fn step_pause(&self) -> Duration {
        self.config.step_pause
    }

    pub(crate) fn ink_patience(&self) -> Duration {
        self.config.ink_patience
    }

    pub(crate) fn max_add(&self) -> u32 {
        self.config.max_add
    }

    pub(crate) fn refill_interval(&self) -> Duration {
        Duration::from_micros(self.refill_interval_us.load(Ordering::Acquire))
    }

    pub(crate) fn live_travelers(&self) -> usize {
        self.live_travelers.load(Ordering::Acquire)
    }

    pub(crate) fn board_snapshot(&self) -> Vec<TravelerStatus> {
        self.board.lock().unwrap().clone()
    }

    /// Record a traveler's new position on the roster board.
    pub(crate) fn update_board(&self, index: usize, row: usize, col: usize) {
        let mut board = self.board.lock().unwrap();
        board[index].row = row;
        board[index].col = col;
    }

    /// Mark a traveler dead and decrement the live counter. Called exactly
    /// once, by the terminating traveler itself.
    pub(crate) fn retire_traveler(&self, index: usize) {
        self.board.lock().unwrap()[index].live = false;
        self.live_travelers.fetch_sub(1, Ordering::AcqRel);
    }

    /// Shrink the producer cadence by a fifth, never past the floor. A
    /// request already at the floor changes nothing.
    pub(crate) fn speed_up_producers(&self) {
        let min = self.config.min_refill_interval.as_micros() as u64;
        let _ = self
            .refill_interval_us
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current * 8 / 10;
                (next >= min).then_some(next)
            });
    }

    /// Grow the producer cadence by a fifth, never past the cap.
    pub(crate) fn slow_down_producers(&self) {
        let max = self.config.max_refill_interval.as_micros() as u64;
        let _ = self
            .refill_interval_us
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current * 12 / 10).min(max))
            });
    }
}

/// Owns the rosters and every worker thread. Construction randomizes the
/// rosters, `start` spawns them, and the controller keeps exclusive join
/// responsibility until `shutdown`.
pub struct Simulation {
    state: Arc<SimState>,
    pending_travelers: Vec<Traveler>,
    traveler_handles: Vec<JoinHandle<()>>,
    producer_handles: Vec<JoinHandle<()>>,
}

impl Simulation {
    /// Validate the configuration and build the randomized rosters. No
    /// threads run yet.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let mut rng = rand::thread_rng();
        let travelers: Vec<Traveler> = (0..config.travelers)
            .map(|index| Traveler::new(index, config.rows, config.cols, &mut rng))
            .collect();
        let board = travelers.iter().map(Traveler::status).collect();
        Ok(Simulation {
            state: Arc::new(SimState::new(config, board)),
            pending_travelers: travelers,
            traveler_handles: Vec::new(),
            producer_handles: Vec::new(),
        })
    }

    /// Spawn one named thread per roster entry. If any spawn fails the
    /// already-running part of the roster is stopped and joined before the
    /// error is returned; a partial roster never keeps running.
    pub fn start(&mut self) -> Result<(), SimError> {
        let pending = mem::take(&mut self.pending_travelers);
        for traveler in pending {
            let state = Arc::clone(&self.state);
            let name = format!("traveler-{}", traveler.index);
            match thread::Builder::new()
                .name(name)
                .spawn(move || traveler.run(&state))
            {
                Ok(handle) => self.traveler_handles.push(handle),
                Err(source) => {
                    self.abort_partial_roster();
                    return Err(SimError::Spawn {
                        role: "traveler",
                        source,
                    });
                }
            }
        }
        for index in 0..self.state.config().producers {
            let producer = Producer::new(index, InkColor::ALL[index % InkColor::ALL.len()]);
            let state = Arc::clone(&self.state);
            let name = format!("producer-{}", index);
            match thread::Builder::new()
                .name(name)
                .spawn(move || producer.run(&state))
            {
                Ok(handle) => self.producer_handles.push(handle),
                Err(source) => {
                    self.abort_partial_roster();
                    return Err(SimError::Spawn {
                        role: "producer",
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    fn abort_partial_roster(&mut self) {
        self.state.request_stop();
        for handle in self
            .traveler_handles
            .drain(..)
            .chain(self.producer_handles.drain(..))
        {
            if handle.join().is_err() {
                log::error!("worker thread panicked while aborting startup");
            }
        }
    }

    pub fn config(&self) -> &SimConfig {
        self.state.config()
    }

    /// Travelers that have not yet reached a corner.
    pub fn live_travelers(&self) -> usize {
        self.state.live_travelers()
    }

    /// Consistent copy of the three ink levels, indexed red/green/blue.
    pub fn ink_levels(&self) -> [u32; 3] {
        self.state.reservoir().levels()
    }

    /// Consistent whole-grid copy for rendering.
    pub fn snapshot(&self) -> GridSnapshot {
        self.state.grid().snapshot()
    }

    /// Copy of the traveler roster board for rendering.
    pub fn traveler_board(&self) -> Vec<TravelerStatus> {
        self.state.board_snapshot()
    }

    /// Producer cadence currently in force.
    pub fn refill_interval(&self) -> Duration {
        self.state.refill_interval()
    }

    /// Manually top up one color, the same amount a producer cycle adds.
    /// Returns whether the tank had room.
    pub fn add_ink(&self, color: InkColor) -> bool {
        self.state
            .reservoir()
            .try_refill(color, self.state.max_add())
    }

    /// Throttle entry point for an input collaborator: produce ink faster.
    pub fn speed_up_producers(&self) {
        self.state.speed_up_producers();
    }

    /// Throttle entry point for an input collaborator: produce ink slower.
    pub fn slow_down_producers(&self) {
        self.state.slow_down_producers();
    }

    /// Wait for every traveler to terminate naturally at a corner.
    pub fn join_travelers(&mut self) {
        for handle in self.traveler_handles.drain(..) {
            if handle.join().is_err() {
                log::error!("traveler thread panicked");
            }
        }
    }

    /// Raise the stop flag and join every remaining worker thread.
    pub fn shutdown(mut self) {
        self.state.request_stop();
        for handle in self
            .traveler_handles
            .drain(..)
            .chain(self.producer_handles.drain(..))
        {
            if handle.join().is_err() {
                log::error!("worker thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_degenerate_grid() {
        let config = SimConfig {
            rows: 1,
            ..SimConfig::default()
        };
        assert!(matches!(Simulation::new(config), Err(SimError::Config(_))));
    }

    #[test]
    fn test_rejects_empty_traveler_roster() {
        let config = SimConfig {
            travelers: 0,
            ..SimConfig::default()
        };
        assert!(matches!(Simulation::new(config), Err(SimError::Config(_))));
    }

    #[test]
    fn test_rejects_overfull_initial_levels() {
        let config = SimConfig {
            initial_levels: [60, 10, 40],
            ..SimConfig::default()
        };
        assert!(matches!(Simulation::new(config), Err(SimError::Config(_))));
    }

    #[test]
    fn test_speed_up_holds_at_the_floor() {
        let config = SimConfig {
            refill_interval: Duration::from_millis(1),
            min_refill_interval: Duration::from_millis(1),
            ..SimConfig::default()
        };
        let sim = Simulation::new(config).unwrap();
        sim.speed_up_producers();
        assert_eq!(sim.refill_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_slow_down_holds_at_the_cap() {
        let config = SimConfig {
            refill_interval: Duration::from_millis(100),
            max_refill_interval: Duration::from_millis(110),
            ..SimConfig::default()
        };
        let sim = Simulation::new(config).unwrap();
        sim.slow_down_producers();
        assert_eq!(sim.refill_interval(), Duration::from_millis(110));
        sim.slow_down_producers();
        assert_eq!(sim.refill_interval(), Duration::from_millis(110));
    }

    #[test]
    fn test_throttle_scales_by_a_fifth() {
        let sim = Simulation::new(SimConfig::default()).unwrap();
        assert_eq!(sim.refill_interval(), Duration::from_millis(100));
        sim.speed_up_producers();
        assert_eq!(sim.refill_interval(), Duration::from_millis(80));
        sim.slow_down_producers();
        assert_eq!(sim.refill_interval(), Duration::from_millis(96));
    }

    #[test]
    fn test_manual_ink_deposit() {
        let config = SimConfig {
            initial_levels: [0, 0, 0],
            ..SimConfig::default()
        };
        let sim = Simulation::new(config).unwrap();
        assert!(sim.add_ink(InkColor::Green));
        assert_eq!(sim.ink_levels(), [0, 10, 0]);
    }

    #[test]
    fn test_roster_board_matches_initial_attributes() {
        let sim = Simulation::new(SimConfig::default()).unwrap();
        let board = sim.traveler_board();
        assert_eq!(board.len(), 10);
        assert!(board.iter().all(|status| status.live));
        assert!(board
            .iter()
            .all(|status| status.row < 20 && status.col < 20));
        assert_eq!(sim.live_travelers(), 10);
    }

    #[test]
    fn test_all_travelers_terminate_and_counter_hits_zero() {
        // Many travelers on a small grid with effectively unlimited ink:
        // every one must reach a corner, and the concurrent decrements must
        // land on exactly zero.
        let config = SimConfig {
            rows: 9,
            cols: 9,
            travelers: 24,
            producers: 3,
            max_level: 1_000_000,
            max_add: 1_000,
            initial_levels: [1_000_000; 3],
            step_pause: Duration::ZERO,
            ink_patience: Duration::from_millis(5),
            refill_interval: Duration::from_millis(1),
            ..SimConfig::default()
        };
        let mut sim = Simulation::new(config).unwrap();
        sim.start().unwrap();
        sim.join_travelers();
        assert_eq!(sim.live_travelers(), 0);
        assert!(sim.traveler_board().iter().all(|status| !status.live));
        sim.shutdown();
    }

    #[test]
    fn test_shutdown_joins_a_running_roster() {
        let config = SimConfig {
            step_pause: Duration::from_millis(1),
            ink_patience: Duration::from_millis(5),
            refill_interval: Duration::from_millis(2),
            ..SimConfig::default()
        };
        let mut sim = Simulation::new(config).unwrap();
        sim.start().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(sim.live_travelers() <= 10);
        sim.shutdown();
    }
}
