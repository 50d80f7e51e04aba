use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// The three ink colors. Each traveler consumes exactly one of them, each
/// producer replenishes exactly one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InkColor {
    Red,
    Green,
    Blue,
}

impl InkColor {
    pub const ALL: [InkColor; 3] = [InkColor::Red, InkColor::Green, InkColor::Blue];

    /// Index into per-color level arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            InkColor::Red => 0,
            InkColor::Green => 1,
            InkColor::Blue => 2,
        }
    }
}

/// A bounded three-color ink supply shared by every traveler and producer
/// thread. All three levels live behind a single mutex, so each call is one
/// atomic check-and-update: a request that cannot be satisfied in full leaves
/// the level untouched and reports failure to the caller.
#[derive(Debug)]
pub struct InkReservoir {
    levels: Mutex<[u32; 3]>,
    replenished: Condvar,
    max_level: u32,
}

impl InkReservoir {
    /// Create a reservoir holding `initial` units per color, each level
    /// bounded by `max_level`.
    pub fn new(max_level: u32, initial: [u32; 3]) -> Self {
        assert!(
            initial.iter().all(|&level| level <= max_level),
            "initial ink level exceeds the maximum of {}",
            max_level
        );
        InkReservoir {
            levels: Mutex::new(initial),
            replenished: Condvar::new(),
            max_level,
        }
    }

    /// Take `amount` units of `color` if the tank holds at least that much.
    /// All-or-nothing: on failure nothing is deducted.
    pub fn try_acquire(&self, color: InkColor, amount: u32) -> bool {
        let mut levels = self.levels.lock().unwrap();
        let level = &mut levels[color.index()];
        if *level >= amount {
            *level -= amount;
            true
        } else {
            false
        }
    }

    /// Add `amount` units of `color` unless that would push the level past
    /// the maximum. All-or-nothing: on failure nothing is added. A successful
    /// refill wakes any thread waiting in [`InkReservoir::acquire_timeout`].
    pub fn try_refill(&self, color: InkColor, amount: u32) -> bool {
        let mut levels = self.levels.lock().unwrap();
        let level = &mut levels[color.index()];
        if amount <= self.max_level - *level {
            *level += amount;
            drop(levels);
            self.replenished.notify_all();
            true
        } else {
            false
        }
    }

    /// Like [`InkReservoir::try_acquire`], but on a shortfall waits for a
    /// refill for up to `patience` before giving up. Returns whether the ink
    /// was acquired, so the caller stays in charge of its retry loop.
    pub fn acquire_timeout(&self, color: InkColor, amount: u32, patience: Duration) -> bool {
        let deadline = Instant::now() + patience;
        let mut levels = self.levels.lock().unwrap();
        loop {
            let level = &mut levels[color.index()];
            if *level >= amount {
                *level -= amount;
                return true;
            }
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return false,
            };
            let (guard, _) = self.replenished.wait_timeout(levels, remaining).unwrap();
            levels = guard;
        }
    }

    /// Current level of one tank.
    pub fn level(&self, color: InkColor) -> u32 {
        self.levels.lock().unwrap()[color.index()]
    }

    /// Consistent copy of all three levels, indexed red/green/blue.
    pub fn levels(&self) -> [u32; 3] {
        *self.levels.lock().unwrap()
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }
}
