use std::thread;
use std::time::Duration;

use crate::ink::InkColor;
use crate::sim::SimState;

/// Largest single sleep while waiting out a refill interval. Keeps shutdown
/// latency bounded no matter how far the throttle has been slowed down.
const SLEEP_CHUNK: Duration = Duration::from_millis(50);

/// A single ink producer. Tops up one color's tank on a shared, globally
/// adjustable cadence and has no natural termination of its own.
#[derive(Debug)]
pub(crate) struct Producer {
    pub index: usize,
    pub color: InkColor,
}

impl Producer {
    pub fn new(index: usize, color: InkColor) -> Self {
        Producer { index, color }
    }

    /// Thread body: sleep out the current refill interval, top up the tank,
    /// repeat until the stop flag is raised. A full tank just skips the
    /// cycle.
    pub fn run(self, state: &SimState) {
        log::debug!("producer {} ({:?}) starting", self.index, self.color);
        while !state.stopping() {
            self.sleep_interval(state);
            if state.stopping() {
                break;
            }
            state.reservoir().try_refill(self.color, state.max_add());
        }
        log::debug!("producer {} ({:?}) stopped", self.index, self.color);
    }

    /// Sleep for the interval in force at the start of this cycle. The
    /// interval is read with a single atomic load; throttle changes apply
    /// from the next cycle on.
    fn sleep_interval(&self, state: &SimState) {
        let mut remaining = state.refill_interval();
        while !remaining.is_zero() && !state.stopping() {
            let chunk = remaining.min(SLEEP_CHUNK);
            thread::sleep(chunk);
            remaining -= chunk;
        }
    }
}
