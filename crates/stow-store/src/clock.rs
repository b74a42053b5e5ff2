use std::sync::atomic::{AtomicU64, Ordering};

use stow_types::temporal::wall_clock_ticks;
use stow_types::Timestamp;

/// Logical clock for local causal ordering.
///
/// Keeps an atomic tick counter seeded from wall-clock time. Each call to
/// [`LogicalClock::next`] stores `max(last + 1, wall_clock)`, so returned
/// timestamps are strictly increasing across all callers even when the wall
/// clock is coarse or steps backward.
pub struct LogicalClock {
    last: AtomicU64,
}

impl LogicalClock {
    /// Create a clock seeded from the current wall-clock time.
    pub fn new() -> Self {
        Self::with_seed(wall_clock_ticks())
    }

    /// Create a clock seeded with an explicit tick count.
    pub fn with_seed(ticks: u64) -> Self {
        Self {
            last: AtomicU64::new(ticks),
        }
    }

    /// The next timestamp, strictly greater than every value previously
    /// returned by this clock.
    pub fn next(&self) -> Timestamp {
        let mut current = self.last.load(Ordering::Acquire);
        loop {
            let candidate = current.saturating_add(1).max(wall_clock_ticks());
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Timestamp::from_ticks(candidate),
                Err(actual) => current = actual,
            }
        }
    }

    /// The most recently issued (or seeded) value.
    pub fn last(&self) -> Timestamp {
        Timestamp::from_ticks(self.last.load(Ordering::Acquire))
    }
}

impl Default for LogicalClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LogicalClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalClock")
            .field("last", &self.last())
            .finish()
    }
}
