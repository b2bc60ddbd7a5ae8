//! Clock sources for entity modification timestamps

use crate::types::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};

/// Supplies timestamps for local mutations
pub trait Clock: Send + Sync {
    /// Returns the current time
    fn now(&self) -> Timestamp;
}

/// Wall clock that never goes backwards within a process.
///
/// Every call returns a value strictly greater than the previous one, even
/// when the system clock is adjusted or two calls land in the same
/// millisecond.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    /// Creates a new system clock
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = Timestamp::now().as_millis();
        let mut current = self.last.load(Ordering::Acquire);
        loop {
            let next = wall.max(current.saturating_add(1));
            match self.last.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Timestamp::from_millis(next),
                Err(observed) => current = observed,
            }
        }
    }
}

/// Manually driven clock for tests and deterministic replays
#[derive(Debug, Default)]
pub struct ManualClock {
    current: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `millis`
    pub fn starting_at(millis: i64) -> Self {
        Self {
            current: AtomicI64::new(millis),
        }
    }

    /// Sets the clock to an absolute time
    pub fn set(&self, millis: i64) {
        self.current.store(millis, Ordering::Release);
    }

    /// Moves the clock forward
    pub fn advance(&self, millis: i64) {
        self.current.fetch_add(millis, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.current.load(Ordering::Acquire))
    }
}
