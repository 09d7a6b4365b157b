//! Clock abstraction used to drive decay.
//!
//! Decay is applied lazily from the instant supplied by a [`TimeSource`], so
//! tests can move time forward deterministically with [`ManualTimeSource`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock (monotonic) time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualTimeSource {
    base: Instant,
    offset_nanos: AtomicU64,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.offset_nanos.fetch_add(nanos_to_u64(duration), Ordering::Relaxed);
    }

    pub fn set(&self, duration: Duration) {
        self.offset_nanos.store(nanos_to_u64(duration), Ordering::Relaxed);
    }

    /// Time elapsed since this source was created.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::Relaxed))
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.base
            .checked_add(self.elapsed())
            .unwrap_or(self.base)
    }
}

fn nanos_to_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
