//! Time sources expressed in epoch seconds.
//!
//! Due times, claim deadlines and retention deadlines are all whole epoch
//! seconds. Components that compare against "now" take a [`Clock`] so tests can
//! drive time explicitly with [`ManualClock`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
pub type Epoch = i64;

/// Current wall-clock time in epoch seconds.
#[must_use]
pub fn now_secs() -> Epoch {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| Epoch::try_from(d.as_secs()).unwrap_or(Epoch::MAX))
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current time in epoch seconds.
    fn now_secs(&self) -> Epoch;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> Epoch {
        now_secs()
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `now`.
    #[must_use]
    pub const fn new(now: Epoch) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Create a clock frozen at the current wall-clock time.
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(now_secs())
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: Epoch) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> Epoch {
        self.now.load(Ordering::SeqCst)
    }
}
