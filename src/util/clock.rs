//! Runner clock abstraction and absolute deadlines.
//!
//! Every time value the scheduler handles is an absolute millisecond count on
//! a [`Clock`]. Production code uses [`SystemClock`]; tests drive a
//! [`SimulatedClock`] forward explicitly so schedules are reproducible.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Absolute point in time, in milliseconds on the runner clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deadline(u64);

impl Deadline {
    /// A deadline that never expires.
    pub const NEVER: Self = Self(u64::MAX);

    /// Deadline at an absolute millisecond value.
    #[must_use]
    pub const fn at(ms: u64) -> Self {
        Self(ms)
    }

    /// Absolute millisecond value.
    #[must_use]
    pub const fn ms(self) -> u64 {
        self.0
    }

    /// Deadline `ms` milliseconds after this one.
    #[must_use]
    pub const fn plus(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    /// Milliseconds from `earlier` to this deadline, zero if `earlier` is later.
    #[must_use]
    pub const fn since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// True once `now` has reached this deadline.
    #[must_use]
    pub fn expired_at(self, now: Self) -> bool {
        now >= self
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NEVER {
            write!(f, "never")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Source of the current time for the scheduler and runner.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> Deadline;
}

/// Milliseconds since the UNIX epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Wall clock backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Deadline {
        Deadline(now_ms())
    }
}

/// Manually driven clock. Time only moves when `set` or `step` is called.
#[derive(Debug, Default)]
pub struct SimulatedClock {
    now: AtomicU64,
}

impl SimulatedClock {
    /// Simulated clock starting at `ms`.
    #[must_use]
    pub const fn new(ms: u64) -> Self {
        Self {
            now: AtomicU64::new(ms),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::Release);
    }

    /// Advance by `ms`.
    pub fn step(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::AcqRel);
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Deadline {
        Deadline(self.now.load(Ordering::Acquire))
    }
}
