//! Half-open time spans.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::util::clock::Deadline;

/// Immutable `[begin, end)` time span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    begin: Deadline,
    end: Deadline,
}

impl Interval {
    /// Create an interval. Callers are responsible for `begin <= end`.
    #[must_use]
    pub const fn new(begin: Deadline, end: Deadline) -> Self {
        Self { begin, end }
    }

    /// Interval between two absolute millisecond values.
    #[must_use]
    pub const fn between(begin: u64, end: u64) -> Self {
        Self::new(Deadline::at(begin), Deadline::at(end))
    }

    /// Inclusive lower bound.
    #[must_use]
    pub const fn begin(&self) -> Deadline {
        self.begin
    }

    /// Exclusive upper bound.
    #[must_use]
    pub const fn end(&self) -> Deadline {
        self.end
    }

    /// Length in milliseconds.
    #[must_use]
    pub const fn duration(&self) -> u64 {
        self.end.since(self.begin)
    }

    /// True when `begin < end`.
    #[must_use]
    pub fn is_proper(&self) -> bool {
        self.begin < self.end
    }

    /// True if the two spans share no instant.
    #[must_use]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.end <= other.begin || other.end <= self.begin
    }

    /// True if the two spans overlap.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.is_disjoint(other)
    }

    /// True if `t` falls within the span.
    #[must_use]
    pub fn contains(&self, t: Deadline) -> bool {
        self.begin <= t && t < self.end
    }

    /// Same length, moved to start at `begin`.
    #[must_use]
    pub const fn shifted_to(&self, begin: Deadline) -> Self {
        Self::new(begin, begin.plus(self.duration()))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{})", self.begin, self.end)
    }
}
