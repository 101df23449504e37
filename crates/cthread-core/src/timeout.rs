//! Blocking policy for controller operations
//!
//! Every blocking call takes one of three policies: return right after the
//! request is recorded, wait with no deadline, or wait up to a duration.
//! `Duration::ZERO` and `Duration::MAX` convert to the first two so plain
//! durations can be passed anywhere a `Timeout` is expected.

use std::time::{Duration, Instant};

/// How long a call may block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Record the request and return immediately
    NonBlocking,

    /// Block with no deadline
    Forever,

    /// Block for at most this long
    After(Duration),
}

impl Timeout {
    #[inline]
    pub const fn is_blocking(&self) -> bool {
        !matches!(self, Timeout::NonBlocking)
    }

    /// Absolute deadline for a wait starting at `start`
    ///
    /// `None` means no deadline. A duration too large to represent is
    /// treated as `Forever`.
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        match self {
            Timeout::NonBlocking => Some(start),
            Timeout::Forever => None,
            Timeout::After(d) => start.checked_add(*d),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Timeout::NonBlocking
        } else if d == Duration::MAX {
            Timeout::Forever
        } else {
            Timeout::After(d)
        }
    }
}

/// Shorthand for the two common policies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocking {
    Yes,
    No,
}

impl Blocking {
    #[inline]
    pub const fn is_yes(&self) -> bool {
        matches!(self, Blocking::Yes)
    }
}

impl From<bool> for Blocking {
    fn from(block: bool) -> Self {
        if block { Blocking::Yes } else { Blocking::No }
    }
}

impl From<Blocking> for Timeout {
    fn from(b: Blocking) -> Self {
        match b {
            Blocking::Yes => Timeout::Forever,
            Blocking::No => Timeout::NonBlocking,
        }
    }
}
