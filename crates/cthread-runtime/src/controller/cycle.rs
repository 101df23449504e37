//! Cycle pacing: the cycle-wait policy and the cycle-skip protocol
//!
//! Both are plain data with no locking of their own. `CycleWaitConfig`
//! lives under the controller's cycle-wait lock, `CycleSkip` under the
//! state lock.

use cthread_core::{CycleWaitMode, State};
use std::time::{Duration, Instant};

/// Cycle-wait mode and period, versioned so a sleeping thread can tell
/// that they changed underneath it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CycleWaitConfig {
    pub(crate) mode: CycleWaitMode,
    pub(crate) period: Duration,
    pub(crate) generation: u64,
}

impl CycleWaitConfig {
    pub(crate) fn new(mode: CycleWaitMode, period: Duration) -> Self {
        Self { mode, period, generation: 0 }
    }

    pub(crate) fn set(&mut self, mode: CycleWaitMode, period: Duration) {
        self.mode = mode;
        self.period = period;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Whether the yield point sleeps between cycles at all
    #[inline]
    pub(crate) fn sleeps(&self) -> bool {
        self.mode == CycleWaitMode::Indefinite || !self.period.is_zero()
    }

    /// End of the sleep that began at `entered`
    ///
    /// `prev_cycle` is the start of the previous cycle body. `None` means no
    /// deadline, either because the mode is `Indefinite` or because the
    /// deadline does not fit in an `Instant`.
    pub(crate) fn deadline(&self, entered: Instant, prev_cycle: Option<Instant>) -> Option<Instant> {
        match self.mode {
            CycleWaitMode::Indefinite => None,
            CycleWaitMode::Relative => entered.checked_add(self.period),
            CycleWaitMode::Absolute => match prev_cycle {
                Some(prev) => prev.checked_add(self.period),
                None => Some(entered),
            },
        }
    }
}

/// Manual stepping: run N cycle bodies back to back, ignoring the cycle wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum CycleSkip {
    /// Normal cadence
    #[default]
    Inactive,

    /// `remaining` more bodies run without sleeping, then the thread goes
    /// back to `resume`
    Active { remaining: u64, resume: State },
}

/// What the yield point does about an active skip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipStep {
    /// No skip in progress
    Normal,
    /// Run the next cycle body right away
    RunCycle,
    /// Skip ran out; the thread returns to `resume`
    Finished { resume: State },
    /// A state request superseded the skip
    Cancelled,
}

impl CycleSkip {
    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        matches!(self, CycleSkip::Active { .. })
    }

    /// Request `n` skipped cycles; overlapping requests keep the larger count
    ///
    /// `current` is remembered as the state to resume only when no skip is
    /// in progress, since an in-progress skip has already moved the thread.
    pub(crate) fn request(&mut self, n: u64, current: State) {
        *self = match *self {
            CycleSkip::Inactive => CycleSkip::Active { remaining: n, resume: current },
            CycleSkip::Active { remaining, resume } => CycleSkip::Active {
                remaining: remaining.max(n),
                resume,
            },
        };
    }

    /// Top of a yield point
    pub(crate) fn on_yield(&mut self, request_pending: bool) -> SkipStep {
        match *self {
            CycleSkip::Inactive => SkipStep::Normal,
            CycleSkip::Active { .. } if request_pending => {
                *self = CycleSkip::Inactive;
                SkipStep::Cancelled
            }
            CycleSkip::Active { remaining: 0, resume } => {
                *self = CycleSkip::Inactive;
                SkipStep::Finished { resume }
            }
            CycleSkip::Active { remaining, resume } => {
                *self = CycleSkip::Active { remaining: remaining - 1, resume };
                SkipStep::RunCycle
            }
        }
    }

    /// Woken out of a cycle-wait sleep; the wake itself starts one cycle
    pub(crate) fn on_sleep_wake(&mut self, request_pending: bool) {
        if let CycleSkip::Active { remaining, resume } = *self {
            *self = if request_pending {
                CycleSkip::Inactive
            } else {
                CycleSkip::Active { remaining: remaining.saturating_sub(1), resume }
            };
        }
    }

    /// Woken out of Idle by the Go request that started the skip
    pub(crate) fn on_idle_wake(&mut self) {
        if let CycleSkip::Active { remaining, resume } = *self {
            *self = CycleSkip::Active { remaining: remaining.saturating_sub(1), resume };
        }
    }
}
