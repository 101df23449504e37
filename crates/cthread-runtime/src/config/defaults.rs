//! Library defaults for `ControllerConfig`

use cthread_core::CycleWaitMode;

/// Cycle wait policy of a new controller
pub const CYCLE_WAIT_MODE: CycleWaitMode = CycleWaitMode::Absolute;

/// Cycle wait period in microseconds; 0 means no sleeping between cycles
pub const CYCLE_WAIT_PERIOD_US: u64 = 0;

/// Log start/exit of managed threads
pub const LOG_LIFECYCLE: bool = true;

/// `start()` blocks until the thread reaches Idle
pub const START_BLOCKING: bool = true;

/// Smallest stack accepted for a managed thread
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Longest accepted cycle wait period (one day)
pub const MAX_CYCLE_WAIT_PERIOD_US: u64 = 24 * 60 * 60 * 1_000_000;
