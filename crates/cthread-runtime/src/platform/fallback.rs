//! Platforms without per-thread kernel ids or nice values

use cthread_core::{thread_err, ThreadResult};

/// No LWP ids here; 0 means unknown
#[inline]
pub fn current_lwpid() -> i32 {
    0
}

pub fn set_nice_relative(_lwpid: i32, _delta: i32) -> ThreadResult<i32> {
    Err(thread_err!(Unsupported, "per-thread priority is not available on this platform"))
}
