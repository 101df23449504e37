//! Linux: kernel thread ids and per-thread nice values

use cthread_core::{ErrorKind, ResultExt, ThreadError, ThreadResult};
use std::io;

/// Lowest and highest nice values accepted by the kernel
const NICE_MIN: i32 = -20;
const NICE_MAX: i32 = 19;

/// Kernel thread id (LWP id) of the calling thread
#[inline]
pub fn current_lwpid() -> i32 {
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

/// Shift the nice value of thread `lwpid` by `delta`
///
/// On Linux nice values are per thread, addressed by LWP id. The result is
/// clamped to the kernel range and returned. Raising priority (negative
/// delta) usually needs `CAP_SYS_NICE`.
pub fn set_nice_relative(lwpid: i32, delta: i32) -> ThreadResult<i32> {
    let who = lwpid as libc::id_t;

    // getpriority() may legitimately return -1; errno tells the cases apart.
    let current = unsafe {
        *libc::__errno_location() = 0;
        libc::getpriority(libc::PRIO_PROCESS, who)
    };
    if current == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error().unwrap_or(0) != 0 {
            return Err(ThreadError::from(err)).prepend("getpriority failed");
        }
    }

    let target = current.saturating_add(delta).clamp(NICE_MIN, NICE_MAX);
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, who, target) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        let kind = ErrorKind::Os(err.raw_os_error().unwrap_or(0));
        return Err(ThreadError::with_message(
            kind,
            format!("setpriority({}, {}) failed: {}", lwpid, target, err),
        ));
    }
    Ok(target)
}
