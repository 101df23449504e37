//! Thread-local identity and self handle
//!
//! Every OS thread that touches a controller gets a small numeric token,
//! used to track lock ownership and to recognise a controller's own thread.
//! Managed threads additionally carry a handle to their controller for the
//! lifetime of the user function.

use crate::controller::ThreadHandle;
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicU64, Ordering};

/// Token value that never belongs to a thread
pub(crate) const NO_THREAD: u64 = 0;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Lazily assigned token of this OS thread
    static THREAD_TOKEN: Cell<u64> = const { Cell::new(NO_THREAD) };

    /// Controller of the managed thread running here, if any
    static CURRENT: RefCell<Option<ThreadHandle>> = const { RefCell::new(None) };
}

/// Token of the calling OS thread (never `NO_THREAD`)
#[inline]
pub fn thread_token() -> u64 {
    THREAD_TOKEN.with(|cell| {
        let token = cell.get();
        if token != NO_THREAD {
            return token;
        }
        let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        cell.set(token);
        token
    })
}

/// Handle of the controller whose managed thread is calling, if any
pub fn current() -> Option<ThreadHandle> {
    CURRENT.with(|cell| cell.borrow().clone())
}

/// Check if the caller is a managed thread
#[inline]
pub fn is_managed_thread() -> bool {
    CURRENT.with(|cell| cell.borrow().is_some())
}

/// Publish `handle` as this thread's controller until the guard drops
pub(crate) fn enter(handle: ThreadHandle) -> CurrentGuard {
    CURRENT.with(|cell| *cell.borrow_mut() = Some(handle));
    CurrentGuard { _private: () }
}

/// Clears the thread's controller handle on drop
pub(crate) struct CurrentGuard {
    _private: (),
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        // Take first so the handle is released outside the borrow.
        let handle = CURRENT.with(|cell| cell.borrow_mut().take());
        drop(handle);
    }
}
