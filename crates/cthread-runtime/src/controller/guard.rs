//! The state lock and what it protects
//!
//! `StateGuard` wraps the parking_lot guard and keeps the controller's
//! owner token in step with it, so a thread trying to take the lock a second
//! time is caught instead of deadlocking. Waits through the guard release
//! the owner token for their duration and keep the waiter count balanced on
//! every return path, timeouts included.

use super::cycle::CycleSkip;
use super::ControllerCore;
use crate::barrier::GoRendezvous;
use crate::tls::{self, NO_THREAD};
use cthread_core::{kinvariant, thread_err, State, ThreadResult};
use parking_lot::{Condvar, MutexGuard};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything serialized by the state lock
pub(crate) struct StateData {
    pub(crate) started: bool,
    pub(crate) state: State,
    pub(crate) requested: Option<State>,
    pub(crate) prev: State,
    /// Last entry into each state
    pub(crate) timestamps: [Option<Instant>; State::COUNT],
    /// Number of entries into each state
    pub(crate) entries: [u64; State::COUNT],
    /// Inside the yield point, sleeping or idle
    pub(crate) between_cycles: bool,
    /// Start of the previous cycle body
    pub(crate) prev_cycle: Option<Instant>,
    pub(crate) skip: CycleSkip,
    pub(crate) pause_pending: bool,
    pub(crate) paused: bool,
    /// Number of pauses honored so far
    pub(crate) paused_count: u64,
    /// Threads currently blocked in a wait on this lock
    pub(crate) wait_count: usize,
    /// Group Go rendezvous this controller has to pass
    pub(crate) rendezvous: Option<Arc<GoRendezvous>>,
    pub(crate) result: Option<ThreadResult<()>>,
    pub(crate) log_lifecycle: bool,
}

impl StateData {
    pub(crate) fn new(log_lifecycle: bool) -> Self {
        Self {
            started: false,
            state: State::Invalid,
            requested: None,
            prev: State::Invalid,
            timestamps: [None; State::COUNT],
            entries: [0; State::COUNT],
            between_cycles: false,
            prev_cycle: None,
            skip: CycleSkip::Inactive,
            pause_pending: false,
            paused: false,
            paused_count: 0,
            wait_count: 0,
            rendezvous: None,
            result: None,
            log_lifecycle,
        }
    }

    /// Started and not on the way out
    #[inline]
    pub(crate) fn is_available(&self) -> bool {
        self.started && !self.state.is_terminating()
    }
}

/// Held state lock of one controller
///
/// Obtained from [`ControllerCore::lock_state`]. While it is held the
/// controller's state cannot change, and every locking method of the same
/// controller called from this thread aborts the process.
pub struct StateGuard<'a> {
    pub(crate) core: &'a ControllerCore,
    pub(crate) data: MutexGuard<'a, StateData>,
}

impl<'a> StateGuard<'a> {
    pub(crate) fn new(core: &'a ControllerCore, data: MutexGuard<'a, StateData>) -> Self {
        core.lock_owner.store(tls::thread_token(), Ordering::Release);
        Self { core, data }
    }

    pub fn state(&self) -> State {
        self.data.state
    }

    pub fn requested_state(&self) -> Option<State> {
        self.data.requested
    }

    pub fn prev_state(&self) -> State {
        self.data.prev
    }

    pub fn is_paused(&self) -> bool {
        self.data.paused
    }

    pub fn is_available(&self) -> bool {
        self.data.is_available()
    }

    /// Block on `cond` until notified, releasing the state lock meanwhile
    pub fn cond_wait(&mut self, cond: &Condvar) {
        self.wait_on(cond, None);
    }

    /// Block on `cond` for at most `timeout`
    ///
    /// A zero timeout returns at once; `Duration::MAX` waits with no
    /// deadline.
    pub fn cond_wait_for(&mut self, cond: &Condvar, timeout: Duration) -> ThreadResult<()> {
        if timeout.is_zero() {
            return Ok(());
        }
        match Instant::now().checked_add(timeout) {
            Some(deadline) if timeout != Duration::MAX => self.cond_wait_until(cond, deadline),
            _ => {
                self.wait_on(cond, None);
                Ok(())
            }
        }
    }

    /// Block on `cond` until notified or `deadline` passes
    pub fn cond_wait_until(&mut self, cond: &Condvar, deadline: Instant) -> ThreadResult<()> {
        if self.wait_on(cond, Some(deadline)) {
            return Err(thread_err!(TimedOut, "timed out while waiting for thread condition"));
        }
        Ok(())
    }

    /// Wait on `cond`; returns `true` if the deadline passed
    ///
    /// Only threads other than the managed one are counted as waiters; its
    /// own parking in Idle, sleep or pause is not.
    pub(crate) fn wait_on(&mut self, cond: &Condvar, deadline: Option<Instant>) -> bool {
        let counted = !self.core.is_current_thread();
        if counted {
            self.data.wait_count += 1;
        }
        self.core.lock_owner.store(NO_THREAD, Ordering::Release);

        let timed_out = match deadline {
            Some(deadline) => cond.wait_until(&mut self.data, deadline).timed_out(),
            None => {
                cond.wait(&mut self.data);
                false
            }
        };

        self.core.lock_owner.store(tls::thread_token(), Ordering::Release);
        if counted
            && kinvariant!(
                self.data.wait_count > 0,
                "'{}': waiter count underflow",
                self.core.name()
            )
        {
            self.data.wait_count -= 1;
        }
        timed_out
    }

    /// Run `f` with the state lock released
    pub(crate) fn unlocked<R>(&mut self, f: impl FnOnce() -> R) -> R {
        self.core.lock_owner.store(NO_THREAD, Ordering::Release);
        let ret = MutexGuard::unlocked(&mut self.data, f);
        self.core.lock_owner.store(tls::thread_token(), Ordering::Release);
        ret
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        // Cleared before the mutex guard field is dropped, i.e. while still locked.
        self.core.lock_owner.store(NO_THREAD, Ordering::Release);
    }
}
