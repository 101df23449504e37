//! Operations issued by threads other than the managed one: state
//! requests, waits, pause control and manual stepping. The managed thread
//! may call most of them too, as long as it does not block on itself.

use super::{ControllerCore, StateGuard};
use crate::barrier::GoRendezvous;
use cthread_core::{
    kdebug, kinvariant, thread_err, Blocking, ProcStateResult, ResultExt, State, ThreadResult,
    Timeout,
};
use std::sync::Arc;
use std::time::Instant;

impl ControllerCore {
    /// Ask for a transition to `new`
    ///
    /// `Timeout::NonBlocking` returns once the request is recorded;
    /// otherwise the call waits until `new` has been entered, the deadline
    /// passes (`TimedOut`) or the thread starts exiting (`ShuttingDown`,
    /// or `ResourceUnavailable` once Exited).
    pub fn request_state(&self, new: State, timeout: impl Into<Timeout>) -> ThreadResult<()> {
        let timeout = timeout.into();
        if !new.is_requestable() {
            return Err(thread_err!(InvalidArgument, "{} cannot be requested directly", new))
                .prepend_with(|| format!("'{}'", self.name));
        }

        let mut g = self.lock_state();
        if !g.data.started {
            return Err(thread_err!(NotInitialized, "'{}' has not been started", self.name));
        }
        self.request_state_locked(&mut g, new, timeout)
            .prepend_with(|| format!("request {} on '{}'", new, self.name))
    }

    pub(crate) fn request_state_locked(
        &self,
        g: &mut StateGuard<'_>,
        new: State,
        timeout: Timeout,
    ) -> ThreadResult<()> {
        let deadline = timeout.deadline_from(Instant::now());

        if new == State::Exiting && g.data.paused {
            self.unpause_locked(g);
        }
        match g.data.state {
            State::Exited if new == State::Exiting => return Ok(()),
            State::Exited => return Err(thread_err!(ResourceUnavailable, "thread has exited")),
            State::Exiting if new == State::Exiting => return Ok(()),
            State::Exiting => return Err(thread_err!(ShuttingDown, "thread is exiting")),
            _ => {}
        }
        if g.data.paused {
            self.unpause_locked(g);
        }
        if g.data.requested == Some(State::Exiting) && new != State::Exiting {
            return Err(thread_err!(ShuttingDown, "exit already requested"));
        }

        if new == g.data.state {
            if new == State::Idle && g.data.rendezvous.is_some() {
                // The member already idles; the group Go pending on it wins.
                kdebug!("'{}': Idle request ignored for pending group Go", self.name);
                return Ok(());
            }
            if g.data.requested.is_some_and(|pending| pending != new) {
                // Let waiters on the dropped request re-record it.
                self.go_ready.notify_all();
                self.idle_ready.notify_all();
            }
            g.data.requested = None;
            self.state_ready.notify_all();
            return Ok(());
        }

        if timeout.is_blocking() && self.is_current_thread() {
            return Err(thread_err!(
                DeadlockAverted,
                "a thread cannot block on a request for its own state"
            ));
        }
        g.data.requested = Some(new);
        self.wake.notify_all();

        if !timeout.is_blocking() {
            return Ok(());
        }
        self.wait_for_state_locked(g, new, deadline, true)
    }

    /// Block until `desired` is current or has been entered since the call
    ///
    /// With `reassert`, the caller owns a request for `desired` and records
    /// it again whenever another request displaced it while waiting.
    pub(crate) fn wait_for_state_locked(
        &self,
        g: &mut StateGuard<'_>,
        desired: State,
        deadline: Option<Instant>,
        reassert: bool,
    ) -> ThreadResult<()> {
        let idx = desired.as_index();
        let entries = g.data.entries[idx];
        let cond = match desired {
            State::Idle => &self.idle_ready,
            State::Go => &self.go_ready,
            _ => &self.state_ready,
        };

        loop {
            if g.data.state == desired || g.data.entries[idx] != entries {
                return Ok(());
            }
            match g.data.state {
                State::Exited if desired == State::Exiting => return Ok(()),
                State::Exited => {
                    return Err(thread_err!(
                        ResourceUnavailable,
                        "thread exited before reaching {}",
                        desired
                    ))
                }
                State::Exiting if desired != State::Exited => {
                    return Err(thread_err!(
                        ShuttingDown,
                        "thread is exiting, {} will not be reached",
                        desired
                    ))
                }
                _ => {}
            }
            if reassert {
                match g.data.requested {
                    Some(State::Exiting) if desired != State::Exiting => {
                        return Err(thread_err!(
                            ShuttingDown,
                            "exit requested while waiting for {}",
                            desired
                        ))
                    }
                    Some(pending) if pending == desired => {}
                    _ if desired == State::Idle && g.data.rendezvous.is_some() => {}
                    _ => {
                        g.data.requested = Some(desired);
                        self.wake.notify_all();
                    }
                }
            }
            if g.wait_on(cond, deadline) {
                if g.data.state == desired || g.data.entries[idx] != entries {
                    return Ok(());
                }
                return Err(thread_err!(TimedOut, "timed out waiting for {}", desired));
            }
        }
    }

    /// `request_state(Go, timeout)`
    pub fn run(&self, timeout: impl Into<Timeout>) -> ThreadResult<()> {
        self.request_state(State::Go, timeout)
    }

    /// `request_state(Idle, timeout)`
    pub fn idle(&self, timeout: impl Into<Timeout>) -> ThreadResult<()> {
        self.request_state(State::Idle, timeout)
    }

    /// Request Exiting; when blocking, wait for Exited
    ///
    /// Calling it on an exiting or exited thread is not an error.
    pub fn exit(&self, timeout: impl Into<Timeout>) -> ThreadResult<()> {
        let timeout = timeout.into();
        let deadline = timeout.deadline_from(Instant::now());

        let mut g = self.lock_state();
        if !g.data.started {
            return Err(thread_err!(NotInitialized, "'{}' has not been started", self.name));
        }
        if g.data.state == State::Exited {
            return Ok(());
        }
        if timeout.is_blocking() && self.is_current_thread() {
            return Err(thread_err!(
                DeadlockAverted,
                "'{}' cannot wait for its own exit",
                self.name
            ));
        }
        self.request_state_locked(&mut g, State::Exiting, Timeout::NonBlocking)
            .prepend_with(|| format!("exit '{}'", self.name))?;
        if !timeout.is_blocking() {
            return Ok(());
        }
        self.wait_for_state_locked(&mut g, State::Exited, deadline, false)
            .prepend_with(|| format!("exit '{}'", self.name))
    }

    /// Wait with no deadline until the thread is in `desired`
    pub fn state_wait(&self, desired: State) -> ThreadResult<()> {
        self.state_wait_impl(desired, None)
    }

    /// Wait until the thread is in `desired` or `timeout` passes
    ///
    /// `Timeout::NonBlocking` checks once.
    pub fn state_wait_for(&self, desired: State, timeout: impl Into<Timeout>) -> ThreadResult<()> {
        let deadline = timeout.into().deadline_from(Instant::now());
        self.state_wait_impl(desired, deadline)
    }

    fn state_wait_impl(&self, desired: State, deadline: Option<Instant>) -> ThreadResult<()> {
        if matches!(desired, State::Invalid | State::Init) {
            return Err(thread_err!(InvalidArgument, "cannot wait for {}", desired));
        }
        if !kinvariant!(
            !self.is_current_thread(),
            "'{}': managed thread waited on its own state",
            self.name
        ) {
            return Err(thread_err!(ThreadRestriction, "a thread cannot wait on its own state"));
        }

        let mut g = self.lock_state();
        if !g.data.started {
            return Err(thread_err!(NotInitialized, "'{}' has not been started", self.name));
        }
        self.wait_for_state_locked(&mut g, desired, deadline, false)
            .prepend_with(|| format!("wait for '{}' to reach {}", self.name, desired))
    }

    /// Ask the managed thread to park inside its yield point
    ///
    /// If the thread is between cycles the call returns once it has
    /// actually parked; otherwise it returns right away and the pause takes
    /// effect at the end of the next yield point.
    pub fn pause(&self) -> ThreadResult<()> {
        let mut g = self.lock_state();
        if !g.data.started {
            return Err(thread_err!(NotInitialized, "'{}' has not been started", self.name));
        }
        if g.data.paused {
            return Err(thread_err!(StateAlreadyEffective, "'{}' is already paused", self.name));
        }
        if !g.data.is_available() {
            return Err(thread_err!(
                ResourceUnavailable,
                "cannot pause '{}' in state {}",
                self.name,
                g.data.state
            ));
        }

        g.data.pause_pending = true;
        kdebug!("'{}': pause requested", self.name);
        if self.is_current_thread() || !g.data.between_cycles {
            return Ok(());
        }

        let honored = g.data.paused_count;
        self.wake.notify_all();
        while g.data.paused_count == honored && g.data.pause_pending && g.data.is_available() {
            g.wait_on(&self.paused_cv, None);
        }
        Ok(())
    }

    /// Release a paused thread, or cancel a pause not yet honored
    pub fn unpause(&self) -> ThreadResult<()> {
        let mut g = self.lock_state();
        if !g.data.started {
            return Err(thread_err!(NotInitialized, "'{}' has not been started", self.name));
        }
        if !g.data.paused {
            if g.data.pause_pending {
                g.data.pause_pending = false;
                self.paused_cv.notify_all();
                return Ok(());
            }
            return Err(thread_err!(StateAlreadyEffective, "'{}' isn't paused", self.name));
        }
        self.unpause_locked(&mut g);
        Ok(())
    }

    pub(crate) fn unpause_locked(&self, g: &mut StateGuard<'_>) {
        g.data.paused = false;
        self.unpause_cv.notify_all();
        kdebug!("'{}': unpause", self.name);
    }

    /// Interruptible sleep for the managed thread
    ///
    /// Returns `Ok` when the full duration elapsed and
    /// `InterruptedOperation` when a state request (or any other wake)
    /// cut it short. `Timeout::Forever` always ends interrupted.
    pub fn sleep(&self, max: impl Into<Timeout>) -> ThreadResult<()> {
        if !self.is_current_thread() {
            return Err(thread_err!(
                ThreadRestriction,
                "only the managed thread of '{}' may sleep on it",
                self.name
            ));
        }
        let max = max.into();
        let mut g = self.lock_state();
        if g.data.requested.is_some() {
            return Err(thread_err!(InterruptedOperation, "state change pending"));
        }
        let deadline = match max {
            Timeout::NonBlocking => return Ok(()),
            other => other.deadline_from(Instant::now()),
        };
        if g.wait_on(&self.wake, deadline) {
            return Ok(());
        }
        Err(thread_err!(InterruptedOperation, "thread sleep was interrupted"))
    }

    /// Managed thread asks for its own exit and passes a yield point
    pub fn set_self_exiting(&self) -> ThreadResult<ProcStateResult> {
        if !self.is_current_thread() {
            return Err(thread_err!(
                ThreadRestriction,
                "only the managed thread of '{}' may set itself exiting",
                self.name
            ));
        }
        self.request_state(State::Exiting, Timeout::NonBlocking)?;
        Ok(self.proc_state())
    }

    /// `run_n_cycles(1, block)`
    pub fn run_one_cycle(&self, block: Blocking) -> ThreadResult<()> {
        self.run_n_cycles(1, block)
    }

    /// Run `n` cycle bodies back to back, ignoring the cycle wait
    ///
    /// From Idle the thread is woken into Go and returns to Idle after the
    /// `n` bodies. Overlapping calls keep the larger count. With
    /// `Blocking::Yes` the call returns once `n` bodies have completed, the
    /// stepping was superseded by a state request, or the thread went away.
    pub fn run_n_cycles(&self, n: i64, block: Blocking) -> ThreadResult<()> {
        if n < 0 {
            return Err(thread_err!(InvalidArgument, "cycle count must not be negative, got {}", n));
        }
        if n == 0 {
            return Ok(());
        }
        let n = n as u64;

        let mut g = self.lock_state();
        if !g.data.started {
            return Err(thread_err!(NotInitialized, "'{}' has not been started", self.name));
        }
        let state = g.data.state;
        match state {
            State::Exiting | State::Exited => {
                return Err(thread_err!(ShuttingDown, "cannot step '{}' in state {}", self.name, state))
            }
            State::Invalid | State::Init => {
                return Err(thread_err!(NotInitialized, "'{}' has not reached Idle yet", self.name))
            }
            State::Idle | State::Go => {}
        }
        if block.is_yes() && self.is_current_thread() {
            return Err(thread_err!(DeadlockAverted, "'{}' cannot wait for its own cycles", self.name));
        }

        g.data.skip.request(n, state);
        if state == State::Idle {
            self.request_state_locked(&mut g, State::Go, Timeout::NonBlocking)
                .prepend_with(|| format!("step '{}'", self.name))?;
        } else {
            self.wake.notify_all();
        }
        if !block.is_yes() {
            return Ok(());
        }

        let extra = if g.data.between_cycles { 0 } else { 1 };
        let stop = self.cycle_count() + n + extra;
        while self.cycle_count() < stop && g.data.skip.is_active() && g.data.is_available() {
            g.wait_on(&self.skip_advance, None);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Group barrier hooks
    // ------------------------------------------------------------------

    /// Enlist in a group request, attaching the Go rendezvous if any
    pub(crate) fn prepare_group_request(&self, rendezvous: Option<&Arc<GoRendezvous>>) -> ThreadResult<()> {
        if self.is_current_thread() {
            return Err(thread_err!(
                DeadlockAverted,
                "'{}' cannot take part in a group request it issued",
                self.name
            ));
        }
        let mut g = self.lock_state();
        if !g.data.started {
            return Err(thread_err!(NotInitialized, "'{}' has not been started", self.name));
        }
        match g.data.state {
            State::Exiting => return Err(thread_err!(ShuttingDown, "'{}' is exiting", self.name)),
            State::Exited => return Err(thread_err!(ResourceUnavailable, "'{}' has exited", self.name)),
            _ => {}
        }
        if let Some(rendezvous) = rendezvous {
            if g.data.rendezvous.is_some() {
                return Err(thread_err!(
                    ResourceUnavailable,
                    "'{}' is already part of a group rendezvous",
                    self.name
                ));
            }
            g.data.rendezvous = Some(Arc::clone(rendezvous));
            self.wake.notify_all();
        }
        Ok(())
    }

    /// Withdraw from a rendezvous the managed thread has not passed yet
    ///
    /// Returns `true` if the rendezvous was still attached, in which case
    /// the caller owns the member's share of the count.
    pub(crate) fn cancel_group_request(&self) -> bool {
        self.lock_state().data.rendezvous.take().is_some()
    }

    /// Body of one barrier helper thread
    pub(crate) fn apply_group_request(&self, target: State) -> ThreadResult<()> {
        if target == State::Exited {
            self.request_state(State::Exiting, Timeout::NonBlocking)?;
            return self.state_wait(State::Exited);
        }
        self.request_state(target, Timeout::Forever)
    }
}
