//! The cooperative yield point
//!
//! `proc_state` is the only place where transitions are applied. One call:
//!
//! 1. counts the cycle;
//! 2. stops right away when Exiting;
//! 3. advances an active cycle skip;
//! 4. sleeps out the cycle wait when nothing is pending;
//! 5. applies the pending request (Idle parks here until woken);
//! 6. passes a pending group rendezvous;
//! 7. honors a pending pause.

use super::cycle::SkipStep;
use super::{ControllerCore, StateGuard};
use cthread_core::{
    kdebug, kfatal, kinvariant, CycleWaitMode, ProcStateResult, State, StateTransition,
};
use std::sync::atomic::Ordering;
use std::time::Instant;

/// How a cycle-wait sleep ended
enum CycleWait {
    /// Cycle wait disabled
    NoSleep,
    /// Full period slept; the next cycle is stamped at this instant
    Elapsed(Instant),
    /// Cut short by a request, skip or rendezvous
    Woken,
}

impl ControllerCore {
    /// Yield point of the managed thread
    ///
    /// Must be called by the managed thread at the top of every loop
    /// iteration. On `Stop` the thread function has to return. Calling it
    /// from any other thread aborts the process.
    pub fn proc_state(&self) -> ProcStateResult {
        if !self.is_current_thread() {
            kfatal!("'{}': proc_state called from a foreign thread", self.name);
        }

        let mut g = self.lock_state();
        self.cycle_count.fetch_add(1, Ordering::AcqRel);

        if g.data.state == State::Exiting {
            return self.finish_cycle(&mut g, None, ProcStateResult::Stop);
        }

        let pending = g.data.requested.is_some();
        match g.data.skip.on_yield(pending) {
            SkipStep::Normal => {}
            SkipStep::RunCycle => {
                self.skip_advance.notify_all();
                return self.finish_cycle(&mut g, None, ProcStateResult::Continue);
            }
            SkipStep::Finished { resume } => {
                self.skip_advance.notify_all();
                if resume == State::Idle && g.data.requested.is_none() {
                    g.data.requested = Some(State::Idle);
                }
            }
            SkipStep::Cancelled => {
                self.skip_advance.notify_all();
            }
        }

        g.data.between_cycles = true;
        if g.data.requested.is_none() && g.data.rendezvous.is_none() {
            match self.cycle_wait(&mut g) {
                CycleWait::NoSleep => {
                    g.data.prev_cycle = Some(Instant::now());
                    return self.finish_cycle(&mut g, None, ProcStateResult::Continue);
                }
                CycleWait::Elapsed(at) => {
                    g.data.prev_cycle = Some(at);
                    return self.finish_cycle(&mut g, None, ProcStateResult::Continue);
                }
                CycleWait::Woken => g.data.prev_cycle = Some(Instant::now()),
            }
        }

        let mut transition = None;
        let mut result = ProcStateResult::Continue;
        while let Some(next) = g.data.requested {
            if next == g.data.state {
                g.data.requested = None;
                break;
            }
            match next {
                State::Go => {
                    g.data.requested = None;
                    transition = Some(self.enter_state(&mut g, State::Go));
                    self.go_ready.notify_all();
                }
                State::Idle if g.data.rendezvous.is_some() => {
                    // A group Go in flight wins over Idle, or the rendezvous
                    // would never complete.
                    kdebug!("'{}': Idle dropped for pending group Go", self.name);
                    g.data.requested = Some(State::Go);
                }
                State::Idle => {
                    g.data.requested = None;
                    let entered = self.enter_state(&mut g, State::Idle);
                    self.idle_ready.notify_all();
                    self.state_ready.notify_all();
                    self.notify_listeners(entered);
                    transition = None;
                    self.idle_until_woken(&mut g);
                }
                State::Exiting => {
                    g.data.requested = None;
                    transition = Some(self.enter_state(&mut g, State::Exiting));
                    result = ProcStateResult::Stop;
                    self.go_ready.notify_all();
                    self.idle_ready.notify_all();
                    self.skip_advance.notify_all();
                    break;
                }
                other => {
                    kinvariant!(false, "'{}': {} found as pending state", self.name, other);
                    g.data.requested = None;
                }
            }
        }

        self.finish_cycle(&mut g, transition, result)
    }

    /// Steps 5 to 7 common to every exit path of the yield point
    fn finish_cycle(
        &self,
        g: &mut StateGuard<'_>,
        transition: Option<StateTransition>,
        result: ProcStateResult,
    ) -> ProcStateResult {
        if let Some(transition) = transition {
            self.notify_listeners(transition);
            self.state_ready.notify_all();
        }

        if let Some(rendezvous) = g.data.rendezvous.take() {
            if g.data.state == State::Go {
                g.unlocked(|| rendezvous.arrive_and_wait());
            } else {
                rendezvous.arrive();
            }
        }

        g.data.between_cycles = false;
        if g.data.state.is_terminating() {
            if g.data.pause_pending {
                g.data.pause_pending = false;
                self.paused_cv.notify_all();
            }
        } else {
            self.consider_pause(g);
        }
        result
    }

    /// Park while paused if a pause is pending
    fn consider_pause(&self, g: &mut StateGuard<'_>) {
        if !g.data.pause_pending {
            return;
        }
        g.data.pause_pending = false;
        g.data.paused = true;
        g.data.paused_count += 1;
        self.paused_cv.notify_all();
        kdebug!("'{}': paused in {}", self.name, g.data.state);

        while g.data.paused {
            g.wait_on(&self.unpause_cv, None);
        }
        kdebug!("'{}': resumed", self.name);
    }

    /// Idle: block until a request arrives, honoring pauses meanwhile
    fn idle_until_woken(&self, g: &mut StateGuard<'_>) {
        while g.data.requested.is_none() {
            if g.data.pause_pending {
                self.consider_pause(g);
                continue;
            }
            g.wait_on(&self.wake, None);
        }
        g.data.skip.on_idle_wake();
        g.data.prev_cycle = Some(Instant::now());
    }

    /// Sleep out the cycle wait
    ///
    /// Wakes early for a pending request, skip or rendezvous. Pauses park
    /// inside the sleep; Relative restarts its period after an unpause while
    /// Absolute keeps its deadline. A changed cycle-wait configuration is
    /// picked up on the next wake.
    fn cycle_wait(&self, g: &mut StateGuard<'_>) -> CycleWait {
        let mut config = *self.cycle_wait.lock();
        if !config.sleeps() {
            return CycleWait::NoSleep;
        }

        let mut entered = Instant::now();
        loop {
            if g.data.pause_pending {
                self.consider_pause(g);
                if config.mode == CycleWaitMode::Relative {
                    entered = Instant::now();
                }
            }

            if g.data.requested.is_some() || g.data.rendezvous.is_some() {
                let skipping = g.data.skip.is_active();
                let pending = g.data.requested.is_some();
                g.data.skip.on_sleep_wake(pending);
                if skipping && !g.data.skip.is_active() {
                    self.skip_advance.notify_all();
                }
                return CycleWait::Woken;
            }
            if g.data.skip.is_active() {
                g.data.skip.on_sleep_wake(false);
                return CycleWait::Woken;
            }

            let latest = *self.cycle_wait.lock();
            if latest.generation != config.generation {
                config = latest;
                if !config.sleeps() {
                    return CycleWait::Woken;
                }
            }

            let deadline = config.deadline(entered, g.data.prev_cycle);
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    let at = if config.mode == CycleWaitMode::Absolute
                        && now.duration_since(deadline) < config.period
                    {
                        deadline
                    } else {
                        now
                    };
                    return CycleWait::Elapsed(at);
                }
            }

            g.wait_on(&self.wake, deadline);
        }
    }
}
