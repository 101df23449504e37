//! Thread lifecycle controller
//!
//! A [`ThreadController`] owns one OS thread and runs it as a state machine:
//!
//! ```text
//! Invalid --start--> Init --> Idle <==> Go
//!                              \       /
//!                               Exiting --> Exited
//! ```
//!
//! Other threads request transitions; the managed thread applies them at
//! its yield point ([`ControllerCore::proc_state`]), which it must call at
//! the top of every loop iteration. The yield point also paces the loop
//! (cycle wait), honors pause requests, runs manually stepped cycles and
//! takes part in group rendezvous.
//!
//! # Example
//!
//! ```ignore
//! use cthread_runtime::ThreadController;
//!
//! let worker = ThreadController::spawn("worker", |ctl| {
//!     while ctl.proc_state().is_continue() {
//!         // one cycle of work
//!     }
//!     Ok(())
//! })?;
//!
//! worker.run(Blocking::Yes)?;
//! worker.pause()?;
//! worker.unpause()?;
//! drop(worker); // forces Exiting and joins
//! ```
//!
//! # Locks
//!
//! Three independent locks, always taken in this order when nested:
//! state lock, then cycle-wait lock or listener lock. The state lock is
//! the only one that may be waited on.

mod cycle;
mod guard;
mod listener;
mod request;
mod yield_point;

#[cfg(test)]
mod tests;

pub use guard::StateGuard;
pub use listener::{ListenerHandle, StateChangeListener};

pub(crate) use cycle::CycleWaitConfig;
use guard::StateData;
use listener::ListenerRegistry;

use crate::config::ControllerConfig;
use crate::{platform, tls};
use cthread_core::{
    kdebug, kerror, kfatal, kinfo, thread_err, Blocking, CycleWaitMode, ResultExt, State,
    StateTransition, ThreadError, ThreadResult,
};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// User function run on the managed thread
pub type ThreadFn = Box<dyn FnOnce(&ControllerCore) -> ThreadResult<()> + Send + 'static>;

/// Shared part of a controller: state, locks, condition variables
///
/// Reached through [`ThreadController`] (the owner), a [`ThreadHandle`], or
/// the reference passed to the user function.
pub struct ControllerCore {
    name: String,
    data: Mutex<StateData>,
    /// Token of the thread holding `data`, `NO_THREAD` when free
    lock_owner: AtomicU64,
    /// Mirror of `data.state` for lock-free reads
    state_word: AtomicU8,
    cycle_count: AtomicU64,
    lwpid: AtomicI32,
    native: AtomicU64,
    /// Token of the managed thread once it runs
    thread_token: AtomicU64,
    joined: AtomicBool,

    cycle_wait: Mutex<CycleWaitConfig>,
    listeners: Mutex<ListenerRegistry>,
    join_handle: Mutex<Option<JoinHandle<()>>>,

    /// Broadcast on every transition
    state_ready: Condvar,
    /// Broadcast on every entry into Go
    go_ready: Condvar,
    /// Broadcast on every entry into Idle
    idle_ready: Condvar,
    /// Wakes the managed thread out of its cycle wait, Idle or sleep
    wake: Condvar,
    paused_cv: Condvar,
    unpause_cv: Condvar,
    skip_advance: Condvar,
}

impl ControllerCore {
    fn new(name: String, config: &ControllerConfig) -> Self {
        Self {
            name,
            data: Mutex::new(StateData::new(config.log_lifecycle)),
            lock_owner: AtomicU64::new(tls::NO_THREAD),
            state_word: AtomicU8::new(State::Invalid as u8),
            cycle_count: AtomicU64::new(0),
            lwpid: AtomicI32::new(0),
            native: AtomicU64::new(0),
            thread_token: AtomicU64::new(tls::NO_THREAD),
            joined: AtomicBool::new(false),
            cycle_wait: Mutex::new(CycleWaitConfig::new(
                config.cycle_wait_mode,
                config.cycle_wait_period,
            )),
            listeners: Mutex::new(ListenerRegistry::new()),
            join_handle: Mutex::new(None),
            state_ready: Condvar::new(),
            go_ready: Condvar::new(),
            idle_ready: Condvar::new(),
            wake: Condvar::new(),
            paused_cv: Condvar::new(),
            unpause_cv: Condvar::new(),
            skip_advance: Condvar::new(),
        }
    }

    // ------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------

    /// Take the state lock
    ///
    /// Aborts the process if the calling thread already holds it.
    pub fn lock_state(&self) -> StateGuard<'_> {
        if self.have_state_lock() {
            kfatal!("'{}': state lock taken twice by the same thread", self.name);
        }
        StateGuard::new(self, self.data.lock())
    }

    /// Whether the calling thread holds the state lock
    #[inline]
    pub fn have_state_lock(&self) -> bool {
        self.lock_owner.load(Ordering::Acquire) == tls::thread_token()
    }

    /// Wait on `cond` under the state lock until notified
    pub fn state_cond_wait(&self, cond: &Condvar) {
        self.lock_state().cond_wait(cond);
    }

    /// Wait on `cond` under the state lock for at most `timeout`
    pub fn state_cond_wait_for(&self, cond: &Condvar, timeout: Duration) -> ThreadResult<()> {
        self.lock_state().cond_wait_for(cond, timeout)
    }

    /// Wait on `cond` under the state lock until `deadline`
    pub fn state_cond_wait_until(&self, cond: &Condvar, deadline: Instant) -> ThreadResult<()> {
        self.lock_state().cond_wait_until(cond, deadline)
    }

    // ------------------------------------------------------------------
    // Lock-free accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> State {
        State::from(self.state_word.load(Ordering::Acquire))
    }

    /// Number of yield points passed so far
    #[inline]
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count.load(Ordering::Acquire)
    }

    /// Kernel thread id of the managed thread, 0 until it runs
    #[inline]
    pub fn lwpid(&self) -> i32 {
        self.lwpid.load(Ordering::Acquire)
    }

    /// Native (pthread) handle of the managed thread, 0 until it runs
    #[inline]
    pub fn native_handle(&self) -> u64 {
        self.native.load(Ordering::Acquire)
    }

    /// Whether the caller is this controller's managed thread
    #[inline]
    pub fn is_current_thread(&self) -> bool {
        self.thread_token.load(Ordering::Acquire) == tls::thread_token()
    }

    #[inline]
    pub fn is_joined(&self) -> bool {
        self.joined.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Locked accessors
    // ------------------------------------------------------------------

    pub fn is_started(&self) -> bool {
        self.lock_state().data.started
    }

    /// Started and neither Exiting nor Exited
    pub fn is_available(&self) -> bool {
        self.lock_state().data.is_available()
    }

    pub fn prev_state(&self) -> State {
        self.lock_state().data.prev
    }

    /// Pending request, if any
    pub fn requested_state(&self) -> Option<State> {
        self.lock_state().data.requested
    }

    /// When `state` was last entered
    pub fn state_timestamp(&self, state: State) -> Option<Instant> {
        self.lock_state().data.timestamps[state.as_index()]
    }

    pub fn is_paused(&self) -> bool {
        self.lock_state().data.paused
    }

    pub fn is_pause_pending(&self) -> bool {
        self.lock_state().data.pause_pending
    }

    /// Outcome of the user function, `None` until it has returned
    pub fn thread_func_result(&self) -> Option<ThreadResult<()>> {
        self.lock_state().data.result.clone()
    }

    /// Threads currently blocked waiting on this controller
    pub fn waiter_count(&self) -> usize {
        self.lock_state().data.wait_count
    }

    pub fn set_lifecycle_logging(&self, enable: bool) {
        self.lock_state().data.log_lifecycle = enable;
    }

    // ------------------------------------------------------------------
    // Cycle wait
    // ------------------------------------------------------------------

    pub fn cycle_wait_mode(&self) -> CycleWaitMode {
        self.cycle_wait.lock().mode
    }

    pub fn cycle_wait_period(&self) -> Duration {
        self.cycle_wait.lock().period
    }

    pub fn set_cycle_wait_mode(&self, mode: CycleWaitMode) {
        let period = self.cycle_wait_period();
        self.set_cycle_wait(mode, period);
    }

    pub fn set_cycle_wait_period(&self, period: Duration) {
        let mode = self.cycle_wait_mode();
        self.set_cycle_wait(mode, period);
    }

    /// Change the cycle wait; a sleeping managed thread re-evaluates its deadline
    pub fn set_cycle_wait(&self, mode: CycleWaitMode, period: Duration) {
        self.cycle_wait.lock().set(mode, period);
        if self.have_state_lock() {
            self.wake.notify_all();
        } else {
            // Under the state lock so the notify cannot fall between the
            // sleeper's generation check and its wait.
            let _g = self.lock_state();
            self.wake.notify_all();
        }
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    pub fn register_state_change_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&ControllerCore, StateTransition) + Send + Sync + 'static,
    {
        self.listeners.lock().register(Box::new(listener))
    }

    pub fn unregister_state_change_listener(&self, handle: ListenerHandle) -> ThreadResult<()> {
        self.listeners
            .lock()
            .unregister(handle)
            .prepend_with(|| format!("'{}'", self.name))
    }

    fn notify_listeners(&self, transition: StateTransition) {
        self.listeners.lock().notify(self, transition);
    }

    // ------------------------------------------------------------------
    // Priority
    // ------------------------------------------------------------------

    /// Shift the managed thread's nice value by `delta`; returns the new value
    pub fn set_relative_priority(&self, delta: i32) -> ThreadResult<i32> {
        let lwpid = self.lwpid();
        if lwpid == 0 || !self.is_started() {
            return Err(thread_err!(NotInitialized, "'{}' is not running", self.name));
        }
        platform::set_nice_relative(lwpid, delta)
            .prepend_with(|| format!("set priority of '{}'", self.name))
    }

    // ------------------------------------------------------------------
    // Internals shared by the submodules
    // ------------------------------------------------------------------

    /// Make `to` current; returns the transition for listeners
    fn enter_state(&self, g: &mut StateGuard<'_>, to: State) -> StateTransition {
        let from = g.data.state;
        g.data.prev = from;
        g.data.state = to;
        g.data.timestamps[to.as_index()] = Some(Instant::now());
        g.data.entries[to.as_index()] += 1;
        self.state_word.store(to as u8, Ordering::Release);
        kdebug!("'{}': {} -> {}", self.name, from, to);
        StateTransition { from, to }
    }

    fn join_thread(&self) {
        let handle = self.join_handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                kerror!("'{}': managed thread terminated abnormally", self.name);
            }
            self.joined.store(true, Ordering::Release);
        }
    }

    /// Thread entry: run the user function, then settle into Exited
    fn thread_main(core: Arc<ControllerCore>, func: ThreadFn) {
        core.thread_token.store(tls::thread_token(), Ordering::Release);
        let current = tls::enter(ThreadHandle { core: Arc::clone(&core) });
        {
            let g = core.lock_state();
            core.lwpid.store(platform::current_lwpid(), Ordering::Release);
            core.native.store(platform::native_handle(), Ordering::Release);
            if g.data.log_lifecycle {
                kinfo!("new thread: '{}' (LWP {})", core.name, core.lwpid());
            }
        }

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| func(core.as_ref()))) {
            Ok(outcome) => outcome,
            Err(payload) => Err(thread_err!(Panicked, "{}", panic_message(payload.as_ref()))),
        };
        drop(current);

        core.finish_thread(outcome);
    }

    fn finish_thread(&self, outcome: ThreadResult<()>) {
        let mut g = self.lock_state();
        if let Some(rendezvous) = g.data.rendezvous.take() {
            rendezvous.arrive();
        }
        if g.data.log_lifecycle {
            match &outcome {
                Ok(()) => kinfo!("'{}': thread exited normally", self.name),
                Err(e) => kerror!("'{}': thread exited with error: {}", self.name, e),
            }
        }
        g.data.result = Some(outcome);
        g.data.requested = None;
        g.data.pause_pending = false;
        g.data.paused = false;
        g.data.skip = Default::default();
        g.data.between_cycles = false;

        let transition = self.enter_state(&mut g, State::Exited);
        self.notify_listeners(transition);
        for cond in [
            &self.state_ready,
            &self.go_ready,
            &self.idle_ready,
            &self.paused_cv,
            &self.skip_advance,
            &self.wake,
        ] {
            cond.notify_all();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "thread function panicked".to_string()
    }
}

impl fmt::Display for ControllerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (started, state, requested) = {
            let g = self.lock_state();
            (g.data.started, g.data.state, g.data.requested)
        };
        let cycle_wait = *self.cycle_wait.lock();
        write!(
            f,
            "name = {}, initialized = {}, LWPID = {}, native handle = {:#x}, \
             current state = \"{}\", pending state = \"{}\", \
             cycle wait type = \"{}\", cycle wait period = {} us",
            self.name,
            if started { "yes" } else { "no" },
            self.lwpid(),
            self.native_handle(),
            state,
            requested.map(|s| s.name()).unwrap_or("(none)"),
            cycle_wait.mode,
            cycle_wait.period.as_micros(),
        )
    }
}

impl fmt::Debug for ControllerCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerCore")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("cycle_count", &self.cycle_count())
            .finish()
    }
}

/// Cloneable reference to a controller, for threads other than the owner
#[derive(Clone)]
pub struct ThreadHandle {
    core: Arc<ControllerCore>,
}

impl Deref for ThreadHandle {
    type Target = ControllerCore;

    fn deref(&self) -> &ControllerCore {
        &self.core
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.core, f)
    }
}

/// Owner of one managed thread
///
/// Not `Clone`: exactly one owner exists. Dropping it forces the thread to
/// exit and joins it.
pub struct ThreadController {
    core: Arc<ControllerCore>,
    func: Mutex<Option<ThreadFn>>,
    config: ControllerConfig,
}

impl ThreadController {
    /// New controller with configuration from the environment; not started
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnOnce(&ControllerCore) -> ThreadResult<()> + Send + 'static,
    {
        Self::with_config(name, ControllerConfig::default(), func)
    }

    pub fn with_config<F>(name: impl Into<String>, config: ControllerConfig, func: F) -> Self
    where
        F: FnOnce(&ControllerCore) -> ThreadResult<()> + Send + 'static,
    {
        Self {
            core: Arc::new(ControllerCore::new(name.into(), &config)),
            func: Mutex::new(Some(Box::new(func))),
            config,
        }
    }

    /// `new` followed by `start`
    pub fn spawn<F>(name: impl Into<String>, func: F) -> ThreadResult<Self>
    where
        F: FnOnce(&ControllerCore) -> ThreadResult<()> + Send + 'static,
    {
        let controller = Self::new(name, func);
        controller.start()?;
        Ok(controller)
    }

    /// Spawn the managed thread, blocking per `config.start_blocking`
    pub fn start(&self) -> ThreadResult<()> {
        self.start_with(Blocking::from(self.config.start_blocking))
    }

    /// Spawn the managed thread; with `Blocking::Yes`, wait until it is Idle
    pub fn start_with(&self, block: Blocking) -> ThreadResult<()> {
        let core = &self.core;
        self.config
            .validate()
            .map_err(|e| thread_err!(InvalidArgument, "{}", e))
            .prepend_with(|| format!("start '{}'", core.name))?;

        let mut g = core.lock_state();
        if g.data.started {
            return Err(thread_err!(StateAlreadyEffective, "'{}' has already been started", core.name));
        }
        let func = self.func.lock().take().ok_or_else(|| {
            thread_err!(ResourceUnavailable, "'{}' lost its thread function in a failed start", core.name)
        })?;

        g.data.started = true;
        let transition = core.enter_state(&mut g, State::Init);
        core.notify_listeners(transition);
        g.data.requested = Some(State::Idle);

        let mut builder = thread::Builder::new().name(core.name.clone());
        if let Some(size) = self.config.stack_size {
            builder = builder.stack_size(size);
        }
        let thread_core = Arc::clone(core);
        match builder.spawn(move || ControllerCore::thread_main(thread_core, func)) {
            Ok(handle) => *core.join_handle.lock() = Some(handle),
            Err(e) => {
                g.data.started = false;
                g.data.requested = None;
                core.enter_state(&mut g, State::Invalid);
                return Err(ThreadError::from(e).prepend(format!("spawn '{}'", core.name)));
            }
        }

        if block.is_yes() {
            core.wait_for_state_locked(&mut g, State::Idle, None, false)
                .prepend_with(|| format!("start '{}'", core.name))?;
        }
        Ok(())
    }

    /// Reference usable from other threads
    pub fn handle(&self) -> ThreadHandle {
        ThreadHandle { core: Arc::clone(&self.core) }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Request Exiting, wait for Exited and join the OS thread
    pub fn join(&self) -> ThreadResult<()> {
        if self.core.is_started() {
            self.core.exit(Blocking::Yes)?;
        }
        self.core.join_thread();
        Ok(())
    }
}

impl Deref for ThreadController {
    type Target = ControllerCore;

    fn deref(&self) -> &ControllerCore {
        &self.core
    }
}

impl fmt::Debug for ThreadController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.core, f)
    }
}

impl Drop for ThreadController {
    fn drop(&mut self) {
        if !self.core.is_started() {
            return;
        }
        if self.core.is_current_thread() {
            // Cannot join from inside the managed thread; let it wind down.
            let _ = self.core.request_state(State::Exiting, Blocking::No);
            return;
        }
        if let Err(e) = self.core.exit(Blocking::Yes) {
            kdebug!("'{}': exit on drop: {}", self.core.name, e);
        }
        self.core.join_thread();
    }
}
