//! # cthread - Cooperative Thread-Lifecycle Controller
//!
//! Turns an OS thread into a small state machine driven from outside.
//!
//! ## Features
//!
//! - **Lifecycle**: Init, Idle, Go, Exiting, Exited; monotone once exiting
//! - **Blocking policies**: non-blocking, forever, or a timeout on every request
//! - **Cycle pacing**: Absolute (fixed cadence), Relative (flat sleep), Indefinite
//! - **Pause**: freeze the thread inside its yield point without changing state
//! - **Stepping**: run exactly N cycles, then fall back to the previous state
//! - **Group barrier**: move many controllers at once; Go starts them in lockstep
//! - **Listeners**: callbacks on every completed transition
//!
//! ## Quick Start
//!
//! ```ignore
//! use cthread::{Blocking, ThreadController};
//!
//! fn main() -> cthread::ThreadResult<()> {
//!     let worker = ThreadController::spawn("worker", |ctl| {
//!         while ctl.proc_state().is_continue() {
//!             // one cycle of work
//!         }
//!         Ok(())
//!     })?;
//!
//!     worker.set_cycle_wait_period(std::time::Duration::from_millis(10));
//!     worker.run(Blocking::Yes)?;
//!     worker.idle(Blocking::Yes)?;
//!     worker.exit(Blocking::Yes)
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Controlling threads                     │
//! │     request_state / run / idle / exit / pause / apply_to_all│
//! └─────────────────────────────────────────────────────────────┘
//!                              │  state lock + condvars
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ControllerCore                        │
//! │   state, pending request, timestamps, pause, cycle skip     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Managed thread                        │
//! │        loop { proc_state() ... cycle body ... }             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use cthread_core::{
    Blocking,
    CycleWaitMode,
    ErrorKind,
    ProcStateResult,
    ResultExt,
    State,
    StateTransition,
    ThreadError,
    ThreadResult,
    Timeout,
};

// Re-export kprint macros for debug logging
pub use cthread_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace, thread_err};
pub use cthread_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use cthread_core::{env_get, env_get_bool, env_get_micros, env_get_opt};

// Re-export runtime types
pub use cthread_runtime::{
    apply_to_all,
    current,
    is_managed_thread,
    ConfigError,
    ControllerConfig,
    ControllerCore,
    ListenerHandle,
    StateChangeFailure,
    StateChangeListener,
    StateGuard,
    ThreadController,
    ThreadFn,
    ThreadHandle,
    TickHandler,
    TickInfo,
    Ticker,
};
