//! # cthread-core
//!
//! Vocabulary shared by the cthread controller crates.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! The controller machinery lives in `cthread-runtime`.
//!
//! ## Modules
//!
//! - `state` - lifecycle state, cycle-wait mode and yield-point result
//! - `timeout` - blocking policy of controller calls
//! - `error` - error kinds and context chains
//! - `kprint` - kernel-style leveled logging macros
//! - `env` - environment variable helpers

pub mod state;
pub mod timeout;
pub mod error;
pub mod kprint;
pub mod env;

pub use state::{CycleWaitMode, ProcStateResult, State, StateTransition};
pub use timeout::{Blocking, Timeout};
pub use error::{ErrorKind, ResultExt, ThreadError, ThreadResult};
pub use kprint::{set_log_level, LogLevel};
pub use env::{env_get, env_get_bool, env_get_micros, env_get_opt};
