//! # cthread-runtime
//!
//! Thread lifecycle machinery for cthread.
//!
//! This crate provides:
//! - `ThreadController`: one OS thread run as an Idle/Go/Exit state machine
//! - Cycle pacing (Absolute, Relative, Indefinite) and manual stepping
//! - Pause/unpause at the yield point
//! - Group barrier with a Go rendezvous
//! - Thread-local self handle, OS thread identity and priority
//! - `Ticker`, a fixed-cadence driver built on a controller

pub mod config;
pub mod controller;
pub mod barrier;
pub mod ticker;
pub mod tls;
pub mod platform;

// Re-exports
pub use config::{ConfigError, ControllerConfig};
pub use controller::{
    ControllerCore, ListenerHandle, StateChangeListener, StateGuard, ThreadController, ThreadFn,
    ThreadHandle,
};
pub use barrier::{apply_to_all, StateChangeFailure};
pub use ticker::{TickHandler, TickInfo, Ticker};
pub use tls::{current, is_managed_thread};
