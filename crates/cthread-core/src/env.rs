//! Environment variable helpers for `CTH_*` overrides
//!
//! # Usage
//!
//! ```ignore
//! use cthread_core::env::{env_get, env_get_bool, env_get_micros};
//!
//! let mode: CycleWaitMode = env_get("CTH_CYCLE_WAIT", CycleWaitMode::Absolute);
//! let period = env_get_micros("CTH_CYCLE_PERIOD_US", Duration::ZERO);
//! let chatty = env_get_bool("CTH_LOG_LIFECYCLE", true);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Variable parsed as `T`, or `default` when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Variable parsed as `T`, `None` when unset or unparsable
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean flag
///
/// "1", "true", "yes", "on" are true; "0", "false", "no", "off" are false
/// (case-insensitive). Anything else, including unset, gives `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Duration given in whole microseconds
#[inline]
pub fn env_get_micros(key: &str, default: Duration) -> Duration {
    env_get_opt::<u64>(key)
        .map(Duration::from_micros)
        .unwrap_or(default)
}
