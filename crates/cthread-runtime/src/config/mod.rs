//! Controller configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use cthread_runtime::config::ControllerConfig;
//!
//! // Defaults with env overrides
//! let config = ControllerConfig::from_env();
//!
//! // Or customize programmatically
//! let config = ControllerConfig::new()
//!     .cycle_wait_mode(CycleWaitMode::Relative)
//!     .cycle_wait_period(Duration::from_millis(10));
//! ```

pub mod defaults;

use cthread_core::env::{env_get, env_get_bool, env_get_micros, env_get_opt};
use cthread_core::CycleWaitMode;
use std::time::Duration;

/// Per-controller configuration, builder style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// How the yield point sleeps between cycles
    pub cycle_wait_mode: CycleWaitMode,
    /// Sleep period; zero disables sleeping unless the mode is `Indefinite`
    pub cycle_wait_period: Duration,
    /// Stack size of the managed thread, `None` for the platform default
    pub stack_size: Option<usize>,
    /// Log thread start and exit
    pub log_lifecycle: bool,
    /// `start()` waits for the thread to reach Idle
    pub start_blocking: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ControllerConfig {
    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `CTH_CYCLE_WAIT` - absolute, relative or indefinite
    /// - `CTH_CYCLE_PERIOD_US` - cycle wait period in microseconds
    /// - `CTH_STACK_SIZE` - managed thread stack size in bytes
    /// - `CTH_LOG_LIFECYCLE` - log thread start/exit (0/1)
    /// - `CTH_START_BLOCKING` - start() waits for Idle (0/1)
    pub fn from_env() -> Self {
        Self {
            cycle_wait_mode: env_get("CTH_CYCLE_WAIT", defaults::CYCLE_WAIT_MODE),
            cycle_wait_period: env_get_micros(
                "CTH_CYCLE_PERIOD_US",
                Duration::from_micros(defaults::CYCLE_WAIT_PERIOD_US),
            ),
            stack_size: env_get_opt("CTH_STACK_SIZE"),
            log_lifecycle: env_get_bool("CTH_LOG_LIFECYCLE", defaults::LOG_LIFECYCLE),
            start_blocking: env_get_bool("CTH_START_BLOCKING", defaults::START_BLOCKING),
        }
    }

    /// Library defaults only, no environment lookups
    pub fn new() -> Self {
        Self {
            cycle_wait_mode: defaults::CYCLE_WAIT_MODE,
            cycle_wait_period: Duration::from_micros(defaults::CYCLE_WAIT_PERIOD_US),
            stack_size: None,
            log_lifecycle: defaults::LOG_LIFECYCLE,
            start_blocking: defaults::START_BLOCKING,
        }
    }

    // Builder methods

    pub fn cycle_wait_mode(mut self, mode: CycleWaitMode) -> Self {
        self.cycle_wait_mode = mode;
        self
    }

    pub fn cycle_wait_period(mut self, period: Duration) -> Self {
        self.cycle_wait_period = period;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn log_lifecycle(mut self, enable: bool) -> Self {
        self.log_lifecycle = enable;
        self
    }

    pub fn start_blocking(mut self, enable: bool) -> Self {
        self.start_blocking = enable;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(size) = self.stack_size {
            if size < defaults::MIN_STACK_SIZE {
                return Err(ConfigError::InvalidValue("stack_size must be >= 64KB"));
            }
        }
        if self.cycle_wait_period > Duration::from_micros(defaults::MAX_CYCLE_WAIT_PERIOD_US) {
            return Err(ConfigError::InvalidValue("cycle_wait_period must be <= 24h"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("cthread controller configuration:");
        eprintln!("  cycle_wait_mode:    {}", self.cycle_wait_mode);
        eprintln!("  cycle_wait_period:  {:?}", self.cycle_wait_period);
        match self.stack_size {
            Some(size) => eprintln!("  stack_size:         {}", size),
            None => eprintln!("  stack_size:         (platform default)"),
        }
        eprintln!("  log_lifecycle:      {}", self.log_lifecycle);
        eprintln!("  start_blocking:     {}", self.start_blocking);
    }
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::new();
        assert_eq!(config.cycle_wait_mode, CycleWaitMode::Absolute);
        assert_eq!(config.cycle_wait_period, Duration::ZERO);
        assert!(config.start_blocking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ControllerConfig::new()
            .cycle_wait_mode(CycleWaitMode::Relative)
            .cycle_wait_period(Duration::from_millis(10))
            .stack_size(256 * 1024)
            .log_lifecycle(false);

        assert_eq!(config.cycle_wait_mode, CycleWaitMode::Relative);
        assert_eq!(config.cycle_wait_period, Duration::from_millis(10));
        assert_eq!(config.stack_size, Some(256 * 1024));
        assert!(!config.log_lifecycle);
    }

    #[test]
    fn test_validation() {
        let config = ControllerConfig::new().stack_size(4096);
        assert!(config.validate().is_err());

        let config = ControllerConfig::new().cycle_wait_period(Duration::from_secs(2 * 86_400));
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidValue("cycle_wait_period must be <= 24h"))
        );
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("CTH_CYCLE_WAIT", "relative");
        std::env::set_var("CTH_CYCLE_PERIOD_US", "1500");
        let config = ControllerConfig::from_env();
        std::env::remove_var("CTH_CYCLE_WAIT");
        std::env::remove_var("CTH_CYCLE_PERIOD_US");

        assert_eq!(config.cycle_wait_mode, CycleWaitMode::Relative);
        assert_eq!(config.cycle_wait_period, Duration::from_micros(1500));
    }
}
