//! Fixed-cadence tick driver
//!
//! A `Ticker` runs a handler once per interval on its own managed thread,
//! using the Absolute cycle wait so the cadence does not drift with the
//! handler's run time. Ticks are counted across idle periods: `index` and
//! `virtual_time` continue where they stopped.

use crate::config::ControllerConfig;
use crate::controller::ThreadController;
use cthread_core::{thread_err, Blocking, CycleWaitMode, ResultExt, ThreadResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a tick handler is told about the current tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickInfo {
    /// Zero-based tick number
    pub index: u64,
    /// `index * interval`
    pub virtual_time: Duration,
    /// Wall time since the first tick
    pub real_time: Duration,
}

pub type TickHandler = Box<dyn FnMut(TickInfo) -> ThreadResult<()> + Send>;

pub struct Ticker {
    name: String,
    interval: Duration,
    handler: Arc<Mutex<TickHandler>>,
    ticks: Arc<AtomicU64>,
    controller: Option<ThreadController>,
}

impl Ticker {
    pub fn new<F>(name: impl Into<String>, interval: Duration, handler: F) -> Self
    where
        F: FnMut(TickInfo) -> ThreadResult<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            interval,
            handler: Arc::new(Mutex::new(Box::new(handler))),
            ticks: Arc::new(AtomicU64::new(0)),
            controller: None,
        }
    }

    /// Spawn the tick thread; it waits in Idle until [`run`](Self::run)
    pub fn start(&mut self) -> ThreadResult<()> {
        if self.controller.is_some() {
            return Err(thread_err!(
                StateAlreadyEffective,
                "ticker has already been started; call stop() first"
            ))
            .prepend_with(|| format!("ticker '{}'", self.name));
        }

        let config = ControllerConfig::default()
            .cycle_wait_mode(CycleWaitMode::Absolute)
            .cycle_wait_period(self.interval);
        let handler = Arc::clone(&self.handler);
        let ticks = Arc::clone(&self.ticks);
        let interval = self.interval;
        let mut index = self.ticks.load(Ordering::Acquire);

        let controller = ThreadController::with_config(self.name.clone(), config, move |ctl| {
            let mut origin = None;
            while ctl.proc_state().is_continue() {
                let origin = *origin.get_or_insert_with(Instant::now);
                let info = TickInfo {
                    index,
                    virtual_time: virtual_time(interval, index),
                    real_time: origin.elapsed(),
                };
                (&mut *handler.lock())(info).prepend("tick handler failed")?;
                index += 1;
                ticks.store(index, Ordering::Release);
            }
            Ok(())
        });
        controller.start_with(Blocking::Yes)?;
        self.controller = Some(controller);
        Ok(())
    }

    pub fn run(&self) -> ThreadResult<()> {
        self.started()?.run(Blocking::Yes)
    }

    pub fn idle(&self) -> ThreadResult<()> {
        self.started()?.idle(Blocking::Yes)
    }

    /// Stop and join the tick thread; returns the handler's outcome
    ///
    /// Stopping a ticker that was never started is a no-op.
    pub fn stop(&mut self) -> ThreadResult<()> {
        let Some(controller) = self.controller.take() else {
            return Ok(());
        };
        controller.join()?;
        controller.thread_func_result().unwrap_or(Ok(()))
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying controller while started
    pub fn controller(&self) -> Option<&ThreadController> {
        self.controller.as_ref()
    }

    fn started(&self) -> ThreadResult<&ThreadController> {
        self.controller
            .as_ref()
            .ok_or_else(|| thread_err!(NotInitialized, "ticker '{}' has not been started", self.name))
    }
}

fn virtual_time(interval: Duration, index: u64) -> Duration {
    let nanos = interval.as_nanos().saturating_mul(u128::from(index));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
