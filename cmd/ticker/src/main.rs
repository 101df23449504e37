//! Fixed-cadence ticker example
//!
//! Runs a tick handler at a fixed interval for a while, idles it, resumes it
//! and reports how far wall time drifted from tick time.
//!
//! # Usage
//!
//! ```text
//! ticker [interval_ms] [run_ms]
//! ```
//!
//! # Environment Variables
//!
//! - `CTH_LOG_LEVEL=debug` - Show controller transitions
//! - `CTH_FLUSH_EPRINT=1` - Flush log output immediately

use cthread::{kinfo, kwarn, ThreadResult, Ticker};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// CTH_LOG_LEVEL=info cargo run -p cthread-ticker -- 20 500
fn main() -> ThreadResult<()> {
    println!("=== cthread Ticker Example ===\n");

    let mut args = std::env::args().skip(1);
    let interval_ms: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(20);
    let run_ms: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(500);
    let interval = Duration::from_millis(interval_ms);

    // Largest lateness of a tick against its virtual time, in microseconds
    let worst_late = Arc::new(AtomicI64::new(0));
    let late = Arc::clone(&worst_late);

    let mut ticker = Ticker::new("ticker", interval, move |tick| {
        let drift = tick.real_time.as_micros() as i64 - tick.virtual_time.as_micros() as i64;
        late.fetch_max(drift, Ordering::Relaxed);
        if tick.index % 10 == 0 {
            kinfo!(
                "tick {:>4}  virtual {:>8.3}s  real {:>8.3}s",
                tick.index,
                tick.virtual_time.as_secs_f64(),
                tick.real_time.as_secs_f64()
            );
        }
        Ok(())
    });

    ticker.start()?;
    println!("Ticking every {:?} for {} ms...", interval, run_ms);
    ticker.run()?;
    std::thread::sleep(Duration::from_millis(run_ms / 2));

    ticker.idle()?;
    let at_idle = ticker.tick_count();
    println!("Idle after {} ticks", at_idle);
    std::thread::sleep(Duration::from_millis(100));
    if ticker.tick_count() != at_idle {
        kwarn!("ticks advanced while idle");
    }

    ticker.run()?;
    std::thread::sleep(Duration::from_millis(run_ms / 2));
    ticker.stop()?;

    let ticks = ticker.tick_count();
    let expected = run_ms / interval_ms.max(1);
    println!("\nTicks:          {}", ticks);
    println!("Expected about: {}", expected);
    println!("Worst drift:    {} us", worst_late.load(Ordering::Relaxed));

    println!("\n=== Example Complete ===");
    Ok(())
}
