//! Lockstep example
//!
//! Starts several controllers together through the group barrier, pauses
//! and steps one of them, then stops the group.
//!
//! # Usage
//!
//! ```text
//! lockstep [members]
//! ```

use cthread::{
    apply_to_all, kinfo, Blocking, ControllerConfig, ControllerCore, CycleWaitMode, State,
    ThreadController, ThreadResult,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn main() -> ThreadResult<()> {
    println!("=== cthread Lockstep Example ===\n");

    let members: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(4);

    let origin = Instant::now();
    let first_go: Arc<Mutex<Vec<Option<Duration>>>> = Arc::new(Mutex::new(vec![None; members]));

    let config = ControllerConfig::default()
        .cycle_wait_mode(CycleWaitMode::Absolute)
        .cycle_wait_period(Duration::from_millis(5));

    let mut group = Vec::with_capacity(members);
    for i in 0..members {
        let first_go = Arc::clone(&first_go);
        let ctl = ThreadController::with_config(format!("member-{}", i), config.clone(), move |ctl| {
            while ctl.proc_state().is_continue() {
                if ctl.state() == State::Go {
                    let mut slots = first_go.lock().unwrap_or_else(|e| e.into_inner());
                    slots[i].get_or_insert_with(|| origin.elapsed());
                }
            }
            Ok(())
        });
        ctl.start()?;
        group.push(ctl);
    }
    let cores: Vec<&ControllerCore> = group.iter().map(|c| &**c).collect();

    println!("Starting {} members in lockstep...", members);
    let mut failures = Vec::new();
    apply_to_all(&cores, State::Go, Some(&mut failures))?;
    for f in &failures {
        println!("  member {} ({}) failed: {}", f.index, f.name, f.error);
    }

    std::thread::sleep(Duration::from_millis(20));
    let stamps: Vec<Duration> = first_go
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .iter()
        .flatten()
        .copied()
        .collect();
    if let (Some(min), Some(max)) = (stamps.iter().min(), stamps.iter().max()) {
        println!("First Go cycle spread: {:?}", *max - *min);
    }

    let probe = &group[0];
    probe.pause()?;
    let frozen = probe.cycle_count();
    std::thread::sleep(Duration::from_millis(30));
    kinfo!("'{}' paused at cycle {} (now {})", probe.name(), frozen, probe.cycle_count());
    probe.unpause()?;

    apply_to_all(&cores, State::Idle, None)?;
    let before = probe.cycle_count();
    probe.run_n_cycles(3, Blocking::Yes)?;
    println!("Stepped '{}' from cycle {} to {}", probe.name(), before, probe.cycle_count());

    for ctl in &group {
        println!("  {}", **ctl);
    }

    apply_to_all(&cores, State::Exited, None)?;
    println!("\nAll members exited");
    println!("\n=== Example Complete ===");
    Ok(())
}
