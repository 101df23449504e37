use super::*;
use crate::barrier::GoRendezvous;
use cthread_core::{set_log_level, ErrorKind, LogLevel, ProcStateResult, Timeout};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
use std::thread;

fn quiet() -> ControllerConfig {
    set_log_level(LogLevel::Off);
    ControllerConfig::new().log_lifecycle(false)
}

fn relative(ms: u64) -> ControllerConfig {
    quiet()
        .cycle_wait_mode(CycleWaitMode::Relative)
        .cycle_wait_period(Duration::from_millis(ms))
}

/// Controller whose cycle body only counts
fn counting(name: &str, config: ControllerConfig) -> (ThreadController, Arc<AtomicU64>) {
    let bodies = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&bodies);
    let ctl = ThreadController::with_config(name, config, move |ctl| {
        while ctl.proc_state().is_continue() {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    });
    (ctl, bodies)
}

#[test]
fn test_idle_after_start() {
    let (ctl, bodies) = counting("idle-after-start", relative(1));
    assert_eq!(ctl.state(), State::Invalid);
    assert!(!ctl.is_started());

    ctl.start().unwrap();
    assert_eq!(ctl.state(), State::Idle);
    assert_eq!(ctl.prev_state(), State::Init);
    assert!(ctl.is_started());
    assert!(ctl.is_available());
    assert!(ctl.state_timestamp(State::Idle).is_some());
    assert!(ctl.state_timestamp(State::Go).is_none());
    assert_eq!(ctl.requested_state(), None);
    assert_eq!(bodies.load(Ordering::Relaxed), 0);
    if cfg!(target_os = "linux") {
        assert!(ctl.lwpid() > 0);
    }
}

#[test]
fn test_run_idle_run() {
    let (ctl, bodies) = counting("round-trip", relative(1));
    ctl.start().unwrap();

    ctl.run(Blocking::Yes).unwrap();
    assert_eq!(ctl.state(), State::Go);
    ctl.idle(Blocking::Yes).unwrap();
    assert_eq!(ctl.state(), State::Idle);
    ctl.run(Blocking::Yes).unwrap();
    assert_eq!(ctl.state(), State::Go);

    thread::sleep(Duration::from_millis(10));
    assert!(bodies.load(Ordering::Relaxed) > 0);
}

#[test]
fn test_same_state_request_is_idempotent() {
    let (ctl, _) = counting("idempotent", relative(1));
    let go_entries = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&go_entries);
    ctl.register_state_change_listener(move |_, t| {
        if t.to == State::Go {
            seen.fetch_add(1, Ordering::Relaxed);
        }
    });
    ctl.start().unwrap();

    ctl.run(Blocking::Yes).unwrap();
    ctl.run(Blocking::Yes).unwrap();
    ctl.run(Timeout::NonBlocking).unwrap();
    thread::sleep(Duration::from_millis(5));
    assert_eq!(go_entries.load(Ordering::Relaxed), 1);
    assert_eq!(ctl.requested_state(), None);
}

#[test]
fn test_timeout_leaves_no_waiter() {
    let ctl = ThreadController::with_config("never-yields", quiet(), |ctl| {
        while ctl.requested_state() != Some(State::Exiting) {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    });
    ctl.start_with(Blocking::No).unwrap();

    let err = ctl.request_state(State::Go, Duration::from_millis(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TimedOut);
    assert!(err.is_timed_out());
    assert_eq!(ctl.waiter_count(), 0);
    assert_eq!(ctl.state(), State::Init);
}

#[test]
fn test_absolute_cadence() {
    let config = quiet()
        .cycle_wait_mode(CycleWaitMode::Absolute)
        .cycle_wait_period(Duration::from_millis(10));
    let (ctl, bodies) = counting("cadence", config);
    ctl.start().unwrap();

    ctl.run(Blocking::Yes).unwrap();
    thread::sleep(Duration::from_millis(105));
    ctl.idle(Blocking::Yes).unwrap();

    let n = bodies.load(Ordering::Relaxed);
    assert!((8..=13).contains(&n), "bodies: {}", n);
}

#[test]
fn test_pause_unpause_relative() {
    let starts = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&starts);
    let ctl = ThreadController::with_config("pause", relative(10), move |ctl| {
        while ctl.proc_state().is_continue() {
            log.lock().push(Instant::now());
        }
        Ok(())
    });
    ctl.start().unwrap();
    ctl.run(Blocking::Yes).unwrap();
    thread::sleep(Duration::from_millis(25));

    ctl.pause().unwrap();
    thread::sleep(Duration::from_millis(5));
    assert!(ctl.is_paused());
    assert_eq!(ctl.state(), State::Go);
    let frozen = starts.lock().len();

    thread::sleep(Duration::from_millis(50));
    assert_eq!(starts.lock().len(), frozen);

    let unpaused_at = Instant::now();
    ctl.unpause().unwrap();
    assert!(!ctl.is_paused());
    thread::sleep(Duration::from_millis(30));

    let starts = starts.lock();
    assert!(starts.len() > frozen);
    let next = starts[frozen];
    assert!(next >= unpaused_at + Duration::from_millis(8), "cycle began right after unpause");
    assert!(next < unpaused_at + Duration::from_millis(25));
}

#[test]
fn test_pause_while_idle() {
    let (ctl, _) = counting("pause-idle", relative(1));
    ctl.start().unwrap();

    ctl.pause().unwrap();
    assert!(ctl.is_paused());
    assert_eq!(ctl.pause().unwrap_err().kind(), ErrorKind::StateAlreadyEffective);
    assert_eq!(ctl.state(), State::Idle);

    // A request releases the pause.
    ctl.run(Blocking::Yes).unwrap();
    assert!(!ctl.is_paused());
}

#[test]
fn test_unpause_cancels_pending_pause() {
    let ctl = ThreadController::with_config("pause-pending", quiet(), |ctl| {
        while ctl.proc_state().is_continue() {
            thread::sleep(Duration::from_millis(30));
        }
        Ok(())
    });
    ctl.start().unwrap();
    ctl.run(Blocking::Yes).unwrap();

    ctl.pause().unwrap();
    ctl.unpause().unwrap();
    assert!(!ctl.is_pause_pending());
    assert!(!ctl.is_paused());
    assert_eq!(ctl.unpause().unwrap_err().kind(), ErrorKind::StateAlreadyEffective);
}

#[test]
fn test_drop_while_running() {
    let finished = Arc::new(AtomicBool::new(false));
    let done = Arc::clone(&finished);
    let ctl = ThreadController::with_config("drop-in-go", quiet(), move |ctl| {
        while ctl.proc_state().is_continue() {
            thread::sleep(Duration::from_millis(20));
        }
        done.store(true, Ordering::Release);
        Ok(())
    });
    ctl.start().unwrap();
    ctl.run(Blocking::Yes).unwrap();
    let handle = ctl.handle();

    drop(ctl);
    assert!(finished.load(Ordering::Acquire));
    assert_eq!(handle.state(), State::Exited);
    assert!(handle.is_joined());
}

#[test]
fn test_exit_is_monotonic() {
    let ctl = ThreadController::with_config("monotonic", relative(1), |ctl| {
        while ctl.proc_state().is_continue() {}
        // Linger in Exiting so requests can observe it.
        thread::sleep(Duration::from_millis(50));
        Ok(())
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    ctl.register_state_change_listener(move |_, t| log.lock().push(t));
    ctl.start().unwrap();
    ctl.run(Blocking::Yes).unwrap();

    ctl.exit(Blocking::No).unwrap();
    ctl.state_wait_for(State::Exiting, Duration::from_secs(1)).unwrap();
    assert_eq!(ctl.run(Blocking::No).unwrap_err().kind(), ErrorKind::ShuttingDown);
    assert_eq!(ctl.pause().unwrap_err().kind(), ErrorKind::ResourceUnavailable);
    assert!(!ctl.is_available());

    ctl.exit(Blocking::Yes).unwrap();
    assert_eq!(ctl.state(), State::Exited);
    assert_eq!(ctl.run(Blocking::Yes).unwrap_err().kind(), ErrorKind::ResourceUnavailable);
    assert_eq!(ctl.idle(Blocking::No).unwrap_err().kind(), ErrorKind::ResourceUnavailable);
    ctl.request_state(State::Exiting, Blocking::Yes).unwrap();
    ctl.exit(Blocking::Yes).unwrap();
    assert_eq!(ctl.state(), State::Exited);

    let seen = seen.lock();
    let exiting = seen.iter().position(|t| t.to == State::Exiting).unwrap();
    assert!(seen[exiting..].iter().all(|t| t.to.is_terminating()));
    assert_eq!(
        seen.last().copied(),
        Some(StateTransition { from: State::Exiting, to: State::Exited })
    );
}

#[test]
fn test_listener_sees_every_transition() {
    let (ctl, _) = counting("listener", relative(1));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let handle = ctl.register_state_change_listener(move |core, t| {
        assert_eq!(core.state(), t.to);
        log.lock().push((t.from, t.to));
    });
    ctl.start().unwrap();
    ctl.run(Blocking::Yes).unwrap();
    ctl.exit(Blocking::Yes).unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            (State::Invalid, State::Init),
            (State::Init, State::Idle),
            (State::Idle, State::Go),
            (State::Go, State::Exiting),
            (State::Exiting, State::Exited),
        ]
    );

    ctl.unregister_state_change_listener(handle).unwrap();
    let err = ctl.unregister_state_change_listener(handle).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotRegistered);
}

#[test]
fn test_self_request_deadlock_averted() {
    let outcome = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&outcome);
    let ctl = ThreadController::with_config("self-request", relative(1), move |ctl| {
        while ctl.proc_state().is_continue() {
            if ctl.state() == State::Go && slot.lock().is_none() {
                let blocking = ctl.idle(Blocking::Yes).map_err(|e| e.kind());
                let exit = ctl.exit(Blocking::Yes).map_err(|e| e.kind());
                *slot.lock() = Some((blocking, exit, ctl.requested_state()));
            }
        }
        Ok(())
    });
    ctl.start().unwrap();
    ctl.run(Blocking::Yes).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while outcome.lock().is_none() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    let (blocking, exit, requested) = outcome.lock().clone().unwrap();
    assert_eq!(blocking, Err(ErrorKind::DeadlockAverted));
    assert_eq!(exit, Err(ErrorKind::DeadlockAverted));
    assert_eq!(requested, None);

    // Refused requests leave the thread where it was.
    thread::sleep(Duration::from_millis(20));
    assert_eq!(ctl.state(), State::Go);
    assert_eq!(ctl.requested_state(), None);
    ctl.exit(Blocking::Yes).unwrap();
}

#[test]
fn test_group_go_wins_over_idle_request() {
    let (ctl, _) = counting("group-go-vs-idle", relative(1));
    ctl.start().unwrap();

    let rendezvous = Arc::new(GoRendezvous::new(1));
    ctl.prepare_group_request(Some(&rendezvous)).unwrap();
    {
        let mut g = ctl.lock_state();
        // Group helper first, then a plain idle() on the already idle member.
        ctl.request_state_locked(&mut g, State::Go, Timeout::NonBlocking).unwrap();
        ctl.request_state_locked(&mut g, State::Idle, Timeout::NonBlocking).unwrap();
        assert_eq!(g.requested_state(), Some(State::Go));
    }

    ctl.state_wait_for(State::Go, Duration::from_secs(2)).unwrap();
    rendezvous.wait_all();
    assert_eq!(rendezvous.pending(), 0);
}

#[test]
fn test_listener_reads_lock_free_accessors() {
    let (ctl, _) = counting("listener-accessors", relative(1));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    ctl.register_state_change_listener(move |core, t| {
        log.lock().push((
            core.name().to_string(),
            core.state(),
            core.have_state_lock(),
            core.cycle_count(),
            t.to,
        ));
    });
    ctl.start().unwrap();
    ctl.run(Blocking::Yes).unwrap();
    ctl.exit(Blocking::Yes).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 5);
    for (name, state, locked, _, to) in seen.iter() {
        assert_eq!(name, "listener-accessors");
        assert_eq!(state, to);
        assert!(*locked);
    }
    let cycles: Vec<u64> = seen.iter().map(|entry| entry.3).collect();
    assert!(cycles.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen[0].3, 0);
}

#[test]
fn test_already_started() {
    let (ctl, _) = counting("double-start", relative(1));
    ctl.start().unwrap();
    let err = ctl.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateAlreadyEffective);
    assert_eq!(ctl.state(), State::Idle);
}

#[test]
fn test_not_started() {
    let (ctl, _) = counting("not-started", relative(1));
    let not_init = |r: ThreadResult<()>| r.unwrap_err().kind() == ErrorKind::NotInitialized;

    assert!(not_init(ctl.run(Blocking::No)));
    assert!(not_init(ctl.exit(Blocking::Yes)));
    assert!(not_init(ctl.pause()));
    assert!(not_init(ctl.unpause()));
    assert!(not_init(ctl.state_wait(State::Idle)));
    assert!(not_init(ctl.run_one_cycle(Blocking::No)));
    assert_eq!(
        ctl.set_relative_priority(1).unwrap_err().kind(),
        ErrorKind::NotInitialized
    );
    assert!(ctl.thread_func_result().is_none());
}

#[test]
fn test_invalid_arguments() {
    let (ctl, _) = counting("invalid-args", relative(1));
    ctl.start().unwrap();

    for state in [State::Invalid, State::Init, State::Exited] {
        let err = ctl.request_state(state, Blocking::No).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
    assert_eq!(
        ctl.state_wait(State::Init).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        ctl.run_n_cycles(-1, Blocking::No).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    ctl.run_n_cycles(0, Blocking::Yes).unwrap();
    assert_eq!(ctl.state(), State::Idle);
}

#[test]
fn test_run_n_cycles_from_idle() {
    let (ctl, bodies) = counting("step-idle", quiet());
    ctl.start().unwrap();

    ctl.run_n_cycles(3, Blocking::Yes).unwrap();
    assert_eq!(bodies.load(Ordering::Relaxed), 3);
    ctl.state_wait_for(State::Idle, Duration::from_secs(1)).unwrap();
    thread::sleep(Duration::from_millis(5));
    assert_eq!(ctl.state(), State::Idle);
    assert_eq!(bodies.load(Ordering::Relaxed), 3);
}

#[test]
fn test_run_one_cycle_indefinite() {
    let config = quiet().cycle_wait_mode(CycleWaitMode::Indefinite);
    let (ctl, bodies) = counting("step-indefinite", config);
    ctl.start().unwrap();
    ctl.run(Blocking::Yes).unwrap();

    thread::sleep(Duration::from_millis(10));
    let before = bodies.load(Ordering::Relaxed);
    assert_eq!(before, 1);

    ctl.run_one_cycle(Blocking::Yes).unwrap();
    assert_eq!(bodies.load(Ordering::Relaxed), before + 1);
    assert_eq!(ctl.state(), State::Go);

    ctl.run_n_cycles(2, Blocking::Yes).unwrap();
    assert_eq!(bodies.load(Ordering::Relaxed), before + 3);
}

#[test]
fn test_cycle_wait_change_wakes_sleeper() {
    let config = quiet().cycle_wait_mode(CycleWaitMode::Indefinite);
    let (ctl, bodies) = counting("retune", config);
    ctl.start().unwrap();
    ctl.run(Blocking::Yes).unwrap();
    thread::sleep(Duration::from_millis(10));
    assert_eq!(bodies.load(Ordering::Relaxed), 1);

    ctl.set_cycle_wait(CycleWaitMode::Relative, Duration::from_millis(2));
    assert_eq!(ctl.cycle_wait_mode(), CycleWaitMode::Relative);
    assert_eq!(ctl.cycle_wait_period(), Duration::from_millis(2));
    thread::sleep(Duration::from_millis(40));
    assert!(bodies.load(Ordering::Relaxed) > 3);

    ctl.set_cycle_wait_mode(CycleWaitMode::Indefinite);
    thread::sleep(Duration::from_millis(10));
    let parked = bodies.load(Ordering::Relaxed);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(bodies.load(Ordering::Relaxed), parked);
}

#[test]
fn test_set_self_exiting() {
    let ctl = ThreadController::with_config("self-exit", relative(1), |ctl| {
        while ctl.proc_state().is_continue() {
            if ctl.cycle_count() >= 3 {
                assert_eq!(ctl.set_self_exiting()?, ProcStateResult::Stop);
                break;
            }
        }
        Ok(())
    });
    assert_eq!(
        ctl.set_self_exiting().unwrap_err().kind(),
        ErrorKind::ThreadRestriction
    );
    ctl.start().unwrap();
    ctl.run(Blocking::No).unwrap();
    ctl.state_wait_for(State::Exited, Duration::from_secs(2)).unwrap();
    assert!(matches!(ctl.thread_func_result(), Some(Ok(()))));
}

#[test]
fn test_sleep() {
    let results = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&results);
    let ctl = ThreadController::with_config("sleeper", relative(1), move |ctl| {
        while ctl.proc_state().is_continue() {
            if ctl.state() != State::Go || log.lock().len() >= 2 {
                continue;
            }
            let short = ctl.sleep(Duration::from_millis(2)).map_err(|e| e.kind());
            log.lock().push(short);
            let forever = ctl.sleep(Timeout::Forever).map_err(|e| e.kind());
            log.lock().push(forever);
        }
        Ok(())
    });
    assert_eq!(
        ctl.sleep(Duration::from_millis(1)).unwrap_err().kind(),
        ErrorKind::ThreadRestriction
    );
    ctl.start().unwrap();
    ctl.run(Blocking::Yes).unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while results.lock().is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    thread::sleep(Duration::from_millis(10));
    ctl.idle(Blocking::Yes).unwrap();

    assert_eq!(
        *results.lock(),
        vec![Ok(()), Err(ErrorKind::InterruptedOperation)]
    );
}

#[test]
fn test_panic_is_recorded() {
    let ctl = ThreadController::with_config("panics", quiet(), |_| panic!("boom"));
    ctl.start_with(Blocking::No).unwrap();
    ctl.state_wait_for(State::Exited, Duration::from_secs(2)).unwrap();

    let err = ctl.thread_func_result().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Panicked);
    assert!(err.to_string().contains("boom"));
}

#[test]
fn test_user_error_is_recorded() {
    let ctl = ThreadController::with_config("fails", quiet(), |_| {
        Err(cthread_core::thread_err!(InvalidArgument, "bad input"))
    });
    // The function returns before reaching Idle.
    let err = ctl.start().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceUnavailable);
    ctl.state_wait(State::Exited).unwrap();

    let outcome = ctl.thread_func_result().unwrap().unwrap_err();
    assert_eq!(outcome.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_display() {
    let config = relative(2);
    let (ctl, _) = counting("display", config);
    assert!(ctl.to_string().starts_with("name = display, initialized = no"));

    ctl.start().unwrap();
    let line = ctl.to_string();
    assert!(line.contains("initialized = yes"), "{}", line);
    assert!(line.contains("current state = \"Idle\""), "{}", line);
    assert!(line.contains("pending state = \"(none)\""), "{}", line);
    assert!(line.contains("cycle wait type = \"Relative\""), "{}", line);
    assert!(line.ends_with("cycle wait period = 2000 us"), "{}", line);
}

#[test]
fn test_current_handle() {
    assert!(crate::tls::current().is_none());
    let seen = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&seen);
    let ctl = ThreadController::with_config("self-handle", quiet(), move |ctl| {
        let me = crate::tls::current().map(|h| (h.name().to_string(), h.is_current_thread()));
        *slot.lock() = me;
        while ctl.proc_state().is_continue() {}
        Ok(())
    });
    ctl.start().unwrap();
    assert!(!ctl.is_current_thread());
    assert_eq!(*seen.lock(), Some(("self-handle".to_string(), true)));
}

#[test]
fn test_lock_state_and_cond_waits() {
    let (ctl, _) = counting("cond-waits", relative(1));
    ctl.start().unwrap();

    {
        let mut g = ctl.lock_state();
        assert!(ctl.have_state_lock());
        assert_eq!(g.state(), State::Idle);
        assert!(g.is_available());

        let cv = Condvar::new();
        g.cond_wait_for(&cv, Duration::ZERO).unwrap();
        let err = g
            .cond_wait_until(&cv, Instant::now() + Duration::from_millis(2))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
        assert!(ctl.have_state_lock());
    }
    assert!(!ctl.have_state_lock());

    let cv = Condvar::new();
    let err = ctl.state_cond_wait_for(&cv, Duration::from_millis(2)).unwrap_err();
    assert!(err.is_timed_out());
    assert_eq!(ctl.waiter_count(), 0);
}

#[test]
fn test_state_wait_sees_passed_state() {
    let (ctl, _) = counting("passed-state", relative(1));
    ctl.start().unwrap();
    let handle = ctl.handle();

    let waiter = thread::spawn(move || handle.state_wait_for(State::Go, Duration::from_secs(2)));
    thread::sleep(Duration::from_millis(10));
    ctl.run(Blocking::Yes).unwrap();
    ctl.idle(Blocking::No).unwrap();

    waiter.join().unwrap().unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn test_relative_priority() {
    let (ctl, _) = counting("nice", relative(1));
    ctl.start().unwrap();
    let nice = ctl.set_relative_priority(1).unwrap();
    assert!((-20..=19).contains(&nice));
}
