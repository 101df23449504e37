//! Benchmarks for controller transitions and the yield point.
//!
//! - Blocking Go/Idle round trip between two threads
//! - One manually stepped cycle (wake, body, report back)
//! - Back-to-back stepped cycles, i.e. the yield-point fast path

use criterion::{criterion_group, criterion_main, Criterion};
use cthread_core::{set_log_level, Blocking, CycleWaitMode, LogLevel};
use cthread_runtime::{ControllerConfig, ThreadController};
use std::hint::black_box;
use std::time::Instant;

fn controller(name: &str, mode: CycleWaitMode) -> ThreadController {
    set_log_level(LogLevel::Off);
    let config = ControllerConfig::new()
        .log_lifecycle(false)
        .cycle_wait_mode(mode);
    let ctl = ThreadController::with_config(name, config, |ctl| {
        while ctl.proc_state().is_continue() {
            black_box(ctl.cycle_count());
        }
        Ok(())
    });
    ctl.start().unwrap();
    ctl
}

fn bench_round_trip(c: &mut Criterion) {
    let ctl = controller("bench-round-trip", CycleWaitMode::Indefinite);

    c.bench_function("go_idle_round_trip", |b| {
        b.iter(|| {
            ctl.run(Blocking::Yes).unwrap();
            ctl.idle(Blocking::Yes).unwrap();
        });
    });
}

fn bench_stepping(c: &mut Criterion) {
    let ctl = controller("bench-stepping", CycleWaitMode::Indefinite);
    ctl.run(Blocking::Yes).unwrap();

    let mut group = c.benchmark_group("stepping");
    group.bench_function("run_one_cycle", |b| {
        b.iter(|| ctl.run_one_cycle(Blocking::Yes).unwrap());
    });
    group.bench_function("proc_state_fast_path", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            ctl.run_n_cycles(iters as i64, Blocking::Yes).unwrap();
            start.elapsed()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_round_trip, bench_stepping);
criterion_main!(benches);
