use criterion::Criterion;
use std::hint::black_box;
use mqtt_loop::time::{self, Clock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub fn bench_now(c: &mut Criterion) {
    let mut group = c.benchmark_group("clock");
    group.bench_function("global_now", |b| b.iter(|| black_box(time::now())));
    let clock = Clock::wall_clock();
    group.bench_function("wall_clock_now", |b| b.iter(|| black_box(clock.now())));
    group.finish();
}

pub fn bench_rolling_counter(c: &mut Criterion) {
    let raw = Arc::new(AtomicU32::new(u32::MAX - 1_000_000));
    let source = Arc::clone(&raw);
    let clock = Clock::with_rolling_counter(move || source.fetch_add(1, Ordering::Relaxed));
    c.bench_function("clock/rolling32_now", |b| b.iter(|| black_box(clock.now())));
}
