use criterion::{criterion_group, criterion_main};

mod primitives;

criterion_group!(
    benches,
    primitives::clock::bench_now,
    primitives::clock::bench_rolling_counter,
    primitives::lock::bench_exclusive,
    primitives::lock::bench_shared,
    primitives::wakeup::bench_signal_and_wait
);
criterion_main!(benches);
