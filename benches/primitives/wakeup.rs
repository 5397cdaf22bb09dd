use criterion::{BatchSize, Criterion};
use mqtt_loop::network::{Wake, WakeupChannel};
use std::time::Duration;

pub fn bench_signal_and_wait(c: &mut Criterion) {
    let mut group = c.benchmark_group("wakeup");
    let channel = WakeupChannel::new().expect("Failed to create wakeup channel");

    group.bench_function("signal_pending", |b| {
        channel.signal();
        b.iter(|| channel.signal());
        channel.drain();
    });

    group.bench_function("signal_then_wait", |b| {
        b.iter(|| {
            channel.signal();
            let wake = channel.wait(Duration::from_secs(1)).expect("Failed to wait");
            assert_eq!(wake, Wake::Signalled);
        })
    });

    group.bench_function("create", |b| {
        b.iter_batched(
            || (),
            |_| WakeupChannel::new().expect("Failed to create wakeup channel"),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}
