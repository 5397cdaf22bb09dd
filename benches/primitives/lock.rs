use criterion::Criterion;
use mqtt_loop::platform::Capabilities;
use mqtt_loop::sync::{LockLibrary, MutexHandle};

const LIBRARIES: [(&str, Capabilities); 2] = [
    ("native", Capabilities::NATIVE),
    ("fallback", Capabilities::LEGACY),
];

pub fn bench_exclusive(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_exclusive");
    for (name, caps) in LIBRARIES {
        let library = LockLibrary::with_capabilities(caps);
        let mutex = MutexHandle::with_library(&library).expect("Failed to init lock");
        group.bench_function(name, |b| {
            b.iter(|| {
                let _guard = mutex.lock().expect("Failed to lock");
            })
        });
    }
    group.finish();
}

pub fn bench_shared(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_shared");
    for (name, caps) in LIBRARIES {
        let library = LockLibrary::with_capabilities(caps);
        let mutex = MutexHandle::with_library(&library).expect("Failed to init lock");
        group.bench_function(name, |b| {
            b.iter(|| {
                let _guard = mutex.lock_shared().expect("Failed to lock");
            })
        });
    }
    group.finish();
}
