use corral_pool::Pool;
use criterion::{criterion_group, Criterion};
use prometheus_client::registry::Registry;
use std::{
    hint::black_box,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

/// Number of background threads churning the pool in the contended benchmark.
const CHURNERS: usize = 4;

#[derive(Default)]
struct Tick {
    sequence: u64,
    price: f64,
    size: f64,
}

fn bench_acquire_release(c: &mut Criterion) {
    let mut registry = Registry::default();
    let pool = Pool::<Tick>::new(1024, &mut registry);

    c.bench_function("acquire_release", |b| {
        b.iter(|| {
            let mut ptr = pool.acquire();
            // SAFETY: freshly acquired, not aliased.
            unsafe {
                let tick = ptr.as_mut();
                tick.sequence = 1;
                tick.price = 100.25;
                tick.size = 10.0;
                black_box((tick.sequence, tick.price, tick.size));
            }
            // SAFETY: acquired above, released once.
            unsafe { pool.release(black_box(ptr)) };
        })
    });
}

fn bench_acquire_release_contended(c: &mut Criterion) {
    let mut registry = Registry::default();
    let pool = Arc::new(Pool::<Tick>::new(1024, &mut registry));
    let stop = Arc::new(AtomicBool::new(false));

    let mut churners = Vec::new();
    for _ in 0..CHURNERS {
        let pool = pool.clone();
        let stop = stop.clone();
        churners.push(thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let ptr = pool.acquire();
                // SAFETY: acquired above, released once.
                unsafe { pool.release(black_box(ptr)) };
            }
        }));
    }

    c.bench_function("acquire_release_contended", |b| {
        b.iter(|| {
            let ptr = pool.acquire();
            // SAFETY: acquired above, released once.
            unsafe { pool.release(black_box(ptr)) };
        })
    });

    stop.store(true, Ordering::Relaxed);
    for churner in churners {
        churner.join().unwrap();
    }
}

fn bench_overflow(c: &mut Criterion) {
    let mut registry = Registry::default();
    let pool = Pool::<Tick>::new(1, &mut registry);

    // Hold the only pooled element so every benchmarked acquisition takes
    // the heap fallback.
    let held = pool.acquire();

    c.bench_function("acquire_release_overflow", |b| {
        b.iter(|| {
            let ptr = pool.acquire();
            // SAFETY: acquired above, released once.
            unsafe { pool.release(black_box(ptr)) };
        })
    });

    // SAFETY: acquired above, released once.
    unsafe { pool.release(held) };
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_acquire_release_contended,
    bench_overflow
);
