use std::hint::black_box;
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use binalloc::perlude::{MmapBackend, SpinArena};
use bytesize::ByteSize;
use criterion::{Criterion, criterion_group, criterion_main};

type BenchArena = SpinArena<MmapBackend>;

const REQSIZES: &[usize] = &[4, 16, 32, 64, 128, 256, 512, 1024];
const THREADS: &[usize] = &[1, 2, 4, 8];

const ARENA_SIZE: usize = 4 << 20;
const BATCH: usize = 64;

fn arena() -> BenchArena {
    BenchArena::new(ARENA_SIZE).unwrap()
}

/// Allocates then frees one block of `size` per iteration.
fn single(arena: &BenchArena, iters: usize, size: usize) -> Duration {
    let start = Instant::now();
    for _ in 0..iters {
        let p = arena.allocate(black_box(size)).unwrap();
        arena.free(black_box(p.as_ptr())).unwrap();
    }
    start.elapsed()
}

/// Keeps `BATCH` blocks of random size live, so frees coalesce in
/// arbitrary order.
fn batched(arena: &BenchArena, iters: usize) -> Duration {
    let sizes: Vec<usize> = std::iter::repeat_with(|| fastrand::usize(0..=1024))
        .take(BATCH)
        .collect();
    let mut live = Vec::with_capacity(BATCH);

    let start = Instant::now();
    for _ in 0..iters {
        for &size in &sizes {
            live.push(arena.allocate(size).unwrap());
        }
        fastrand::shuffle(&mut live);
        for p in live.drain(..) {
            arena.free(p.as_ptr()).unwrap();
        }
    }
    start.elapsed()
}

/// Runs [`single`] on `nthreads` threads sharing one arena, returning the
/// slowest thread's time.
fn contended(arena: &BenchArena, iters: usize, nthreads: usize, size: usize) -> Duration {
    let bar = Barrier::new(nthreads);
    thread::scope(|s| {
        let handles: Vec<_> = (0..nthreads)
            .map(|_| {
                let bar = &bar;
                s.spawn(move || {
                    bar.wait();
                    single(arena, iters, size)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .max()
            .unwrap_or_default()
    })
}

fn groups(c: &mut Criterion) {
    let a = arena();

    let mut g = c.benchmark_group("alloc_free");
    for (i, size) in REQSIZES.iter().copied().enumerate() {
        let bsize = ByteSize::b(size as u64).display().iec_short();
        let id = format!("alloc_free_{i:02}_{bsize:.0}");
        g.bench_function(&id, |b| b.iter_custom(|iters| single(&a, iters as usize, size)));
    }
    g.bench_function("alloc_free_batched", |b| {
        b.iter_custom(|iters| batched(&a, iters as usize))
    });
    g.finish();

    let mut g = c.benchmark_group("alloc_free_contended");
    for nthreads in THREADS.iter().copied() {
        let id = format!("alloc_free_contended_{nthreads:02}t");
        g.bench_function(&id, |b| {
            b.iter_custom(|iters| contended(&a, iters as usize, nthreads, 64))
        });
    }
    g.finish();

    assert!(a.stats().is_pristine());
}

criterion_group!(
    name = alloc_benchmark;
    config = Criterion::default().sample_size(50).measurement_time(Duration::from_secs(10));
    targets = groups
);

criterion_main!(alloc_benchmark);
