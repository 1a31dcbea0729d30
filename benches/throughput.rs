//! Throughput benchmarks for the lock-free primitives

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kilit::{AtomicCell, ConcurrentQueue};
use std::sync::Arc;
use std::thread;

fn bench_cell_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell_ops");

    group.bench_function("get", |b| {
        let cell = AtomicCell::new(0u64);
        b.iter(|| black_box(cell.get()));
    });

    group.bench_function("fetch_inc", |b| {
        let cell = AtomicCell::new(0u64);
        b.iter(|| black_box(cell.fetch_inc()));
    });

    group.bench_function("cas_success", |b| {
        let cell = AtomicCell::new(0u64);
        b.iter(|| {
            let cur = cell.get();
            black_box(cell.compare_and_set(cur, cur.wrapping_add(1)));
        });
    });

    group.finish();
}

fn bench_cell_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("cell_contended");
    group.sample_size(10);

    for threads in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements(*threads as u64 * 10_000));
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            threads,
            |b, &threads| {
                b.iter(|| {
                    let cell = Arc::new(AtomicCell::new(0u64));
                    let handles: Vec<_> = (0..threads)
                        .map(|_| {
                            let cell = Arc::clone(&cell);
                            thread::spawn(move || {
                                for _ in 0..10_000 {
                                    cell.fetch_inc();
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                    black_box(cell.get())
                });
            },
        );
    }

    group.finish();
}

fn bench_queue_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_single_thread");

    for batch in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &batch| {
            b.iter(|| {
                let queue = ConcurrentQueue::new();
                for i in 0..batch {
                    queue.push(i);
                }
                while let Some(v) = queue.pop() {
                    black_box(v);
                }
            });
        });
    }

    group.finish();
}

fn bench_queue_mpmc(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_mpmc");
    group.sample_size(10);

    for threads in [2, 4].iter() {
        let per_thread = 10_000usize;
        group.throughput(Throughput::Elements((*threads * per_thread) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            threads,
            |b, &threads| {
                b.iter(|| {
                    let queue = Arc::new(ConcurrentQueue::new());
                    let producers: Vec<_> = (0..threads)
                        .map(|tid| {
                            let queue = Arc::clone(&queue);
                            thread::spawn(move || {
                                for i in 0..per_thread {
                                    queue.push(tid * per_thread + i);
                                }
                            })
                        })
                        .collect();
                    let consumers: Vec<_> = (0..threads)
                        .map(|_| {
                            let queue = Arc::clone(&queue);
                            thread::spawn(move || {
                                let mut got = 0usize;
                                while got < per_thread {
                                    if queue.pop().is_some() {
                                        got += 1;
                                    }
                                }
                            })
                        })
                        .collect();
                    for h in producers {
                        h.join().unwrap();
                    }
                    for h in consumers {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cell_ops,
    bench_cell_contended,
    bench_queue_single_thread,
    bench_queue_mpmc
);
criterion_main!(benches);
