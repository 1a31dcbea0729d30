//! Stress tests driving the primitives hard under contention.

use kilit::{AsyncTask, AtomicArray, AtomicCell, ConcurrentQueue, CountdownLatch, Exchanger};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
#[cfg_attr(miri, ignore)]
fn test_queue_high_contention() {
    const NUM_THREADS: usize = 8;
    const ITERATIONS: usize = 20_000;

    let queue = Arc::new(ConcurrentQueue::new());
    let mut handles = vec![];

    for tid in 0..NUM_THREADS {
        let queue = Arc::clone(&queue);

        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            let mut pushed = 0usize;
            let mut popped = 0usize;
            for i in 0..ITERATIONS {
                if rng.gen_bool(0.5) {
                    queue.push(tid * ITERATIONS + i);
                    pushed += 1;
                } else if queue.pop().is_some() {
                    popped += 1;
                }
            }
            (pushed, popped)
        }));
    }

    let mut pushed = 0usize;
    let mut popped = 0usize;
    for handle in handles {
        let (p, c) = handle.join().unwrap();
        pushed += p;
        popped += c;
    }

    let mut left = 0usize;
    while queue.pop().is_some() {
        left += 1;
    }
    assert_eq!(queue.len(), 0);
    assert_eq!(popped + left, pushed);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_queue_mixed_remove_and_iterate() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 5_000;

    let queue = Arc::new(ConcurrentQueue::new());
    let mut handles = vec![];

    for p in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                queue.push(p * PER_PRODUCER + i);
            }
        }));
    }

    // Concurrent observers exercise peek, iter and remove_if against the
    // producers.
    let observer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            let mut removed = 0usize;
            for _ in 0..1_000 {
                let _ = queue.peek();
                let _ = queue.iter().take(10).count();
                if queue.remove_if(|&v| v % 97 == 0) {
                    removed += 1;
                }
            }
            removed
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    let removed = observer.join().unwrap();

    let mut seen = HashSet::new();
    while let Some(v) = queue.pop() {
        assert!(seen.insert(v), "duplicate element {v}");
    }
    assert_eq!(seen.len() + removed, PRODUCERS * PER_PRODUCER);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_cells_and_arrays_under_contention() {
    const NUM_THREADS: usize = 8;
    const ITERATIONS: usize = 20_000;
    const SLOTS: usize = 4;

    let total = Arc::new(AtomicCell::new(0u64));
    let array: Arc<AtomicArray<u64>> = Arc::new(AtomicArray::new(SLOTS));
    let mut handles = vec![];

    for _ in 0..NUM_THREADS {
        let total = Arc::clone(&total);
        let array = Arc::clone(&array);
        handles.push(thread::spawn(move || {
            let mut rng = rand::thread_rng();
            for _ in 0..ITERATIONS {
                total.fetch_inc();
                let slot = rng.gen_range(0..SLOTS);
                array.fetch_inc(slot);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = (NUM_THREADS * ITERATIONS) as u64;
    assert_eq!(total.get(), expected);
    assert_eq!(array.iter().sum::<u64>(), expected);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_exchanger_relay_chain() {
    const ROUNDS: u64 = 2_000;

    let xchg = Arc::new(Exchanger::new());
    let other = Arc::clone(&xchg);

    // Each side hands its counter across and verifies the partner's.
    let t = thread::spawn(move || {
        let mut sum = 0u64;
        for i in 0..ROUNDS {
            sum += other.exchange(i);
        }
        sum
    });

    let mut sum = 0u64;
    for i in 0..ROUNDS {
        sum += xchg.exchange(i);
    }

    let their_sum = t.join().unwrap();
    let expected: u64 = (0..ROUNDS).sum();
    assert_eq!(sum, expected);
    assert_eq!(their_sum, expected);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_latch_fan_out_fan_in() {
    const WORKERS: usize = 8;

    for _ in 0..50 {
        let start = Arc::new(CountdownLatch::new(1));
        let done = Arc::new(CountdownLatch::new(WORKERS));
        let hits = Arc::new(AtomicCell::new(0usize));
        let mut handles = vec![];

        for _ in 0..WORKERS {
            let start = Arc::clone(&start);
            let done = Arc::clone(&done);
            let hits = Arc::clone(&hits);
            handles.push(thread::spawn(move || {
                start.wait();
                hits.fetch_inc();
                done.count_down();
            }));
        }

        assert_eq!(hits.get(), 0);
        start.count_down();
        assert!(done.wait_timeout(Duration::from_secs(10)));
        assert_eq!(hits.get(), WORKERS);

        for handle in handles {
            handle.join().unwrap();
        }
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_task_racing_runners_and_cancellers() {
    for _ in 0..200 {
        let task = Arc::new(AsyncTask::new(|_| Ok(1u32)));
        let mut handles = vec![];

        for _ in 0..2 {
            let task = Arc::clone(&task);
            handles.push(thread::spawn(move || task.run()));
        }
        let canceller = {
            let task = Arc::clone(&task);
            thread::spawn(move || task.cancel(true))
        };

        for handle in handles {
            handle.join().unwrap();
        }
        let cancelled = canceller.join().unwrap();

        // Exactly one terminal outcome, consistent with the cancel result.
        match task.get() {
            Ok(v) => {
                assert_eq!(v, 1);
                assert!(!cancelled);
            }
            Err(err) => {
                assert!(cancelled, "uncancelled task failed: {err:?}");
                assert!(task.is_cancelled());
            }
        }
    }
}
