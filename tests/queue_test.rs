use kilit::ConcurrentQueue;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

#[test]
fn test_push_pop_fifo() {
    let queue = ConcurrentQueue::new();
    queue.push(1);
    queue.push(2);
    queue.push(3);

    assert_eq!(queue.pop(), Some(1));
    assert_eq!(queue.pop(), Some(2));
    assert_eq!(queue.pop(), Some(3));
    assert_eq!(queue.pop(), None);
}

#[test]
fn test_len_and_is_empty() {
    let queue = ConcurrentQueue::new();
    assert!(queue.is_empty());
    assert_eq!(queue.len(), 0);

    queue.push("a");
    queue.push("b");
    assert!(!queue.is_empty());
    assert_eq!(queue.len(), 2);

    queue.pop();
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_peek_does_not_consume() {
    let queue = ConcurrentQueue::new();
    queue.push(5);
    assert_eq!(queue.peek(), Some(5));
    assert_eq!(queue.peek(), Some(5));
    assert_eq!(queue.pop(), Some(5));
    assert_eq!(queue.peek(), None);
}

#[test]
fn test_iter_in_order() {
    let queue: ConcurrentQueue<i32> = (0..10).collect();
    let seen: Vec<i32> = queue.iter().collect();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
    // Iteration does not consume.
    assert_eq!(queue.len(), 10);
}

#[test]
fn test_remove_if() {
    let queue: ConcurrentQueue<i32> = (0..6).collect();
    assert!(queue.remove_if(|&v| v == 3));
    assert!(!queue.remove_if(|&v| v == 3));

    let rest: Vec<i32> = queue.iter().collect();
    assert_eq!(rest, vec![0, 1, 2, 4, 5]);
}

#[test]
fn test_remove_if_first_match_only() {
    let queue: ConcurrentQueue<i32> = [1, 2, 2, 3].into_iter().collect();
    assert!(queue.remove_if(|&v| v == 2));
    let rest: Vec<i32> = queue.iter().collect();
    assert_eq!(rest, vec![1, 2, 3]);
}

#[test]
fn test_extend() {
    let mut queue = ConcurrentQueue::new();
    queue.extend([1, 2]);
    queue.extend([3]);
    let all: Vec<i32> = queue.iter().collect();
    assert_eq!(all, vec![1, 2, 3]);
}

#[test]
fn test_drop_releases_values() {
    let queue = ConcurrentQueue::new();
    for i in 0..100 {
        queue.push(Arc::new(i));
    }
    let probe = Arc::new(0);
    queue.push(probe.clone());
    drop(queue);
    assert_eq!(Arc::strong_count(&probe), 1);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_per_producer_order_preserved() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 10_000;

    let queue = Arc::new(ConcurrentQueue::new());
    let mut handles = Vec::new();

    for p in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                queue.push(p * PER_PRODUCER + i);
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    // Drain single-threaded; each producer's elements must appear in its
    // own push order.
    let mut last_seen = vec![None::<u64>; PRODUCERS as usize];
    let mut total = 0u64;
    while let Some(v) = queue.pop() {
        let producer = (v / PER_PRODUCER) as usize;
        if let Some(prev) = last_seen[producer] {
            assert!(v > prev);
        }
        last_seen[producer] = Some(v);
        total += 1;
    }
    assert_eq!(total, PRODUCERS * PER_PRODUCER);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_mpmc_no_loss_no_duplication() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 5_000;

    let queue = Arc::new(ConcurrentQueue::new());
    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        producers.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                queue.push(p * PER_PRODUCER + i);
            }
        }));
    }

    let mut consumers = Vec::new();
    for _ in 0..CONSUMERS {
        let queue = Arc::clone(&queue);
        consumers.push(thread::spawn(move || {
            let mut got = Vec::new();
            let target = PRODUCERS * PER_PRODUCER / CONSUMERS;
            while got.len() < target {
                if let Some(v) = queue.pop() {
                    got.push(v);
                }
            }
            got
        }));
    }

    for p in producers {
        p.join().unwrap();
    }
    let mut all = HashSet::new();
    for c in consumers {
        for v in c.join().unwrap() {
            assert!(all.insert(v), "value popped twice: {v}");
        }
    }
    assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
}
