use kilit::AtomicArray;
use std::sync::Arc;
use std::thread;

#[test]
fn test_new_zeroed() {
    let array: AtomicArray<u32> = AtomicArray::new(4);
    assert_eq!(array.len(), 4);
    for i in 0..4 {
        assert_eq!(array.get(i), 0);
    }
}

#[test]
fn test_from_slice_is_a_copy() {
    let source = [1u64, 2, 3];
    let array = AtomicArray::from_slice(&source);
    array.set(0, 99);
    assert_eq!(source[0], 1);
    assert_eq!(array.get(0), 99);
    assert_eq!(array.get(1), 2);
    assert_eq!(array.get(2), 3);
}

#[test]
fn test_from_iterator() {
    let array: AtomicArray<i32> = (0..5).collect();
    assert_eq!(array.len(), 5);
    assert_eq!(array.get(4), 4);
}

#[test]
fn test_slot_operations() {
    let array: AtomicArray<usize> = AtomicArray::new(2);
    assert!(array.compare_and_set(1, 0, 10));
    assert!(!array.compare_and_set(1, 0, 20));
    assert_eq!(array.get_and_set(1, 30), 10);
    assert_eq!(array.get(0), 0);
    assert_eq!(array.get(1), 30);
}

#[test]
fn test_arithmetic_per_slot() {
    let array: AtomicArray<i64> = AtomicArray::new(2);
    assert_eq!(array.fetch_add(0, 5), 0);
    assert_eq!(array.add_and_get(0, 5), 10);
    assert_eq!(array.sub_and_get(1, 1), -1);
    assert_eq!(array.get(0), 10);
}

#[test]
#[should_panic(expected = "index out of bounds")]
fn test_read_out_of_bounds() {
    let array: AtomicArray<u8> = AtomicArray::new(3);
    array.get(3);
}

#[test]
#[should_panic(expected = "index out of bounds")]
fn test_write_out_of_bounds() {
    let array: AtomicArray<u8> = AtomicArray::new(3);
    array.set(7, 1);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_decrement_race() {
    const SLOTS: usize = 8;
    const PER_SLOT: i64 = 1_000;
    const THREADS: usize = 4;

    let array: Arc<AtomicArray<i64>> = Arc::new(AtomicArray::new(SLOTS));
    let mut handles = Vec::new();

    for _ in 0..THREADS {
        let array = Arc::clone(&array);
        handles.push(thread::spawn(move || {
            for _ in 0..PER_SLOT {
                for slot in 0..SLOTS {
                    array.fetch_dec(slot);
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let total: i64 = array.iter().sum();
    assert_eq!(total, -(SLOTS as i64 * PER_SLOT * THREADS as i64));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_slots_are_independent() {
    let array: Arc<AtomicArray<usize>> = Arc::new(AtomicArray::new(2));

    let writer = {
        let array = Arc::clone(&array);
        thread::spawn(move || {
            for _ in 0..10_000 {
                array.fetch_inc(0);
            }
        })
    };
    for _ in 0..10_000 {
        array.fetch_inc(1);
    }
    writer.join().unwrap();

    assert_eq!(array.get(0), 10_000);
    assert_eq!(array.get(1), 10_000);
}
