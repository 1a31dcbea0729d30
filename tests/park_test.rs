use kilit::{CancelToken, Parker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_permit_before_park() {
    let parker = Parker::new();
    parker.unparker().unpark();
    // The sticky permit makes this return immediately.
    parker.park();
}

#[test]
fn test_permit_does_not_accumulate() {
    let parker = Parker::new();
    let unparker = parker.unparker();
    unparker.unpark();
    unparker.unpark();
    unparker.unpark();
    parker.park();
    // A second park would block: the permit was consumed, not counted.
    assert!(!parker.park_timeout(Duration::from_millis(20)));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_unpark_wakes_parked_thread() {
    // The parker is bound to its constructing thread; only the unparker
    // crosses threads.
    let (tx, rx) = mpsc::channel();
    let woke = Arc::new(AtomicBool::new(false));
    let woke_flag = Arc::clone(&woke);

    let t = thread::spawn(move || {
        let parker = Parker::new();
        tx.send(parker.unparker()).unwrap();
        parker.park();
        woke_flag.store(true, Ordering::SeqCst);
    });

    let unparker = rx.recv().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(!woke.load(Ordering::SeqCst));
    unparker.unpark();
    t.join().unwrap();
    assert!(woke.load(Ordering::SeqCst));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_park_timeout_expires() {
    let parker = Parker::new();
    let start = Instant::now();
    assert!(!parker.park_timeout(Duration::from_millis(50)));
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_park_timeout_woken() {
    let parker = Parker::new();
    let unparker = parker.unparker();

    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        unparker.unpark();
    });
    assert!(parker.park_timeout(Duration::from_secs(10)));
    t.join().unwrap();
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_park_deadline_in_the_past() {
    let parker = Parker::new();
    assert!(!parker.park_deadline(Instant::now()));
}

#[test]
fn test_same_parker() {
    let parker = Parker::new();
    let a = parker.unparker();
    let b = parker.unparker();
    let other = Parker::new();

    assert!(a.same_parker(&b));
    assert!(!a.same_parker(&other.unparker()));
}

#[test]
fn test_token_starts_clear() {
    let token = CancelToken::new();
    assert!(!token.is_cancelled());
    token.cancel();
    assert!(token.is_cancelled());
    // Latched: cancelling again changes nothing.
    token.cancel();
    assert!(token.is_cancelled());
}

#[test]
fn test_token_clones_share_state() {
    let token = CancelToken::new();
    let other = token.clone();
    other.cancel();
    assert!(token.is_cancelled());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_cancel_wakes_attached_parker() {
    let parker = Parker::new();
    let token = CancelToken::new();
    token.attach(parker.unparker());

    let cancel_side = token.clone();
    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        cancel_side.cancel();
    });

    // Woken by the cancellation, not the timeout.
    assert!(parker.park_timeout(Duration::from_secs(10)));
    assert!(token.is_cancelled());
    t.join().unwrap();
}

#[test]
fn test_attach_after_cancel_leaves_permit() {
    let token = CancelToken::new();
    token.cancel();

    let parker = Parker::new();
    token.attach(parker.unparker());
    // The attach itself must have left a permit.
    parker.park();
}

#[test]
fn test_detach_stops_wakeups() {
    let token = CancelToken::new();
    let parker = Parker::new();
    let unparker = parker.unparker();
    token.attach(parker.unparker());
    token.detach(&unparker);

    token.cancel();
    assert!(!parker.park_timeout(Duration::from_millis(20)));
}
