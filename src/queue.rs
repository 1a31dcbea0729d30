//! An unbounded lock-free MPMC FIFO queue.
//!
//! Michael-Scott linked queue: a singly linked chain from a sentinel head to
//! a null-terminated tail. An appender links its node after the current last
//! node with a CAS on that node's `next`, then swings the tail with a second,
//! best-effort CAS; losing the second CAS to a helper costs nothing but the
//! optimization. Unlinked nodes are retired through an epoch guard so that a
//! node CAS'd out of the chain is never freed while another thread still
//! holds a reference to it mid-traversal.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::{Backoff, CachePadded};

/// Node holds a value.
const LIVE: usize = 0;
/// Value briefly held for observation (peek / iteration / predicate check).
const CLAIMED: usize = 1;
/// Value gone; the node is (or is about to become) a sentinel.
const CONSUMED: usize = 2;

struct Node<T> {
    state: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn live(value: T) -> Owned<Node<T>> {
        Owned::new(Node {
            state: AtomicUsize::new(LIVE),
            value: UnsafeCell::new(MaybeUninit::new(value)),
            next: Atomic::null(),
        })
    }

    fn sentinel() -> Owned<Node<T>> {
        Owned::new(Node {
            state: AtomicUsize::new(CONSUMED),
            value: UnsafeCell::new(MaybeUninit::uninit()),
            next: Atomic::null(),
        })
    }
}

/// An unbounded, lock-free, multi-producer multi-consumer FIFO queue.
///
/// Enqueue order defines dequeue order among completed pushes. No operation
/// ever blocks; `pop` on an empty queue returns `None` immediately. The
/// queue is safe to share between any number of threads without external
/// locking.
///
/// # Examples
///
/// ```
/// use kilit::ConcurrentQueue;
///
/// let q = ConcurrentQueue::new();
/// q.push(1);
/// q.push(2);
/// assert_eq!(q.pop(), Some(1));
/// assert_eq!(q.pop(), Some(2));
/// assert_eq!(q.pop(), None);
/// ```
pub struct ConcurrentQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
}

unsafe impl<T: Send> Send for ConcurrentQueue<T> {}
unsafe impl<T: Send> Sync for ConcurrentQueue<T> {}

impl<T: 'static> ConcurrentQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let sentinel = Node::sentinel();
        // SAFETY: the sentinel is not shared yet.
        let sentinel = sentinel.into_shared(unsafe { epoch::unprotected() });
        Self {
            head: CachePadded::new(Atomic::from(sentinel)),
            tail: CachePadded::new(Atomic::from(sentinel)),
        }
    }

    /// Appends `value` at the tail. Never blocks, never fails.
    pub fn push(&self, value: T) {
        let guard = epoch::pin();
        let node = Node::live(value).into_shared(&guard);
        let backoff = Backoff::new();

        loop {
            let tail = self.tail.load(Ordering::Acquire, &guard);
            // SAFETY: tail is never null and is protected by the guard.
            let t = unsafe { tail.deref() };
            let next = t.next.load(Ordering::Acquire, &guard);

            if !next.is_null() {
                // Tail lags behind the last node; help swing it.
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    &guard,
                );
                continue;
            }

            match t.next.compare_exchange(
                Shared::null(),
                node,
                Ordering::Release,
                Ordering::Relaxed,
                &guard,
            ) {
                Ok(_) => {
                    // Linked. The tail swing is best-effort; a lost CAS means
                    // another thread already advanced it.
                    let _ = self.tail.compare_exchange(
                        tail,
                        node,
                        Ordering::Release,
                        Ordering::Relaxed,
                        &guard,
                    );
                    return;
                }
                Err(_) => backoff.spin(),
            }
        }
    }

    /// Removes and returns the head value, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            // SAFETY: head is never null and is protected by the guard.
            let h = unsafe { head.deref() };
            let next = h.next.load(Ordering::Acquire, &guard);

            if next.is_null() {
                return None;
            }

            let tail = self.tail.load(Ordering::Acquire, &guard);
            if head == tail {
                // Keep the tail ahead of the head before unlinking anything.
                let _ = self.tail.compare_exchange(
                    tail,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    &guard,
                );
            }

            // SAFETY: next is non-null and protected by the guard.
            let n = unsafe { next.deref() };
            match n
                .state
                .compare_exchange(LIVE, CONSUMED, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    // SAFETY: winning the claim makes this the sole owner of
                    // the value.
                    let value = unsafe { (*n.value.get()).assume_init_read() };
                    if self
                        .head
                        .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, &guard)
                        .is_ok()
                    {
                        // SAFETY: the old sentinel is unlinked; traversals
                        // inside their guard keep it alive until the epoch
                        // advances.
                        unsafe { guard.defer_destroy(head) };
                    }
                    return Some(value);
                }
                Err(CLAIMED) => {
                    // An observer holds the value for a moment.
                    backoff.snooze();
                }
                Err(_) => {
                    // Consumed elsewhere; unlink the spent sentinel and move on.
                    if self
                        .head
                        .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, &guard)
                        .is_ok()
                    {
                        // SAFETY: see above.
                        unsafe { guard.defer_destroy(head) };
                    }
                }
            }
        }
    }

    /// Removes the first value for which `pred` returns true.
    ///
    /// Values are tested in FIFO order; returns whether a value was removed.
    pub fn remove_if(&self, mut pred: impl FnMut(&T) -> bool) -> bool {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        let head = self.head.load(Ordering::Acquire, &guard);
        // SAFETY: head is never null and is protected by the guard.
        let mut cur = unsafe { head.deref() }.next.load(Ordering::Acquire, &guard);

        // SAFETY: every node on the chain stays alive while the guard is held.
        while let Some(n) = unsafe { cur.as_ref() } {
            match n
                .state
                .compare_exchange(LIVE, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    // SAFETY: the claim grants exclusive observation of the value.
                    let matched = pred(unsafe { (*n.value.get()).assume_init_ref() });
                    if matched {
                        // SAFETY: still the sole claimant; drop the value in place.
                        unsafe { (*n.value.get()).assume_init_drop() };
                        n.state.store(CONSUMED, Ordering::Release);
                        return true;
                    }
                    n.state.store(LIVE, Ordering::Release);
                    cur = n.next.load(Ordering::Acquire, &guard);
                }
                Err(CLAIMED) => backoff.snooze(),
                Err(_) => cur = n.next.load(Ordering::Acquire, &guard),
            }
        }
        false
    }

    /// Returns a best-effort element count, obtained by traversal (O(n)).
    ///
    /// Concurrent pushes and pops make the result a snapshot of some moment
    /// during the traversal, not an instantaneous size.
    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);
        // SAFETY: see `remove_if`.
        let mut cur = unsafe { head.deref() }.next.load(Ordering::Acquire, &guard);
        let mut count = 0;
        while let Some(n) = unsafe { cur.as_ref() } {
            if n.state.load(Ordering::Acquire) != CONSUMED {
                count += 1;
            }
            cur = n.next.load(Ordering::Acquire, &guard);
        }
        count
    }

    /// Returns whether no value is currently visible in the queue.
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);
        // SAFETY: see `remove_if`.
        let mut cur = unsafe { head.deref() }.next.load(Ordering::Acquire, &guard);
        while let Some(n) = unsafe { cur.as_ref() } {
            if n.state.load(Ordering::Acquire) != CONSUMED {
                return false;
            }
            cur = n.next.load(Ordering::Acquire, &guard);
        }
        true
    }
}

impl<T: Clone + 'static> ConcurrentQueue<T> {
    /// Returns a copy of the head value without removing it, or `None` if
    /// the queue is empty.
    pub fn peek(&self) -> Option<T> {
        let guard = epoch::pin();
        let backoff = Backoff::new();

        let head = self.head.load(Ordering::Acquire, &guard);
        // SAFETY: see `remove_if`.
        let mut cur = unsafe { head.deref() }.next.load(Ordering::Acquire, &guard);

        while let Some(n) = unsafe { cur.as_ref() } {
            match n
                .state
                .compare_exchange(LIVE, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    // SAFETY: the claim grants exclusive observation.
                    let value = unsafe { (*n.value.get()).assume_init_ref() }.clone();
                    n.state.store(LIVE, Ordering::Release);
                    return Some(value);
                }
                Err(CLAIMED) => backoff.snooze(),
                Err(_) => cur = n.next.load(Ordering::Acquire, &guard),
            }
        }
        None
    }

    /// Returns a weakly consistent iterator over copies of the values.
    ///
    /// The iterator tolerates concurrent modification: it may or may not
    /// reflect pushes and pops that happen during the traversal, never
    /// yields an element twice, and never skips an element that stays in
    /// the queue for the iterator's entire lifetime.
    pub fn iter(&self) -> Iter<'_, T> {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);
        // SAFETY: head is protected by `guard`, which the iterator owns.
        let start = unsafe { head.deref() }
            .next
            .load(Ordering::Acquire, &guard)
            .as_raw();
        Iter {
            _queue: self,
            guard,
            cur: start,
        }
    }
}

/// Weakly consistent iterator over a [`ConcurrentQueue`].
///
/// Holds an epoch guard for its whole lifetime, so the traversed chain stays
/// allocated even while concurrent pops unlink nodes.
pub struct Iter<'a, T: 'static> {
    _queue: &'a ConcurrentQueue<T>,
    guard: epoch::Guard,
    cur: *const Node<T>,
}

impl<T: Clone + 'static> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            if self.cur.is_null() {
                return None;
            }
            // SAFETY: cur was read from the chain under self.guard, which is
            // still held; retired nodes outlive it.
            let n = unsafe { &*self.cur };
            match n
                .state
                .compare_exchange(LIVE, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    // SAFETY: the claim grants exclusive observation.
                    let value = unsafe { (*n.value.get()).assume_init_ref() }.clone();
                    n.state.store(LIVE, Ordering::Release);
                    self.cur = n.next.load(Ordering::Acquire, &self.guard).as_raw();
                    return Some(value);
                }
                Err(CLAIMED) => backoff.snooze(),
                Err(_) => {
                    self.cur = n.next.load(Ordering::Acquire, &self.guard).as_raw();
                }
            }
        }
    }
}

impl<T: 'static> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Extend<T> for ConcurrentQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl<T: 'static> FromIterator<T> for ConcurrentQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = Self::new();
        queue.extend(iter);
        queue
    }
}

impl<T: 'static> fmt::Debug for ConcurrentQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentQueue")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> Drop for ConcurrentQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: walk the chain and free everything directly.
        unsafe {
            let guard = epoch::unprotected();
            let mut cur = self.head.load(Ordering::Relaxed, guard);
            while !cur.is_null() {
                let next = cur.deref().next.load(Ordering::Relaxed, guard);
                let node = cur.into_owned();
                if node.state.load(Ordering::Relaxed) == LIVE {
                    (*node.value.get()).assume_init_drop();
                }
                drop(node);
                cur = next;
            }
        }
    }
}
