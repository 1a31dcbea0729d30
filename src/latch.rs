//! A one-shot countdown gate.

use std::fmt;
use std::time::{Duration, Instant};

use crate::cell::AtomicCell;
use crate::error::WaitCancelled;
use crate::park::{CancelToken, Parker, Unparker};
use crate::queue::ConcurrentQueue;

/// A gate that opens once its counter has been counted down to zero.
///
/// The count is set at construction and only ever decreases. When it
/// reaches zero, every current waiter is released and every future wait
/// returns immediately; the latch never re-arms. Counting down an exhausted
/// latch is a silent no-op.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use kilit::CountdownLatch;
///
/// let latch = Arc::new(CountdownLatch::new(2));
/// for _ in 0..2 {
///     let latch = Arc::clone(&latch);
///     thread::spawn(move || {
///         latch.count_down();
///     });
/// }
/// latch.wait();
/// assert_eq!(latch.count(), 0);
/// ```
pub struct CountdownLatch {
    count: AtomicCell<usize>,
    waiters: ConcurrentQueue<Unparker>,
}

impl CountdownLatch {
    /// Creates a latch that opens after `count` calls to
    /// [`count_down`](Self::count_down).
    ///
    /// A zero count creates a latch that is already open.
    pub fn new(count: usize) -> Self {
        Self {
            count: AtomicCell::new(count),
            waiters: ConcurrentQueue::new(),
        }
    }

    /// Returns the current count.
    pub fn count(&self) -> usize {
        self.count.get()
    }

    /// Decrements the count by one if it is above zero; a no-op once the
    /// latch is exhausted.
    ///
    /// Returns true for the one call that brings the count to zero and
    /// thereby releases every waiter.
    pub fn count_down(&self) -> bool {
        let mut current = self.count.get();
        loop {
            if current == 0 {
                return false;
            }
            if self.count.compare_and_set_weak(current, current - 1) {
                if current == 1 {
                    while let Some(waiter) = self.waiters.pop() {
                        waiter.unpark();
                    }
                    return true;
                }
                return false;
            }
            current = self.count.get();
        }
    }

    /// Blocks until the count reaches zero. Returns immediately if the
    /// latch is already open.
    pub fn wait(&self) {
        if self.count.get() == 0 {
            return;
        }
        let parker = Parker::new();
        let unparker = parker.unparker();
        loop {
            // Enqueue the handle before re-checking: a count that reaches
            // zero after the check but before the park finds the handle in
            // the queue and leaves a sticky permit.
            self.waiters.push(unparker.clone());
            if self.count.get() == 0 {
                return;
            }
            parker.park();
            if self.count.get() == 0 {
                return;
            }
        }
    }

    /// Blocks until the count reaches zero or `timeout` elapses.
    ///
    /// Returns whether the count reached zero. A count that reached zero
    /// before the deadline is observed is always reported as success, never
    /// as a timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.count.get() == 0 {
            return true;
        }
        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            None => {
                self.wait();
                return true;
            }
        };
        let parker = Parker::new();
        let unparker = parker.unparker();
        loop {
            self.waiters.push(unparker.clone());
            if self.count.get() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                if self.count.get() == 0 {
                    return true;
                }
                self.discard_waiter(&unparker);
                return false;
            }
            parker.park_deadline(deadline);
            if self.count.get() == 0 {
                return true;
            }
        }
    }

    /// Blocks until the count reaches zero or `token` fires.
    pub fn wait_cancellable(&self, token: &CancelToken) -> Result<(), WaitCancelled> {
        if token.is_cancelled() {
            return Err(WaitCancelled);
        }
        if self.count.get() == 0 {
            return Ok(());
        }
        let parker = Parker::new();
        let unparker = parker.unparker();
        token.attach(parker.unparker());
        let result = loop {
            self.waiters.push(unparker.clone());
            if self.count.get() == 0 {
                break Ok(());
            }
            if token.is_cancelled() {
                break Err(WaitCancelled);
            }
            parker.park();
        };
        token.detach(&unparker);
        if result.is_err() {
            self.discard_waiter(&unparker);
        }
        result
    }

    /// Withdraws every queued handle of a waiter that abandoned its wait, so
    /// a latch that never opens does not accumulate stale handles.
    fn discard_waiter(&self, unparker: &Unparker) {
        while self.waiters.remove_if(|w| w.same_parker(unparker)) {}
    }
}

impl fmt::Debug for CountdownLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountdownLatch")
            .field("count", &self.count())
            .finish()
    }
}
