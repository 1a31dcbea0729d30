//! Thread parking and cancellation.
//!
//! [`Parker`]/[`Unparker`] are the suspension substrate every blocking
//! primitive in this crate is built on: a state word plus the owning
//! thread's handle, with a single sticky permit. [`CancelToken`] is the
//! explicit replacement for runtime thread interruption: a one-shot flag
//! with an attached waiter list, checked by the park loops of the blocking
//! primitives.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

const EMPTY: usize = 0;
const PARKED: usize = 1;
const NOTIFIED: usize = 2;

struct Inner {
    state: AtomicUsize,
    thread: Thread,
}

/// Blocks the thread that created it until a matching [`Unparker::unpark`].
///
/// One permit is stored at most: an unpark issued before `park` is honored
/// by the next `park` call, further unparks are coalesced. Spurious wakeups
/// are absorbed internally; `park` only returns once a permit was consumed
/// (or, for the timed variants, the deadline passed).
///
/// A `Parker` is bound to its constructing thread and is not `Send`.
pub struct Parker {
    inner: Arc<Inner>,
    // Bound to the constructing thread.
    _marker: core::marker::PhantomData<*const ()>,
}

impl Parker {
    /// Creates a parker bound to the current thread.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicUsize::new(EMPTY),
                thread: thread::current(),
            }),
            _marker: core::marker::PhantomData,
        }
    }

    /// Returns a handle that can wake this parker from any thread.
    pub fn unparker(&self) -> Unparker {
        Unparker {
            inner: self.inner.clone(),
        }
    }

    /// Blocks until a permit is available, then consumes it.
    pub fn park(&self) {
        if self.try_enter() {
            return;
        }
        loop {
            thread::park();
            if self.try_consume() {
                return;
            }
            // Spurious wakeup, state is still PARKED.
        }
    }

    /// Blocks until a permit is available or `timeout` elapses.
    ///
    /// Returns true if a permit was consumed, false on timeout.
    pub fn park_timeout(&self, timeout: Duration) -> bool {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.park_deadline(deadline),
            None => {
                self.park();
                true
            }
        }
    }

    /// Blocks until a permit is available or `deadline` passes.
    ///
    /// Returns true if a permit was consumed, false on timeout. A permit
    /// delivered before the deadline is observed is always consumed and
    /// reported, never dropped in favor of the timeout.
    pub fn park_deadline(&self, deadline: Instant) -> bool {
        if self.try_enter() {
            return true;
        }
        loop {
            let now = Instant::now();
            if now >= deadline {
                // Withdraw from the parked state; losing this CAS means an
                // unpark arrived first and the permit must be consumed.
                if self
                    .inner
                    .state
                    .compare_exchange(PARKED, EMPTY, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return false;
                }
                return self.try_consume();
            }
            thread::park_timeout(deadline - now);
            if self.try_consume() {
                return true;
            }
        }
    }

    /// Consumes a stored permit or transitions into the PARKED state.
    /// Returns true if a permit was consumed.
    fn try_enter(&self) -> bool {
        loop {
            match self.inner.state.compare_exchange(
                EMPTY,
                PARKED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return false,
                Err(_) => {
                    // NOTIFIED: a sticky permit is waiting.
                    if self.try_consume() {
                        return true;
                    }
                }
            }
        }
    }

    #[inline]
    fn try_consume(&self) -> bool {
        self.inner
            .state
            .compare_exchange(NOTIFIED, EMPTY, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl Default for Parker {
    fn default() -> Self {
        Self::new()
    }
}

/// Wakes the [`Parker`] it was obtained from.
///
/// Cloneable and sendable; all clones refer to the same parker.
pub struct Unparker {
    inner: Arc<Inner>,
}

impl Unparker {
    /// Makes a permit available to the parker, waking it if it is blocked.
    ///
    /// At most one permit is stored; unparking an already-notified parker is
    /// a no-op.
    pub fn unpark(&self) {
        if self.inner.state.swap(NOTIFIED, Ordering::SeqCst) == PARKED {
            self.inner.thread.unpark();
        }
    }

    /// Whether `self` and `other` wake the same parker.
    #[inline]
    pub fn same_parker(&self, other: &Unparker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Clone for Unparker {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct TokenInner {
    cancelled: AtomicBool,
    waiters: Mutex<Vec<Unparker>>,
}

/// A one-shot cancellation flag with an attached set of parked waiters.
///
/// Blocking operations accept a token and abandon their wait promptly once
/// [`cancel`](CancelToken::cancel) is called: the flag flips first, then
/// every attached waiter is unparked. The flag never resets.
///
/// Computations run by [`AsyncTask`](crate::AsyncTask) receive the task's
/// token so that `cancel(true)` can reach into a running computation.
///
/// # Examples
///
/// ```
/// use kilit::CancelToken;
///
/// let token = CancelToken::new();
/// assert!(!token.is_cancelled());
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                waiters: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns whether the token has been cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Cancels the token and wakes every attached waiter. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            let mut waiters = self.inner.waiters.lock().unwrap();
            for waiter in waiters.drain(..) {
                waiter.unpark();
            }
        }
    }

    /// Attaches a waiter to be woken on cancellation.
    ///
    /// If the token is already cancelled the waiter is unparked immediately
    /// instead of being stored.
    pub fn attach(&self, unparker: Unparker) {
        if self.is_cancelled() {
            unparker.unpark();
            return;
        }
        self.inner.waiters.lock().unwrap().push(unparker.clone());
        // The cancel may have drained the list between the check and the
        // push; never leave a waiter sleeping through it.
        if self.is_cancelled() {
            unparker.unpark();
        }
    }

    /// Detaches a previously attached waiter.
    pub fn detach(&self, unparker: &Unparker) {
        self.inner
            .waiters
            .lock()
            .unwrap()
            .retain(|w| !w.same_parker(unparker));
    }
}

impl Clone for CancelToken {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
