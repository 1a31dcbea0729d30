//! A two-party rendezvous channel.
//!
//! Two threads meet at an [`Exchanger`] and atomically swap values: each
//! caller receives the other's offer, regardless of arrival order. The first
//! party publishes a wait record in the slot and parks; the second claims
//! the record by CAS'ing the slot back to null, writes its reply, and wakes
//! the waiter. Only two parties ever pair per rendezvous; a third concurrent
//! caller pairs in a later round.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use crossbeam_utils::Backoff;

use crate::error::ExchangeError;
use crate::park::{CancelToken, Parker};

const WAITING: usize = 0;
const FULFILLED: usize = 1;

/// Published wait record of the first-arriving party.
struct Slot<T> {
    state: AtomicUsize,
    offer: UnsafeCell<MaybeUninit<T>>,
    reply: UnsafeCell<MaybeUninit<T>>,
    waiter: crate::park::Unparker,
}

/// A synchronization point at which two threads swap values.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use kilit::Exchanger;
///
/// let xchg = Arc::new(Exchanger::new());
/// let other = Arc::clone(&xchg);
///
/// let t = thread::spawn(move || other.exchange(2));
/// assert_eq!(xchg.exchange(1), 2);
/// assert_eq!(t.join().unwrap(), 1);
/// ```
pub struct Exchanger<T> {
    slot: Atomic<Slot<T>>,
}

unsafe impl<T: Send> Send for Exchanger<T> {}
unsafe impl<T: Send> Sync for Exchanger<T> {}

impl<T: Send + 'static> Exchanger<T> {
    /// Creates an exchanger with an empty slot.
    pub fn new() -> Self {
        Self {
            slot: Atomic::null(),
        }
    }

    /// Blocks until a partner arrives, then swaps values with it.
    ///
    /// With concurrent callers offering `a` and `b`, one call returns `b`
    /// and the other returns `a`. If no partner ever arrives the call
    /// blocks indefinitely; use the timed or cancellable variants to bound
    /// the wait.
    pub fn exchange(&self, value: T) -> T {
        match self.exchange_inner(value, None, None) {
            Ok(reply) => reply,
            Err(_) => unreachable!("exchange without deadline or token cannot fail"),
        }
    }

    /// Like [`exchange`](Self::exchange), but fails with
    /// [`ExchangeError::TimedOut`] (handing the offer back) if no partner
    /// arrives within `timeout`. A partner that fulfils the exchange before
    /// the deadline is observed always wins over the timeout.
    pub fn exchange_timeout(&self, value: T, timeout: Duration) -> Result<T, ExchangeError<T>> {
        self.exchange_inner(value, Instant::now().checked_add(timeout), None)
    }

    /// Like [`exchange`](Self::exchange), but abandons the wait with
    /// [`ExchangeError::Cancelled`] when `token` fires. A retracted offer is
    /// removed from the slot atomically; no later caller can pair with it.
    pub fn exchange_cancellable(
        &self,
        value: T,
        token: &CancelToken,
    ) -> Result<T, ExchangeError<T>> {
        self.exchange_inner(value, None, Some(token))
    }

    fn exchange_inner(
        &self,
        mut value: T,
        deadline: Option<Instant>,
        token: Option<&CancelToken>,
    ) -> Result<T, ExchangeError<T>> {
        if let Some(tok) = token {
            if tok.is_cancelled() {
                return Err(ExchangeError::Cancelled(value));
            }
        }

        let backoff = Backoff::new();

        loop {
            let guard = epoch::pin();
            let cur = self.slot.load(Ordering::Acquire, &guard);

            if cur.is_null() {
                // First to arrive: publish a wait record and park.
                let parker = Parker::new();
                let node = Owned::new(Slot {
                    state: AtomicUsize::new(WAITING),
                    offer: UnsafeCell::new(MaybeUninit::new(value)),
                    reply: UnsafeCell::new(MaybeUninit::uninit()),
                    waiter: parker.unparker(),
                })
                .into_shared(&guard);

                match self.slot.compare_exchange(
                    Shared::null(),
                    node,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                ) {
                    Ok(_) => {
                        // Unpin before blocking: a guard held across a park
                        // would stall reclamation process-wide. The record
                        // stays alive regardless, only this thread retires it.
                        let record = node.as_raw();
                        drop(guard);
                        // SAFETY: see above.
                        return self.await_partner(unsafe { &*record }, parker, deadline, token);
                    }
                    Err(_) => {
                        // Never published; take the offer back and retry.
                        // SAFETY: the node was ours alone.
                        let owned = unsafe { node.into_owned() };
                        value = unsafe { (*owned.offer.get()).assume_init_read() };
                        drop(owned);
                        backoff.spin();
                    }
                }
            } else {
                // Second to arrive: claim the waiter by emptying the slot.
                match self.slot.compare_exchange(
                    cur,
                    Shared::null(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                    &guard,
                ) {
                    Ok(_) => {
                        // SAFETY: winning the claim grants exclusive access
                        // to the record until FULFILLED is published.
                        let record = unsafe { cur.deref() };
                        let their = unsafe { (*record.offer.get()).assume_init_read() };
                        unsafe { (*record.reply.get()).write(value) };
                        // Clone the waker out first: after the FULFILLED
                        // store the waiter may retire the record at any time.
                        let waiter = record.waiter.clone();
                        record.state.store(FULFILLED, Ordering::Release);
                        waiter.unpark();
                        return Ok(their);
                    }
                    Err(_) => backoff.spin(),
                }
            }
        }
    }

    /// Park loop of the published waiter, run unpinned. Exactly one of: the
    /// partner's value, a timeout, or a cancellation.
    fn await_partner(
        &self,
        record: &Slot<T>,
        parker: Parker,
        deadline: Option<Instant>,
        token: Option<&CancelToken>,
    ) -> Result<T, ExchangeError<T>> {
        if let Some(tok) = token {
            tok.attach(parker.unparker());
        }

        loop {
            if record.state.load(Ordering::Acquire) == FULFILLED {
                // SAFETY: the fulfiller wrote the reply before FULFILLED and
                // no longer touches the record.
                let reply = unsafe { (*record.reply.get()).assume_init_read() };
                if let Some(tok) = token {
                    tok.detach(&parker.unparker());
                }
                self.retire(record);
                return Ok(reply);
            }

            let cancelled = token.is_some_and(|t| t.is_cancelled());
            let timed_out = !cancelled && deadline.is_some_and(|d| Instant::now() >= d);
            if cancelled || timed_out {
                // Retract the offer. Losing this CAS means a partner already
                // claimed the record and fulfilment is imminent; the
                // exchange then counts as completed, never as timed out.
                let guard = epoch::pin();
                let retracted = self
                    .slot
                    .compare_exchange(
                        Shared::from(record as *const Slot<T>),
                        Shared::null(),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        &guard,
                    )
                    .is_ok();
                drop(guard);

                if retracted {
                    // SAFETY: retraction makes the record ours again.
                    let offer = unsafe { (*record.offer.get()).assume_init_read() };
                    if let Some(tok) = token {
                        tok.detach(&parker.unparker());
                    }
                    self.retire(record);
                    return Err(if cancelled {
                        ExchangeError::Cancelled(offer)
                    } else {
                        ExchangeError::TimedOut(offer)
                    });
                }
                let backoff = Backoff::new();
                while record.state.load(Ordering::Acquire) != FULFILLED {
                    backoff.snooze();
                }
                continue;
            }

            match deadline {
                Some(d) => {
                    parker.park_deadline(d);
                }
                None => parker.park(),
            }
        }
    }

    /// Hands an unlinked record over to the collector.
    fn retire(&self, record: &Slot<T>) {
        let guard = epoch::pin();
        // SAFETY: the record is off the slot and no new reference to it can
        // form; readers inside their guard keep it alive until the epoch
        // advances.
        unsafe { guard.defer_destroy(Shared::from(record as *const Slot<T>)) };
    }
}

impl<T: Send + 'static> Default for Exchanger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Exchanger<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Exchanger { .. }")
    }
}

impl<T> Drop for Exchanger<T> {
    fn drop(&mut self) {
        // Exclusive access: free a record a waiter left behind.
        unsafe {
            let guard = epoch::unprotected();
            let cur = self.slot.load(Ordering::Relaxed, guard);
            if !cur.is_null() {
                let owned = cur.into_owned();
                if owned.state.load(Ordering::Relaxed) == WAITING {
                    (*owned.offer.get()).assume_init_drop();
                }
                drop(owned);
            }
        }
    }
}
