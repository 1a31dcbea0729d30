//! A cancellable run-once result cell.
//!
//! An [`AsyncTask`] wraps a computation and a single-assignment result slot.
//! Any thread may run the task, any number of threads may block on the
//! result, and any thread may cancel it. The computation receives the task's
//! [`CancelToken`] so an interrupting cancel can reach into a blocked or
//! polling computation.

use std::any::Any;
use std::cell::UnsafeCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cell::AtomicCell;
use crate::error::{TaskError, TaskFailure};
use crate::park::{CancelToken, Parker, Unparker};
use crate::queue::ConcurrentQueue;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
// Transient window in which the outcome slot is being written.
const COMPLETING: u8 = 2;
const DONE: u8 = 3;
const FAILED: u8 = 4;
const CANCELLED: u8 = 5;

type Computation<T> = Box<dyn FnMut(&CancelToken) -> Result<T, TaskFailure> + Send>;

/// A one-shot task: run it once, read its result from any thread.
///
/// States move `Pending -> Running -> Done`/`Failed`, or to `Cancelled` from
/// either of the first two. Terminal states are final; once a result or a
/// cancellation is published it never changes.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use kilit::AsyncTask;
///
/// let task = Arc::new(AsyncTask::new(|_token| Ok(6 * 7)));
/// let runner = Arc::clone(&task);
/// thread::spawn(move || runner.run());
/// assert_eq!(task.get().unwrap(), 42);
/// ```
pub struct AsyncTask<T> {
    state: AtomicCell<u8>,
    computation: UnsafeCell<Computation<T>>,
    outcome: UnsafeCell<Option<Result<T, Arc<TaskFailure>>>>,
    waiters: ConcurrentQueue<Unparker>,
    token: CancelToken,
}

// The computation is only entered by the thread that won the Pending->Running
// CAS, and the outcome slot is only written inside the COMPLETING window.
unsafe impl<T: Send> Send for AsyncTask<T> {}
unsafe impl<T: Send> Sync for AsyncTask<T> {}

impl<T: Clone + Send + 'static> AsyncTask<T> {
    /// Creates a task around `computation`.
    ///
    /// The closure receives the task's own [`CancelToken`]; a computation
    /// that blocks on this crate's primitives or polls the token unblocks
    /// promptly when the task is cancelled with interruption.
    pub fn new<F>(computation: F) -> Self
    where
        F: FnMut(&CancelToken) -> Result<T, TaskFailure> + Send + 'static,
    {
        Self {
            state: AtomicCell::new(PENDING),
            computation: UnsafeCell::new(Box::new(computation)),
            outcome: UnsafeCell::new(None),
            waiters: ConcurrentQueue::new(),
            token: CancelToken::new(),
        }
    }

    /// Runs the computation if the task is still pending; a no-op otherwise.
    ///
    /// The winning caller executes the computation on its own thread and
    /// publishes the outcome. A cancellation observed while the computation
    /// runs wins over the outcome: the task ends `Cancelled` and the result
    /// is discarded. A computation that panics completes the task as failed,
    /// with the panic message as the cause; the panic does not propagate.
    pub fn run(&self) {
        if !self.state.compare_and_set(PENDING, RUNNING) {
            return;
        }
        match self.call_computation() {
            Ok(value) => self.publish(Ok(value), DONE),
            Err(cause) => self.publish(Err(cause), FAILED),
        }
    }

    /// Runs the computation and, on success, returns the task to pending
    /// without storing a result, so it can run again.
    ///
    /// Returns true iff the computation succeeded and the reset was applied.
    /// Returns false if the task was already started, completed or
    /// cancelled, if the computation failed (the failure is published), or
    /// if a cancellation arrived mid-run (the cancellation sticks).
    pub fn run_and_reset(&self) -> bool {
        if !self.state.compare_and_set(PENDING, RUNNING) {
            return false;
        }
        match self.call_computation() {
            Ok(_) => self.state.compare_and_set(RUNNING, PENDING),
            Err(cause) => {
                self.publish(Err(cause), FAILED);
                false
            }
        }
    }

    /// Invokes the computation, converting a panic into a failure cause so
    /// the task always turns terminal and getters never block forever.
    fn call_computation(&self) -> Result<T, Arc<TaskFailure>> {
        // SAFETY: winning the entry CAS grants exclusive access to the
        // computation until a terminal state is published.
        let call = AssertUnwindSafe(|| unsafe { (*self.computation.get())(&self.token) });
        match panic::catch_unwind(call) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(cause)) => Err(Arc::new(cause)),
            Err(payload) => Err(Arc::new(panic_failure(payload))),
        }
    }

    /// Cancels the task.
    ///
    /// Returns true iff cancellation was newly applied, which is only
    /// possible from the pending or running state. With `may_interrupt`, the
    /// task's [`CancelToken`] fires as well, reaching a computation that is
    /// blocked or polling. False once the task is terminal.
    pub fn cancel(&self, may_interrupt: bool) -> bool {
        let mut current = self.state.get();
        loop {
            if current != PENDING && current != RUNNING {
                return false;
            }
            if self.state.compare_and_set_weak(current, CANCELLED) {
                if may_interrupt {
                    self.token.cancel();
                }
                self.wake_waiters();
                return true;
            }
            current = self.state.get();
        }
    }

    /// Completes the task directly with `value`, bypassing the computation.
    ///
    /// Returns true iff the result was installed; false once any outcome or
    /// cancellation exists.
    pub fn set(&self, value: T) -> bool {
        self.try_complete(Ok(value), DONE)
    }

    /// Completes the task directly with a failure cause.
    ///
    /// Returns true iff the failure was installed; false once any outcome or
    /// cancellation exists.
    pub fn set_failure(&self, cause: TaskFailure) -> bool {
        self.try_complete(Err(Arc::new(cause)), FAILED)
    }

    /// Blocks until the task is terminal and returns its outcome.
    ///
    /// A completed task yields a clone of the value; every getter observes
    /// the same result.
    pub fn get(&self) -> Result<T, TaskError> {
        match self.get_inner(None, None) {
            Ok(outcome) => outcome,
            Err(_) => unreachable!("untimed wait cannot expire"),
        }
    }

    /// Like [`get`](Self::get), but gives up with [`TaskError::TimedOut`] if
    /// the task is still not terminal when `timeout` elapses. A task that
    /// turned terminal before the deadline is always reported, never timed
    /// out.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, TaskError> {
        let deadline = Instant::now().checked_add(timeout);
        match self.get_inner(deadline, None) {
            Ok(outcome) => outcome,
            Err(err) => Err(err),
        }
    }

    /// Like [`get`](Self::get), but abandons the wait with
    /// [`TaskError::WaitCancelled`] when `token` fires. This cancels the
    /// caller's wait only; the task itself keeps running.
    pub fn get_cancellable(&self, token: &CancelToken) -> Result<T, TaskError> {
        match self.get_inner(None, Some(token)) {
            Ok(outcome) => outcome,
            Err(err) => Err(err),
        }
    }

    /// Whether the task has reached any terminal state, including
    /// cancellation and failure.
    pub fn is_done(&self) -> bool {
        matches!(self.state.get(), DONE | FAILED | CANCELLED)
    }

    /// Whether the task ended cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.state.get() == CANCELLED
    }

    /// Publishes an outcome out of the running state. Loses silently to a
    /// concurrent cancellation.
    fn publish(&self, outcome: Result<T, Arc<TaskFailure>>, terminal: u8) {
        if self.state.compare_and_set(RUNNING, COMPLETING) {
            // SAFETY: only the COMPLETING owner touches the slot; readers
            // wait for the terminal state.
            unsafe { *self.outcome.get() = Some(outcome) };
            self.state.set(terminal);
        }
        self.wake_waiters();
    }

    fn try_complete(&self, outcome: Result<T, Arc<TaskFailure>>, terminal: u8) -> bool {
        let mut current = self.state.get();
        loop {
            if current != PENDING && current != RUNNING {
                return false;
            }
            if self.state.compare_and_set_weak(current, COMPLETING) {
                // SAFETY: see `publish`.
                unsafe { *self.outcome.get() = Some(outcome) };
                self.state.set(terminal);
                self.wake_waiters();
                return true;
            }
            current = self.state.get();
        }
    }

    fn wake_waiters(&self) {
        while let Some(waiter) = self.waiters.pop() {
            waiter.unpark();
        }
    }

    /// Reads the published outcome; only valid in a terminal state.
    fn read_terminal(&self, state: u8) -> Result<T, TaskError> {
        match state {
            CANCELLED => Err(TaskError::Cancelled),
            // SAFETY: the outcome was written before the terminal state
            // became visible and is immutable from then on.
            DONE | FAILED => match unsafe { &*self.outcome.get() } {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(cause)) => Err(TaskError::Failed(cause.clone())),
                None => unreachable!("terminal task without outcome"),
            },
            _ => unreachable!("read_terminal on live state"),
        }
    }

    fn get_inner(
        &self,
        deadline: Option<Instant>,
        token: Option<&CancelToken>,
    ) -> Result<Result<T, TaskError>, TaskError> {
        let state = self.state.get();
        if state >= DONE {
            return Ok(self.read_terminal(state));
        }
        if let Some(tok) = token {
            if tok.is_cancelled() {
                return Err(TaskError::WaitCancelled);
            }
        }
        let parker = Parker::new();
        let unparker = parker.unparker();
        if let Some(tok) = token {
            tok.attach(parker.unparker());
        }
        let result = loop {
            self.waiters.push(unparker.clone());
            let state = self.state.get();
            if state >= DONE {
                break Ok(self.read_terminal(state));
            }
            if token.is_some_and(|t| t.is_cancelled()) {
                break Err(TaskError::WaitCancelled);
            }
            match deadline {
                Some(d) => {
                    if Instant::now() >= d {
                        let state = self.state.get();
                        if state >= DONE {
                            break Ok(self.read_terminal(state));
                        }
                        break Err(TaskError::TimedOut);
                    }
                    parker.park_deadline(d);
                }
                None => parker.park(),
            }
        };
        if let Some(tok) = token {
            tok.detach(&unparker);
        }
        if result.is_err() {
            // Withdraw the queued handles of an abandoned wait.
            while self.waiters.remove_if(|w| w.same_parker(&unparker)) {}
        }
        result
    }
}

fn panic_failure(payload: Box<dyn Any + Send>) -> TaskFailure {
    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown cause")
    };
    format!("computation panicked: {message}").into()
}

impl<T> fmt::Debug for AsyncTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state.get() {
            PENDING => "Pending",
            RUNNING => "Running",
            COMPLETING => "Completing",
            DONE => "Done",
            FAILED => "Failed",
            _ => "Cancelled",
        };
        f.debug_struct("AsyncTask").field("state", &state).finish()
    }
}
