//! Typed errors for the blocking primitives.
//!
//! Every blocking call in this crate resolves into exactly one of: a value,
//! a timeout, a cancellation, or a wrapped computation failure. The enums
//! here carry those outcomes; errors are always raised synchronously on the
//! calling thread.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// A failure cause captured from a task computation.
pub type TaskFailure = Box<dyn Error + Send + Sync>;

/// A failed [`Exchanger`](crate::Exchanger) attempt, handing the offered
/// value back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError<T> {
    /// No partner arrived before the deadline.
    TimedOut(T),
    /// The wait was abandoned through a [`CancelToken`](crate::CancelToken).
    Cancelled(T),
}

impl<T> ExchangeError<T> {
    /// Recovers the value that was offered for exchange.
    pub fn into_inner(self) -> T {
        match self {
            ExchangeError::TimedOut(v) | ExchangeError::Cancelled(v) => v,
        }
    }
}

impl<T> fmt::Display for ExchangeError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::TimedOut(_) => write!(f, "no exchange partner arrived in time"),
            ExchangeError::Cancelled(_) => write!(f, "exchange abandoned by cancellation"),
        }
    }
}

impl<T: fmt::Debug> Error for ExchangeError<T> {}

/// A latch wait abandoned through a [`CancelToken`](crate::CancelToken).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitCancelled;

impl fmt::Display for WaitCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wait abandoned by cancellation")
    }
}

impl Error for WaitCancelled {}

/// Why an [`AsyncTask`](crate::AsyncTask) result could not be produced.
#[derive(Debug, Clone)]
pub enum TaskError {
    /// The task was cancelled before producing a result.
    Cancelled,
    /// The computation failed; the cause is shared between all getters.
    Failed(Arc<TaskFailure>),
    /// The task was still not terminal when the timed wait expired.
    TimedOut,
    /// The *caller's* wait was abandoned through its own
    /// [`CancelToken`](crate::CancelToken); the task itself may still
    /// complete.
    WaitCancelled,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Cancelled => write!(f, "task was cancelled"),
            TaskError::Failed(cause) => write!(f, "task computation failed: {}", cause),
            TaskError::TimedOut => write!(f, "task result not ready in time"),
            TaskError::WaitCancelled => write!(f, "wait for task result abandoned by cancellation"),
        }
    }
}

impl Error for TaskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TaskError::Failed(cause) => Some(cause.as_ref().as_ref()),
            _ => None,
        }
    }
}

/// A [`FieldHandle`](crate::FieldHandle) used against storage that does not
/// belong to the target instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldError;

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field handle projection resolves outside the target instance's storage"
        )
    }
}

impl Error for FieldError {}
