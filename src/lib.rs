//! Kilit: Lock-free synchronization primitives for multi-threaded programs.
//!
//! Kilit bundles the small building blocks concurrent code keeps reaching
//! for: word-sized atomic cells and arrays, atomically replaceable shared
//! references with marks and stamps, a thread parker with cancellation
//! tokens, an unbounded lock-free FIFO queue, a two-party value exchanger,
//! a countdown latch, and a cancellable run-once task cell.
//!
//! # Key Features
//!
//! - **Lock-Free Cores**: Cells, arrays, references and the queue are CAS
//!   loops with backoff; callers never take a lock.
//! - **Safe Reclamation**: Queue nodes, exchange records and reference nodes
//!   are retired through epoch guards, never freed under a concurrent reader.
//! - **Cooperative Cancellation**: A [`CancelToken`] threads through every
//!   blocking wait, so a cancelled waiter unblocks promptly and reports it.
//! - **Honest Timeouts**: A timed wait never reports a timeout once its
//!   condition was satisfied before the deadline was observed.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use kilit::{ConcurrentQueue, CountdownLatch};
//!
//! let queue = Arc::new(ConcurrentQueue::new());
//! let done = Arc::new(CountdownLatch::new(2));
//!
//! for id in 0..2 {
//!     let queue = Arc::clone(&queue);
//!     let done = Arc::clone(&done);
//!     thread::spawn(move || {
//!         queue.push(id);
//!         done.count_down();
//!     });
//! }
//!
//! done.wait();
//! assert_eq!(queue.len(), 2);
//! ```

#![warn(missing_docs)]

mod array;
mod cell;
mod error;
mod exchange;
mod field;
mod latch;
mod park;
mod queue;
mod reference;
mod task;

pub use array::AtomicArray;
pub use cell::{Atom, AtomNum, AtomicCell};
pub use error::{ExchangeError, FieldError, TaskError, TaskFailure, WaitCancelled};
pub use exchange::Exchanger;
pub use field::FieldHandle;
pub use latch::CountdownLatch;
pub use park::{CancelToken, Parker, Unparker};
pub use queue::{ConcurrentQueue, Iter};
pub use reference::{AtomicRef, MarkableRef, StampedRef};
pub use task::AsyncTask;
