//! Reference-flavored atomic cells.
//!
//! These cells hold an `Arc<T>` (identity is pointer identity, compared with
//! `Arc::ptr_eq`), optionally bundled with a boolean mark or an integer
//! stamp. Reference and tag live in one heap node behind one atomic pointer,
//! so they are always read and replaced as a single consistent pair.
//! Replaced nodes are retired through an epoch guard and never freed while a
//! concurrent reader is mid-operation.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Owned};

struct Node<T, M> {
    value: Arc<T>,
    tag: M,
}

/// Shared pointer-CAS core for the three public cell types.
struct TaggedCell<T, M> {
    node: Atomic<Node<T, M>>,
}

unsafe impl<T: Send + Sync, M: Send> Send for TaggedCell<T, M> {}
unsafe impl<T: Send + Sync, M: Send> Sync for TaggedCell<T, M> {}

impl<T: Send + Sync + 'static, M: Copy + PartialEq + 'static> TaggedCell<T, M> {
    fn new(value: Arc<T>, tag: M) -> Self {
        Self {
            node: Atomic::new(Node { value, tag }),
        }
    }

    fn get(&self) -> (Arc<T>, M) {
        let guard = epoch::pin();
        let cur = self.node.load(Ordering::Acquire, &guard);
        // SAFETY: the node is never null and stays alive while the guard is
        // held; replaced nodes are only retired, not freed in place.
        let node = unsafe { cur.deref() };
        (node.value.clone(), node.tag)
    }

    fn set(&self, value: Arc<T>, tag: M) {
        let guard = epoch::pin();
        let old = self.node.swap(
            Owned::new(Node { value, tag }),
            Ordering::AcqRel,
            &guard,
        );
        // SAFETY: old was just unlinked by the swap and cannot be installed
        // again; readers still inside their guard keep it alive until the
        // epoch advances.
        unsafe { guard.defer_destroy(old) };
    }

    fn get_and_set(&self, value: Arc<T>, tag: M) -> (Arc<T>, M) {
        let guard = epoch::pin();
        let old = self.node.swap(
            Owned::new(Node { value, tag }),
            Ordering::AcqRel,
            &guard,
        );
        // SAFETY: see `set`.
        let prev = unsafe {
            let node = old.deref();
            (node.value.clone(), node.tag)
        };
        unsafe { guard.defer_destroy(old) };
        prev
    }

    /// Single CAS attempt: succeeds iff the current node still holds the
    /// expected reference identity and the expected tag.
    fn compare_and_set(&self, expected: &Arc<T>, new: Arc<T>, expected_tag: M, new_tag: M) -> bool {
        let guard = epoch::pin();
        let cur = self.node.load(Ordering::Acquire, &guard);
        // SAFETY: see `get`.
        let node = unsafe { cur.deref() };
        if !Arc::ptr_eq(&node.value, expected) || node.tag != expected_tag {
            return false;
        }
        match self.node.compare_exchange(
            cur,
            Owned::new(Node {
                value: new,
                tag: new_tag,
            }),
            Ordering::AcqRel,
            Ordering::Acquire,
            &guard,
        ) {
            Ok(_) => {
                // SAFETY: cur lost its place in the cell to this CAS.
                unsafe { guard.defer_destroy(cur) };
                true
            }
            Err(_) => false,
        }
    }

    /// Replaces only the tag, iff the reference has not changed.
    fn attempt_tag(&self, expected: &Arc<T>, new_tag: M) -> bool {
        let guard = epoch::pin();
        let cur = self.node.load(Ordering::Acquire, &guard);
        // SAFETY: see `get`.
        let node = unsafe { cur.deref() };
        if !Arc::ptr_eq(&node.value, expected) {
            return false;
        }
        if node.tag == new_tag {
            return true;
        }
        match self.node.compare_exchange(
            cur,
            Owned::new(Node {
                value: node.value.clone(),
                tag: new_tag,
            }),
            Ordering::AcqRel,
            Ordering::Acquire,
            &guard,
        ) {
            Ok(_) => {
                // SAFETY: cur lost its place in the cell to this CAS.
                unsafe { guard.defer_destroy(cur) };
                true
            }
            Err(_) => false,
        }
    }
}

impl<T, M> Drop for TaggedCell<T, M> {
    fn drop(&mut self) {
        // Exclusive access: no guard can still reference the node.
        let node = std::mem::take(&mut self.node);
        unsafe {
            let cur = node.load(Ordering::Relaxed, epoch::unprotected());
            if !cur.is_null() {
                drop(cur.into_owned());
            }
        }
    }
}

/// An atomically replaceable `Arc<T>` with CAS on reference identity.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use kilit::AtomicRef;
///
/// let first = Arc::new("a");
/// let cell = AtomicRef::new(first.clone());
/// assert!(cell.compare_and_set(&first, Arc::new("b")));
/// assert_eq!(*cell.get(), "b");
/// ```
pub struct AtomicRef<T: Send + Sync + 'static> {
    cell: TaggedCell<T, ()>,
}

impl<T: Send + Sync + 'static> AtomicRef<T> {
    /// Creates a cell holding `value`.
    pub fn new(value: Arc<T>) -> Self {
        Self {
            cell: TaggedCell::new(value, ()),
        }
    }

    /// Returns the current reference.
    pub fn get(&self) -> Arc<T> {
        self.cell.get().0
    }

    /// Unconditionally replaces the reference.
    pub fn set(&self, value: Arc<T>) {
        self.cell.set(value, ())
    }

    /// Atomically replaces the reference and returns the previous one.
    pub fn get_and_set(&self, value: Arc<T>) -> Arc<T> {
        self.cell.get_and_set(value, ()).0
    }

    /// Replaces the reference with `new` iff the current reference is the
    /// same allocation as `expected`.
    pub fn compare_and_set(&self, expected: &Arc<T>, new: Arc<T>) -> bool {
        self.cell.compare_and_set(expected, new, (), ())
    }
}

/// An `Arc<T>` bundled with a boolean mark, updated as one atomic unit.
pub struct MarkableRef<T: Send + Sync + 'static> {
    cell: TaggedCell<T, bool>,
}

impl<T: Send + Sync + 'static> MarkableRef<T> {
    /// Creates a cell holding `value` with the given initial mark.
    pub fn new(value: Arc<T>, mark: bool) -> Self {
        Self {
            cell: TaggedCell::new(value, mark),
        }
    }

    /// Returns the current reference and mark as one consistent pair.
    pub fn get(&self) -> (Arc<T>, bool) {
        self.cell.get()
    }

    /// Returns the current reference.
    pub fn reference(&self) -> Arc<T> {
        self.cell.get().0
    }

    /// Returns the current mark.
    pub fn is_marked(&self) -> bool {
        self.cell.get().1
    }

    /// Unconditionally replaces reference and mark together.
    pub fn set(&self, value: Arc<T>, mark: bool) {
        self.cell.set(value, mark)
    }

    /// Replaces reference and mark iff both current values match the
    /// expectations. Reference and mark never change independently.
    pub fn compare_and_set(
        &self,
        expected: &Arc<T>,
        new: Arc<T>,
        expected_mark: bool,
        new_mark: bool,
    ) -> bool {
        self.cell.compare_and_set(expected, new, expected_mark, new_mark)
    }

    /// Sets the mark iff the reference has not changed.
    pub fn attempt_mark(&self, expected: &Arc<T>, new_mark: bool) -> bool {
        self.cell.attempt_tag(expected, new_mark)
    }
}

/// An `Arc<T>` bundled with an integer stamp, updated as one atomic unit.
///
/// The stamp is the classic ABA countermeasure: a CAS that expects both the
/// reference and the stamp cannot succeed against a reference that was
/// changed and changed back, as long as every change bumps the stamp.
pub struct StampedRef<T: Send + Sync + 'static> {
    cell: TaggedCell<T, usize>,
}

impl<T: Send + Sync + 'static> StampedRef<T> {
    /// Creates a cell holding `value` with the given initial stamp.
    pub fn new(value: Arc<T>, stamp: usize) -> Self {
        Self {
            cell: TaggedCell::new(value, stamp),
        }
    }

    /// Returns the current reference and stamp as one consistent pair.
    pub fn get(&self) -> (Arc<T>, usize) {
        self.cell.get()
    }

    /// Returns the current reference.
    pub fn reference(&self) -> Arc<T> {
        self.cell.get().0
    }

    /// Returns the current stamp.
    pub fn stamp(&self) -> usize {
        self.cell.get().1
    }

    /// Unconditionally replaces reference and stamp together.
    pub fn set(&self, value: Arc<T>, stamp: usize) {
        self.cell.set(value, stamp)
    }

    /// Replaces reference and stamp iff both current values match the
    /// expectations.
    pub fn compare_and_set(
        &self,
        expected: &Arc<T>,
        new: Arc<T>,
        expected_stamp: usize,
        new_stamp: usize,
    ) -> bool {
        self.cell
            .compare_and_set(expected, new, expected_stamp, new_stamp)
    }

    /// Sets the stamp iff the reference has not changed.
    pub fn attempt_stamp(&self, expected: &Arc<T>, new_stamp: usize) -> bool {
        self.cell.attempt_tag(expected, new_stamp)
    }
}
