//! Fixed-length arrays of independently atomic slots.

use core::fmt;

use crate::cell::{Atom, AtomNum, AtomicCell};

/// A fixed-length sequence of [`AtomicCell`] slots.
///
/// Every slot is an independent atomic word: operations on index `i` never
/// affect index `j != i`. The length is fixed at construction.
///
/// All indexed operations panic when `index >= len()`, on read and write
/// paths alike.
///
/// # Examples
///
/// ```
/// use kilit::AtomicArray;
///
/// let arr = AtomicArray::from_slice(&[1u64, 2, 3]);
/// assert!(arr.compare_and_set(1, 2, 20));
/// assert_eq!(arr.get(1), 20);
/// ```
pub struct AtomicArray<T: Atom> {
    slots: Box<[AtomicCell<T>]>,
}

impl<T: Atom> AtomicArray<T> {
    /// Creates an array of `len` default-valued (zero/false) slots.
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| AtomicCell::default()).collect(),
        }
    }

    /// Creates an array with a deep copy of `source`.
    ///
    /// The slots do not alias the source: mutating `source` afterwards has
    /// no effect on the array.
    pub fn from_slice(source: &[T]) -> Self {
        Self {
            slots: source.iter().map(|&v| AtomicCell::new(v)).collect(),
        }
    }

    /// Returns the number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the array has no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the current value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn get(&self, index: usize) -> T {
        self.slot(index).get()
    }

    /// Unconditionally replaces the value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn set(&self, index: usize, value: T) {
        self.slot(index).set(value)
    }

    /// Atomically replaces the value at `index`, returning the previous one.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn get_and_set(&self, index: usize, value: T) -> T {
        self.slot(index).get_and_set(value)
    }

    /// CAS on the slot at `index`; see [`AtomicCell::compare_and_set`].
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn compare_and_set(&self, index: usize, expected: T, new: T) -> bool {
        self.slot(index).compare_and_set(expected, new)
    }

    /// Weak CAS on the slot at `index`; may fail spuriously, retry in a
    /// loop. See [`AtomicCell::compare_and_set_weak`].
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn compare_and_set_weak(&self, index: usize, expected: T, new: T) -> bool {
        self.slot(index).compare_and_set_weak(expected, new)
    }

    /// Returns an iterator over a point-in-time read of every slot.
    ///
    /// Each slot is read atomically, but the reads of different slots are
    /// not one combined snapshot.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.slots.iter().map(|slot| slot.get())
    }

    /// Borrows the cell at `index` directly.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn slot(&self, index: usize) -> &AtomicCell<T> {
        let len = self.len();
        match self.slots.get(index) {
            Some(slot) => slot,
            None => panic!("index out of bounds: the len is {} but the index is {}", len, index),
        }
    }
}

impl<T: AtomNum> AtomicArray<T> {
    /// Atomically adds `delta` (wrapping) at `index`, returning the previous
    /// value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn fetch_add(&self, index: usize, delta: T) -> T {
        self.slot(index).fetch_add(delta)
    }

    /// Atomically subtracts `delta` (wrapping) at `index`, returning the
    /// previous value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn fetch_sub(&self, index: usize, delta: T) -> T {
        self.slot(index).fetch_sub(delta)
    }

    /// Atomically adds `delta` (wrapping) at `index`, returning the new
    /// value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn add_and_get(&self, index: usize, delta: T) -> T {
        self.slot(index).add_and_get(delta)
    }

    /// Atomically subtracts `delta` (wrapping) at `index`, returning the
    /// new value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn sub_and_get(&self, index: usize, delta: T) -> T {
        self.slot(index).sub_and_get(delta)
    }

    /// Atomically increments the slot at `index`, returning the previous
    /// value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn fetch_inc(&self, index: usize) -> T {
        self.slot(index).fetch_inc()
    }

    /// Atomically decrements the slot at `index`, returning the previous
    /// value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn fetch_dec(&self, index: usize) -> T {
        self.slot(index).fetch_dec()
    }

    /// Atomically increments the slot at `index`, returning the new value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn inc_and_get(&self, index: usize) -> T {
        self.slot(index).inc_and_get()
    }

    /// Atomically decrements the slot at `index`, returning the new value.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn dec_and_get(&self, index: usize) -> T {
        self.slot(index).dec_and_get()
    }
}

impl<T: Atom> FromIterator<T> for AtomicArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().map(AtomicCell::new).collect(),
        }
    }
}

impl<T: Atom + fmt::Debug> fmt::Debug for AtomicArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
