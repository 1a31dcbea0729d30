//! Reusable handles onto an atomic field of a struct.
//!
//! A [`FieldHandle`] captures *which* field of an owner type to operate on,
//! independently of any particular instance. The same handle then drives
//! atomic accesses against any number of instances, the way a single
//! updater object serves a whole population of records.

use std::fmt;
use std::marker::PhantomData;
use std::mem;

use crate::cell::{Atom, AtomNum, AtomicCell};
use crate::error::FieldError;

/// A handle onto one [`AtomicCell`] field of an owner type `O`.
///
/// The handle is built from a projection function mapping an owner to one of
/// its cells. Every accessor first checks that the projected cell actually
/// lives inside the storage of the instance it is applied to; a projection
/// that escapes the instance (for example one returning a cell borrowed from
/// somewhere else entirely) makes the accessors panic. Use
/// [`validate`](Self::validate) for a non-panicking check.
///
/// # Examples
///
/// ```
/// use kilit::{AtomicCell, FieldHandle};
///
/// struct Record {
///     hits: AtomicCell<u64>,
/// }
///
/// let handle = FieldHandle::new(|r: &Record| &r.hits);
/// let record = Record { hits: AtomicCell::new(0) };
/// handle.fetch_inc(&record);
/// assert_eq!(handle.get(&record), 1);
/// ```
pub struct FieldHandle<O, T: Atom> {
    project: fn(&O) -> &AtomicCell<T>,
    _marker: PhantomData<fn(&O) -> T>,
}

impl<O, T: Atom> FieldHandle<O, T> {
    /// Creates a handle from a projection onto one field of `O`.
    pub fn new(project: fn(&O) -> &AtomicCell<T>) -> Self {
        Self {
            project,
            _marker: PhantomData,
        }
    }

    /// Checks that the projection lands inside `owner`'s own storage.
    pub fn validate(&self, owner: &O) -> Result<(), FieldError> {
        let base = owner as *const O as usize;
        let cell = (self.project)(owner) as *const AtomicCell<T> as usize;
        let end = base + mem::size_of::<O>();
        if cell >= base && cell + mem::size_of::<AtomicCell<T>>() <= end {
            Ok(())
        } else {
            Err(FieldError)
        }
    }

    fn cell<'a>(&self, owner: &'a O) -> &'a AtomicCell<T> {
        if self.validate(owner).is_err() {
            panic!("field handle projection escapes the target instance");
        }
        (self.project)(owner)
    }

    /// Reads the field.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn get(&self, owner: &O) -> T {
        self.cell(owner).get()
    }

    /// Writes the field.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn set(&self, owner: &O, value: T) {
        self.cell(owner).set(value)
    }

    /// Atomically replaces the field and returns the previous value.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn get_and_set(&self, owner: &O, value: T) -> T {
        self.cell(owner).get_and_set(value)
    }

    /// Replaces the field with `new` iff it currently holds `expected`.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn compare_and_set(&self, owner: &O, expected: T, new: T) -> bool {
        self.cell(owner).compare_and_set(expected, new)
    }

    /// Weak form of [`compare_and_set`](Self::compare_and_set); may fail
    /// spuriously, intended for retry loops.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn compare_and_set_weak(&self, owner: &O, expected: T, new: T) -> bool {
        self.cell(owner).compare_and_set_weak(expected, new)
    }
}

impl<O, T: AtomNum> FieldHandle<O, T> {
    /// Atomically adds `delta`, returning the previous value.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn fetch_add(&self, owner: &O, delta: T) -> T {
        self.cell(owner).fetch_add(delta)
    }

    /// Atomically subtracts `delta`, returning the previous value.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn fetch_sub(&self, owner: &O, delta: T) -> T {
        self.cell(owner).fetch_sub(delta)
    }

    /// Atomically adds `delta`, returning the updated value.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn add_and_get(&self, owner: &O, delta: T) -> T {
        self.cell(owner).add_and_get(delta)
    }

    /// Atomically subtracts `delta`, returning the updated value.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn sub_and_get(&self, owner: &O, delta: T) -> T {
        self.cell(owner).sub_and_get(delta)
    }

    /// Atomically increments by one, returning the previous value.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn fetch_inc(&self, owner: &O) -> T {
        self.cell(owner).fetch_inc()
    }

    /// Atomically decrements by one, returning the previous value.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn fetch_dec(&self, owner: &O) -> T {
        self.cell(owner).fetch_dec()
    }

    /// Atomically increments by one, returning the updated value.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn inc_and_get(&self, owner: &O) -> T {
        self.cell(owner).inc_and_get()
    }

    /// Atomically decrements by one, returning the updated value.
    ///
    /// # Panics
    ///
    /// Panics if the projection does not resolve into `owner`'s storage.
    pub fn dec_and_get(&self, owner: &O) -> T {
        self.cell(owner).dec_and_get()
    }
}

impl<O, T: Atom> Clone for FieldHandle<O, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O, T: Atom> Copy for FieldHandle<O, T> {}

impl<O, T: Atom> fmt::Debug for FieldHandle<O, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldHandle { .. }")
    }
}
