//! Word-sized atomic cells.
//!
//! [`AtomicCell<T>`] wraps a single word (`bool` or any primitive integer)
//! and exposes the CAS family on it. Loads and stores are sequentially
//! consistent; a successful compare-and-set is a release-acquire edge to any
//! thread that observes the new value.

use core::fmt;
use core::sync::atomic::{
    AtomicBool, AtomicI16, AtomicI32, AtomicI64, AtomicI8, AtomicIsize, AtomicU16, AtomicU32,
    AtomicU64, AtomicU8, AtomicUsize, Ordering,
};

mod sealed {
    pub trait Sealed {}
}

/// Types storable in an [`AtomicCell`].
///
/// Sealed; implemented for `bool` and the primitive integers. Each type maps
/// to its `core::sync::atomic` representation, so every operation is a single
/// hardware atomic on the whole word.
pub trait Atom: sealed::Sealed + Copy + PartialEq + Send + 'static {
    /// The backing atomic type.
    #[doc(hidden)]
    type Repr: Send + Sync;

    /// The default (zero/false) value used by `Default` constructors.
    #[doc(hidden)]
    const ZERO: Self;

    #[doc(hidden)]
    fn pack(self) -> Self::Repr;
    #[doc(hidden)]
    fn unpack(repr: Self::Repr) -> Self;
    #[doc(hidden)]
    fn load(repr: &Self::Repr, order: Ordering) -> Self;
    #[doc(hidden)]
    fn store(repr: &Self::Repr, value: Self, order: Ordering);
    #[doc(hidden)]
    fn swap(repr: &Self::Repr, value: Self, order: Ordering) -> Self;
    #[doc(hidden)]
    fn compare_exchange(
        repr: &Self::Repr,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self>;
    #[doc(hidden)]
    fn compare_exchange_weak(
        repr: &Self::Repr,
        current: Self,
        new: Self,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Self, Self>;
}

/// Integer types storable in an [`AtomicCell`], adding wrapping arithmetic.
pub trait AtomNum: Atom {
    /// The unit used by the increment/decrement conveniences.
    #[doc(hidden)]
    const ONE: Self;

    #[doc(hidden)]
    fn fetch_add(repr: &Self::Repr, delta: Self, order: Ordering) -> Self;
    #[doc(hidden)]
    fn fetch_sub(repr: &Self::Repr, delta: Self, order: Ordering) -> Self;
    #[doc(hidden)]
    fn wrapping_add(self, delta: Self) -> Self;
    #[doc(hidden)]
    fn wrapping_sub(self, delta: Self) -> Self;
}

macro_rules! impl_atom {
    ($ty:ty, $repr:ty, $zero:expr) => {
        impl sealed::Sealed for $ty {}

        impl Atom for $ty {
            type Repr = $repr;

            const ZERO: Self = $zero;

            #[inline]
            fn pack(self) -> Self::Repr {
                <$repr>::new(self)
            }

            #[inline]
            fn unpack(repr: Self::Repr) -> Self {
                repr.into_inner()
            }

            #[inline]
            fn load(repr: &Self::Repr, order: Ordering) -> Self {
                repr.load(order)
            }

            #[inline]
            fn store(repr: &Self::Repr, value: Self, order: Ordering) {
                repr.store(value, order)
            }

            #[inline]
            fn swap(repr: &Self::Repr, value: Self, order: Ordering) -> Self {
                repr.swap(value, order)
            }

            #[inline]
            fn compare_exchange(
                repr: &Self::Repr,
                current: Self,
                new: Self,
                success: Ordering,
                failure: Ordering,
            ) -> Result<Self, Self> {
                repr.compare_exchange(current, new, success, failure)
            }

            #[inline]
            fn compare_exchange_weak(
                repr: &Self::Repr,
                current: Self,
                new: Self,
                success: Ordering,
                failure: Ordering,
            ) -> Result<Self, Self> {
                repr.compare_exchange_weak(current, new, success, failure)
            }
        }
    };
}

macro_rules! impl_atom_num {
    ($ty:ty, $repr:ty) => {
        impl_atom!($ty, $repr, 0);

        impl AtomNum for $ty {
            const ONE: Self = 1;

            #[inline]
            fn fetch_add(repr: &Self::Repr, delta: Self, order: Ordering) -> Self {
                repr.fetch_add(delta, order)
            }

            #[inline]
            fn fetch_sub(repr: &Self::Repr, delta: Self, order: Ordering) -> Self {
                repr.fetch_sub(delta, order)
            }

            #[inline]
            fn wrapping_add(self, delta: Self) -> Self {
                <$ty>::wrapping_add(self, delta)
            }

            #[inline]
            fn wrapping_sub(self, delta: Self) -> Self {
                <$ty>::wrapping_sub(self, delta)
            }
        }
    };
}

impl_atom!(bool, AtomicBool, false);
impl_atom_num!(u8, AtomicU8);
impl_atom_num!(u16, AtomicU16);
impl_atom_num!(u32, AtomicU32);
impl_atom_num!(u64, AtomicU64);
impl_atom_num!(usize, AtomicUsize);
impl_atom_num!(i8, AtomicI8);
impl_atom_num!(i16, AtomicI16);
impl_atom_num!(i32, AtomicI32);
impl_atom_num!(i64, AtomicI64);
impl_atom_num!(isize, AtomicIsize);

/// A single word holding a value of type `T`, mutated only through atomic
/// operations.
///
/// Every read observes the result of some completed write or CAS; partial
/// values are never visible. The cell is safe to share between any number of
/// threads without external locking.
///
/// # Examples
///
/// ```
/// use kilit::AtomicCell;
///
/// let cell = AtomicCell::new(41i64);
/// assert!(cell.compare_and_set(41, 42));
/// assert_eq!(cell.get(), 42);
/// ```
pub struct AtomicCell<T: Atom> {
    repr: T::Repr,
}

impl<T: Atom> AtomicCell<T> {
    /// Creates a cell holding `value`.
    #[inline]
    pub fn new(value: T) -> Self {
        Self { repr: value.pack() }
    }

    /// Returns the current value.
    #[inline]
    pub fn get(&self) -> T {
        T::load(&self.repr, Ordering::SeqCst)
    }

    /// Unconditionally replaces the current value.
    #[inline]
    pub fn set(&self, value: T) {
        T::store(&self.repr, value, Ordering::SeqCst)
    }

    /// Atomically replaces the value and returns the previous one.
    #[inline]
    pub fn get_and_set(&self, value: T) -> T {
        T::swap(&self.repr, value, Ordering::SeqCst)
    }

    /// Replaces the value with `new` iff the current value equals `expected`.
    ///
    /// Returns whether the replacement took place; on failure the cell is
    /// left unchanged. Exactly one caller succeeds per actual value
    /// transition.
    #[inline]
    pub fn compare_and_set(&self, expected: T, new: T) -> bool {
        T::compare_exchange(&self.repr, expected, new, Ordering::SeqCst, Ordering::SeqCst).is_ok()
    }

    /// Weak form of [`compare_and_set`](Self::compare_and_set).
    ///
    /// May fail spuriously even when the current value equals `expected`
    /// (never spuriously succeeds), which permits a cheaper instruction on
    /// some platforms. Call it in a retry loop:
    ///
    /// ```
    /// use kilit::AtomicCell;
    ///
    /// let cell = AtomicCell::new(0u32);
    /// let mut cur = cell.get();
    /// loop {
    ///     if cell.compare_and_set_weak(cur, cur + 1) {
    ///         break;
    ///     }
    ///     cur = cell.get();
    /// }
    /// ```
    #[inline]
    pub fn compare_and_set_weak(&self, expected: T, new: T) -> bool {
        T::compare_exchange_weak(&self.repr, expected, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Applies `f` to the current value until the resulting CAS succeeds,
    /// returning the previous value.
    #[inline]
    pub fn fetch_update(&self, mut f: impl FnMut(T) -> T) -> T {
        let mut current = self.get();
        loop {
            match T::compare_exchange_weak(
                &self.repr,
                current,
                f(current),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(prev) => return prev,
                Err(actual) => current = actual,
            }
        }
    }

    /// Consumes the cell and returns the contained value.
    #[inline]
    pub fn into_inner(self) -> T {
        T::unpack(self.repr)
    }
}

impl<T: AtomNum> AtomicCell<T> {
    /// Atomically adds `delta` (wrapping) and returns the previous value.
    #[inline]
    pub fn fetch_add(&self, delta: T) -> T {
        T::fetch_add(&self.repr, delta, Ordering::SeqCst)
    }

    /// Atomically subtracts `delta` (wrapping) and returns the previous value.
    #[inline]
    pub fn fetch_sub(&self, delta: T) -> T {
        T::fetch_sub(&self.repr, delta, Ordering::SeqCst)
    }

    /// Atomically adds `delta` (wrapping) and returns the new value.
    #[inline]
    pub fn add_and_get(&self, delta: T) -> T {
        self.fetch_add(delta).wrapping_add(delta)
    }

    /// Atomically subtracts `delta` (wrapping) and returns the new value.
    #[inline]
    pub fn sub_and_get(&self, delta: T) -> T {
        self.fetch_sub(delta).wrapping_sub(delta)
    }

    /// Atomically increments by one, returning the previous value.
    #[inline]
    pub fn fetch_inc(&self) -> T {
        self.fetch_add(T::ONE)
    }

    /// Atomically decrements by one, returning the previous value.
    #[inline]
    pub fn fetch_dec(&self) -> T {
        self.fetch_sub(T::ONE)
    }

    /// Atomically increments by one, returning the new value.
    #[inline]
    pub fn inc_and_get(&self) -> T {
        self.add_and_get(T::ONE)
    }

    /// Atomically decrements by one, returning the new value.
    #[inline]
    pub fn dec_and_get(&self) -> T {
        self.sub_and_get(T::ONE)
    }
}

impl<T: Atom> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::new(T::ZERO)
    }
}

impl<T: Atom> From<T> for AtomicCell<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Atom + fmt::Debug> fmt::Debug for AtomicCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicCell").field(&self.get()).finish()
    }
}
