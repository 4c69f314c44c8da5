use core::sync::atomic::{AtomicUsize, Ordering};

pub mod cfg;
pub mod client;
pub mod cmd;
pub mod engine;
mod histogram;
pub mod logging;
pub mod runtime;
pub mod stat;
pub mod target;

/// Thread-safe producing iterators.
///
/// Unlike the [`Iterator`] this trait accepts `self` by reference and returns a
/// reference to the next item, not an [`Option`].
///
/// Think of it as an infinite thread-safe iterator.
pub trait Produce {
    /// The type of the elements being produced.
    type Item: ?Sized;

    /// Advances this producer and returns the next value.
    fn next(&self) -> &Self::Item;
}

/// Thread-safe infinite cycle producing iterator over the given vector.
///
/// The cursor is shared by every caller, so concurrent callers may interleave,
/// but over time each element is yielded equally often.
#[derive(Debug)]
pub struct VecProduce<T> {
    vec: Vec<T>,
    idx: AtomicUsize,
}

impl<T> VecProduce<T> {
    /// Constructs a new [`VecProduce`] from the given vector.
    ///
    /// The vector must not be empty.
    #[inline]
    pub const fn new(vec: Vec<T>) -> Self {
        Self { vec, idx: AtomicUsize::new(0) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.vec
    }

    /// Returns the index of the next element and advances the cursor.
    #[inline]
    pub fn next_idx(&self) -> usize {
        // Increment the current value, returning the previous one.
        let idx = self.idx.fetch_add(1, Ordering::Relaxed);
        idx % self.vec.len()
    }
}

impl<T> Produce for VecProduce<T> {
    type Item = T;

    #[inline]
    fn next(&self) -> &Self::Item {
        &self.vec[self.next_idx()]
    }
}
