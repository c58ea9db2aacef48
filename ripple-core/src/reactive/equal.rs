//! Equality functions.
//!
//! Every signal carries an `Equal<T>` that decides whether a write (or a
//! derived recomputation) actually changed the value. Only changes that are
//! not equal propagate to subscribers.

use std::fmt;
use std::sync::Arc;

/// A pluggable `(a, b) -> bool` comparison shared between signal handles.
pub struct Equal<T>(Arc<dyn Fn(&T, &T) -> bool + Send + Sync>);

impl<T> Equal<T> {
    /// Wrap an arbitrary comparison function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// A comparison that never reports equality, so every write emits.
    pub fn never() -> Self {
        Self::new(|_, _| false)
    }

    /// Compare two values.
    pub fn eq(&self, a: &T, b: &T) -> bool {
        (self.0)(a, b)
    }
}

impl<T: PartialEq> Equal<T> {
    /// Structural equality via `PartialEq`. This is the default.
    pub fn partial_eq() -> Self {
        Self::new(|a: &T, b: &T| a == b)
    }
}

impl<U: ?Sized> Equal<Arc<U>> {
    /// Identity equality: two `Arc`s are equal only if they point at the
    /// same allocation.
    pub fn by_ptr() -> Self {
        Self::new(|a: &Arc<U>, b: &Arc<U>| Arc::ptr_eq(a, b))
    }
}

impl<T> Clone for Equal<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: PartialEq> Default for Equal<T> {
    fn default() -> Self {
        Self::partial_eq()
    }
}

impl<T> fmt::Debug for Equal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Equal(..)")
    }
}
