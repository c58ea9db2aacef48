//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value, an
//! equality function, and the set of emitters subscribed to it.
//!
//! # How Signals Work
//!
//! 1. Reading a signal through a tracked [`Scope`] attaches the scope's
//!    emitter to the signal.
//!
//! 2. Writing a value that is not equal to the current one pushes the
//!    signal's listeners into the update queue.
//!
//! 3. The queue invalidates those emitters and emits them: derived signals
//!    right away, everything else once at the end of the pass.
//!
//! # Variants
//!
//! There are two kinds of signal behind the one `Signal<T>` handle:
//!
//! - Direct signals store their value.
//! - Derived signals compute it from other signals through a getter,
//!   optionally writable through a setter.
//!
//! Both share the same read/write surface; the handle dispatches on
//! [`SignalKind`].
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A unique ID (8 bytes)
//! - The equality function (shared, behind Arc)
//! - A listener slot table (grows with number of subscribers)
//! - The variant payload

use std::fmt::{self, Debug, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::derived::{DerivedCell, Getter, Setter};
use super::direct::DirectCell;
use super::emitter::{Scope, STATIC_SCOPE};
use super::equal::Equal;
use super::error::{ReactiveError, Result};
use super::listeners::ListenerSet;
use super::queue;

/// Counter for generating unique signal IDs.
static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u64);

impl SignalId {
    fn next() -> Self {
        Self(SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signal#{}", self.0)
    }
}

pub(crate) enum SignalKind<T> {
    Direct(DirectCell<T>),
    Derived(DerivedCell<T>),
}

pub(crate) struct SignalInner<T> {
    id: SignalId,
    equal: Equal<T>,
    listeners: ListenerSet,
    kind: SignalKind<T>,
}

impl<T> SignalInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn read(&self, scope: &Scope) -> T {
        scope.attach(&self.listeners);
        match &self.kind {
            SignalKind::Direct(cell) => cell.read(),
            SignalKind::Derived(cell) => cell.read(),
        }
    }

    fn write(&self, value: T) {
        match &self.kind {
            SignalKind::Direct(cell) => cell.write(value, &self.equal, &self.listeners),
            SignalKind::Derived(cell) => cell.write(value, &self.listeners),
        }
    }

    /// Reaction of a derived signal to one of its inputs changing.
    pub(crate) fn react(&self) {
        if let SignalKind::Derived(cell) = &self.kind {
            cell.react(&self.equal, &self.listeners);
        }
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Cloning the handle shares the cell. Use [`Signal::fork`] for an
/// independent copy.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Signal, STATIC_SCOPE};
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// let sum = Signal::derive({
///     let (a, b) = (a.clone(), b.clone());
///     move |scope| a.read(scope) + b.read(scope)
/// });
///
/// assert_eq!(sum.read(&STATIC_SCOPE), 3);
/// a.set(10);
/// assert_eq!(sum.read(&STATIC_SCOPE), 12);
/// ```
pub struct Signal<T>(Arc<SignalInner<T>>);

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a direct signal compared with `PartialEq`.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equal(value, Equal::partial_eq())
    }

    /// Create a direct signal with a custom equality function.
    pub fn with_equal(value: T, equal: Equal<T>) -> Self {
        Self(Arc::new(SignalInner {
            id: SignalId::next(),
            equal,
            listeners: ListenerSet::new(),
            kind: SignalKind::Direct(DirectCell::new(value)),
        }))
    }

    /// Create a read-only derived signal.
    pub fn derive<G>(getter: G) -> Self
    where
        T: PartialEq,
        G: Fn(&Scope) -> T + Send + Sync + 'static,
    {
        Self::derive_with_equal(getter, Equal::partial_eq())
    }

    pub fn derive_with_equal<G>(getter: G, equal: Equal<T>) -> Self
    where
        G: Fn(&Scope) -> T + Send + Sync + 'static,
    {
        Self::from_derived(Box::new(getter), None, equal)
    }

    /// Create a derived signal whose writes are forwarded to `setter`.
    pub fn derive_writable<G, S>(getter: G, setter: S) -> Self
    where
        T: PartialEq,
        G: Fn(&Scope) -> T + Send + Sync + 'static,
        S: Fn(T, &Scope) + Send + Sync + 'static,
    {
        Self::derive_writable_with_equal(getter, setter, Equal::partial_eq())
    }

    pub fn derive_writable_with_equal<G, S>(getter: G, setter: S, equal: Equal<T>) -> Self
    where
        G: Fn(&Scope) -> T + Send + Sync + 'static,
        S: Fn(T, &Scope) + Send + Sync + 'static,
    {
        Self::from_derived(Box::new(getter), Some(Box::new(setter)), equal)
    }

    fn from_derived(getter: Getter<T>, setter: Option<Setter<T>>, equal: Equal<T>) -> Self {
        Self(Arc::new_cyclic(|owner: &Weak<SignalInner<T>>| SignalInner {
            id: SignalId::next(),
            equal,
            listeners: ListenerSet::new(),
            kind: SignalKind::Derived(DerivedCell::new(owner.clone(), getter, setter)),
        }))
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SignalId {
        self.0.id
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.0.kind, SignalKind::Derived(_))
    }

    /// Whether `set` stores a value. False only for derived signals built
    /// without a setter.
    pub fn is_writable(&self) -> bool {
        match &self.0.kind {
            SignalKind::Direct(_) => true,
            SignalKind::Derived(cell) => cell.is_writable(),
        }
    }

    /// Number of emitters currently subscribed to this signal.
    pub fn listener_count(&self) -> usize {
        self.0.listeners.len()
    }

    /// Whether two handles point at the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Get the current value.
    ///
    /// If `scope` is tracked, its emitter is subscribed to this signal.
    pub fn read(&self, scope: &Scope) -> T {
        self.0.read(scope)
    }

    /// Call `f` with a borrow of the current value, subscribing like
    /// [`Signal::read`]. A direct signal's value stays read-locked while `f`
    /// runs, so `f` must not write this signal.
    pub fn with<R>(&self, scope: &Scope, f: impl FnOnce(&T) -> R) -> R {
        match &self.0.kind {
            SignalKind::Direct(cell) => {
                scope.attach(&self.0.listeners);
                cell.with(f)
            }
            SignalKind::Derived(_) => f(&self.0.read(scope)),
        }
    }

    /// Get the current value without subscribing.
    pub fn get_untracked(&self) -> T {
        self.0.read(&STATIC_SCOPE)
    }

    /// Write a new value.
    ///
    /// A direct signal stores it and notifies subscribers only if it differs
    /// from the current value. A derived signal hands it to its setter and
    /// always notifies.
    pub fn set(&self, value: T) {
        queue::enqueue(|| self.0.write(value))
    }

    /// Write a value computed from the current one. `f` runs with the
    /// untracked scope.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T, &Scope) -> T,
    {
        queue::enqueue(|| {
            let current = self.0.read(&STATIC_SCOPE);
            let next = f(&current, &STATIC_SCOPE);
            self.0.write(next);
        })
    }

    /// Like [`Signal::set`], but refuses read-only derived signals instead
    /// of notifying their subscribers.
    pub fn try_set(&self, value: T) -> Result<()> {
        if !self.is_writable() {
            return Err(ReactiveError::ReadOnly(self.0.id));
        }
        self.set(value);
        Ok(())
    }

    /// Create an independent direct signal seeded with the current value.
    /// Subscribers are not copied. The equality function is shared.
    pub fn fork(&self) -> Self {
        Self::with_equal(self.get_untracked(), self.0.equal.clone())
    }

    /// Like [`Signal::fork`], seeding the copy with `transform(current)`.
    pub fn fork_with<F>(&self, transform: F) -> Self
    where
        F: FnOnce(T) -> T,
    {
        Self::with_equal(transform(self.get_untracked()), self.0.equal.clone())
    }

    pub fn fork_with_equal<F>(&self, transform: F, equal: Equal<T>) -> Self
    where
        F: FnOnce(T) -> T,
    {
        Self::with_equal(transform(self.get_untracked()), equal)
    }

    #[cfg(test)]
    pub(crate) fn derived_cell(&self) -> Option<&DerivedCell<T>> {
        match &self.0.kind {
            SignalKind::Derived(cell) => Some(cell),
            SignalKind::Direct(_) => None,
        }
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Default for Signal<T>
where
    T: Default + PartialEq + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.0.id)
            .field("derived", &self.is_derived())
            .field("value", &self.get_untracked())
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

impl<T> Display for Signal<T>
where
    T: Clone + Send + Sync + Display + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(&STATIC_SCOPE, |value| Display::fmt(value, f))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
