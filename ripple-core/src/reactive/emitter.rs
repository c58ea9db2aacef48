//! Emitters and Scopes
//!
//! An [`Emitter`] is the subscription identity of one consumer: a derived
//! signal's recomputation, a subscription callback, a component render. It
//! remembers every listener set it is attached to, so detaching costs
//! O(attachments) instead of a scan over every signal.
//!
//! A [`Scope`] is the short-lived handle passed into every read. A tracked
//! scope wraps an emitter; reading a signal through it attaches that
//! emitter to the signal. The untracked scope wraps nothing.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --read--> Attached --invalidate()--> Invalidated --create()+read--> Attached
//! ```
//!
//! Every `create()` and `invalidate()` bumps the emitter's version. A scope
//! remembers the version it was created with, so a scope that outlived its
//! read-cycle stops subscribing once the emitter has moved on.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::listeners::{Attachment, ListenerSet};

/// Unique identifier for an emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(u64);

impl EmitterId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "emitter#{}", self.0)
    }
}

pub(crate) struct EmitterInner {
    id: EmitterId,
    /// Derived emitters are emitted synchronously during a pass.
    derived: bool,
    version: AtomicU64,
    emit: Box<dyn Fn() + Send + Sync>,
    attachments: Mutex<SmallVec<[Attachment; 4]>>,
}

impl EmitterInner {
    fn detach_all(&self) -> usize {
        let attachments = std::mem::take(&mut *self.attachments.lock());
        let count = attachments.len();
        for attachment in attachments {
            attachment.detach();
        }
        count
    }
}

impl Drop for EmitterInner {
    fn drop(&mut self) {
        for attachment in self.attachments.get_mut().drain(..) {
            attachment.detach();
        }
    }
}

/// A subscription identity.
///
/// Cloning an `Emitter` yields another handle to the same identity.
#[derive(Clone)]
pub struct Emitter(Arc<EmitterInner>);

impl Emitter {
    /// Create a consumer emitter. `emit` runs once per update pass, after
    /// every derived signal has settled.
    pub fn new<F>(emit: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(false, Box::new(emit))
    }

    /// Create a derived emitter. `emit` runs synchronously as soon as any
    /// signal it is attached to changes.
    pub fn derived<F>(emit: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::build(true, Box::new(emit))
    }

    fn build(derived: bool, emit: Box<dyn Fn() + Send + Sync>) -> Self {
        Self(Arc::new(EmitterInner {
            id: EmitterId::next(),
            derived,
            version: AtomicU64::new(0),
            emit,
            attachments: Mutex::new(SmallVec::new()),
        }))
    }

    pub(crate) fn from_inner(inner: Arc<EmitterInner>) -> Self {
        Self(inner)
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<EmitterInner> {
        &self.0
    }

    pub fn id(&self) -> EmitterId {
        self.0.id
    }

    pub fn is_derived(&self) -> bool {
        self.0.derived
    }

    /// Number of `create()`/`invalidate()` calls so far.
    pub fn version(&self) -> u64 {
        self.0.version.load(Ordering::Acquire)
    }

    /// Number of listener sets this emitter is currently stored in.
    pub fn attachment_count(&self) -> usize {
        self.0.attachments.lock().len()
    }

    /// Start a new read-cycle.
    ///
    /// Drops every subscription from the previous cycle and returns a fresh
    /// tracked scope. Call this before each re-run of the consumer's
    /// compute function.
    pub fn create(&self) -> Scope {
        let version = self.reset();
        Scope {
            tracker: Some(Tracker {
                emitter: Arc::downgrade(&self.0),
                version,
            }),
        }
    }

    /// Detach from every signal and retire all outstanding scopes.
    ///
    /// Does not call `emit`; the update queue decides whether and when to.
    pub fn invalidate(&self) {
        self.reset();
    }

    fn reset(&self) -> u64 {
        let detached = self.0.detach_all();
        let version = self.0.version.fetch_add(1, Ordering::AcqRel) + 1;
        if detached > 0 {
            trace!(emitter = %self.0.id, detached, version, "emitter detached");
        }
        version
    }

    /// Run the emit callback.
    pub fn emit(&self) {
        (self.0.emit)()
    }

    /// Store this emitter in `listeners`. Attaching twice to the same set
    /// within one read-cycle is a no-op.
    ///
    /// The duplicate check is a linear scan, newest first, so a cycle that
    /// reads `n` distinct signals costs O(n^2) pointer compares. Repeated
    /// reads of the signal just read hit on the first compare.
    pub(crate) fn attach_to(&self, listeners: &ListenerSet) {
        let mut attachments = self.0.attachments.lock();
        if attachments.iter().rev().any(|a| a.belongs_to(listeners)) {
            return;
        }
        attachments.push(listeners.insert(&self.0));
    }
}

impl PartialEq for Emitter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Emitter {}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("id", &self.0.id)
            .field("derived", &self.0.derived)
            .field("version", &self.version())
            .field("attachments", &self.attachment_count())
            .finish()
    }
}

#[derive(Clone)]
struct Tracker {
    emitter: Weak<EmitterInner>,
    version: u64,
}

/// The handle every read goes through.
#[derive(Clone, Default)]
pub struct Scope {
    tracker: Option<Tracker>,
}

/// The shared untracked scope. Reads through it never subscribe.
pub static STATIC_SCOPE: Scope = Scope::untracked();

impl Scope {
    /// A scope that carries no emitter.
    pub const fn untracked() -> Self {
        Self { tracker: None }
    }

    /// The emitter behind this scope, if it is still in the read-cycle the
    /// scope was created for.
    fn current(&self) -> Option<Arc<EmitterInner>> {
        let tracker = self.tracker.as_ref()?;
        let inner = tracker.emitter.upgrade()?;
        (inner.version.load(Ordering::Acquire) == tracker.version).then_some(inner)
    }

    /// Whether reads through this scope create subscriptions.
    pub fn is_tracked(&self) -> bool {
        self.current().is_some()
    }

    pub(crate) fn attach(&self, listeners: &ListenerSet) {
        if let Some(inner) = self.current() {
            Emitter(inner).attach_to(listeners);
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current() {
            Some(inner) => write!(f, "Scope({})", inner.id),
            None => f.write_str("Scope(untracked)"),
        }
    }
}
