//! Update Queue
//!
//! Every write runs inside an update pass. The first `enqueue` on a call
//! stack opens the pass; nested calls (writes made from a derived signal's
//! reaction, from inside `batch`, or from an emit callback that runs while
//! the pass is still collecting) join it.
//!
//! # How a pass works
//!
//! 1. A changed signal pushes its listener set. The set is snapshotted and
//!    each live emitter is invalidated immediately.
//!
//! 2. Derived emitters are emitted on the spot, so derived signals settle
//!    (and decide whether to propagate) before anything downstream runs.
//!
//! 3. Every other emitter is parked in a deduplicating pending set.
//!
//! 4. When the outermost call returns, the slot is cleared and then each
//!    pending emitter is emitted exactly once. Writes made during that
//!    flush open a fresh pass of their own.
//!
//! The slot is cleared by a drop guard, so a panic escaping the pass
//! cannot leave a stale queue behind for later writes to pile into.
//!
//! A derived signal whose getter produces a different value on every run,
//! and which feeds back into its own inputs, will recompute forever. That
//! is a bug in the getter; the queue does not guard against it.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use super::emitter::{Emitter, EmitterId, Scope};
use super::error::{ReactiveError, Result};
use super::listeners::ListenerSet;

#[derive(Default)]
struct UpdateQueue {
    pending: IndexMap<EmitterId, Emitter>,
}

thread_local! {
    static QUEUE: RefCell<Option<UpdateQueue>> = const { RefCell::new(None) };
}

/// Owned by the outermost `enqueue` frame. Clears the slot on every exit
/// path.
struct PassGuard;

impl PassGuard {
    fn release(self) -> IndexMap<EmitterId, Emitter> {
        QUEUE
            .with(|slot| slot.borrow_mut().take())
            .map(|queue| queue.pending)
            .unwrap_or_default()
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        QUEUE.with(|slot| slot.borrow_mut().take());
    }
}

/// Run `f` inside an update pass, opening one if none is active.
pub(crate) fn enqueue<R>(f: impl FnOnce() -> R) -> R {
    let opened = QUEUE.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            false
        } else {
            *slot = Some(UpdateQueue::default());
            true
        }
    });
    if !opened {
        return f();
    }

    debug!("update pass opened");
    let guard = PassGuard;
    let result = f();
    let pending = guard.release();

    if !pending.is_empty() {
        debug!(pending = pending.len(), "flushing update pass");
    }
    for emitter in pending.into_values() {
        emitter.emit();
    }

    result
}

/// Schedule every emitter in `listeners`.
pub(crate) fn push(listeners: &ListenerSet) {
    enqueue(|| {
        for emitter in listeners.snapshot() {
            emitter.invalidate();

            if emitter.is_derived() {
                trace!(emitter = %emitter.id(), "emitting derived");
                emitter.emit();
                continue;
            }

            trace!(emitter = %emitter.id(), "deferring emit");
            QUEUE.with(|slot| {
                if let Some(queue) = slot.borrow_mut().as_mut() {
                    queue.pending.entry(emitter.id()).or_insert(emitter);
                }
            });
        }
    })
}

/// Whether an update pass is active on this thread.
pub fn is_batching() -> bool {
    QUEUE.with(|slot| slot.borrow().is_some())
}

/// Run `f` as one update pass. Subscribers affected by any number of
/// writes inside `f` are notified once, after `f` returns.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{batch, Signal};
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    enqueue(f)
}

/// Run `f` with the untracked scope. Reads inside `f` do not subscribe;
/// writes inside `f` join the active update pass.
pub fn untrack<R>(f: impl FnOnce(&Scope) -> R) -> R {
    enqueue(|| f(&Scope::untracked()))
}

/// Like [`batch`], but a panic raised by `f` or by any getter, setter or
/// emit callback it triggers is returned as [`ReactiveError::Aborted`].
pub fn try_batch<R>(f: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(|| enqueue(f))).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        warn!(%message, "update pass aborted");
        ReactiveError::Aborted(message)
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
