//! Listener sets.
//!
//! Each signal owns a `ListenerSet`: a slot table of weak emitter handles.
//! An emitter that attaches to a set receives an [`Attachment`] naming the
//! slot key and the generation it was stored with. Detaching frees the slot
//! only if the generation still matches, so a key recycled by a later
//! attachment is never removed by a stale handle.
//!
//! The set never holds a strong reference to an emitter. Subscriptions do
//! not keep consumers alive.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slab::Slab;
use smallvec::SmallVec;
use tracing::trace;

use super::emitter::{Emitter, EmitterInner};

struct Listener {
    emitter: Weak<EmitterInner>,
    generation: u64,
}

#[derive(Default)]
struct Slots {
    entries: Slab<Listener>,
    /// Generation handed to the next attachment.
    next_generation: u64,
}

/// The set of emitters subscribed to one signal.
#[derive(Default)]
pub(crate) struct ListenerSet(Arc<Mutex<Slots>>);

/// An emitter's record of one listener set it is stored in.
pub(crate) struct Attachment {
    slots: Weak<Mutex<Slots>>,
    key: usize,
    generation: u64,
}

impl ListenerSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store a weak handle to `emitter` and return the attachment record.
    ///
    /// Does not check for duplicates; `Emitter::attach_to` does that from
    /// the emitter side.
    pub(crate) fn insert(&self, emitter: &Arc<EmitterInner>) -> Attachment {
        let mut slots = self.0.lock();
        let generation = slots.next_generation;
        slots.next_generation += 1;
        let key = slots.entries.insert(Listener {
            emitter: Arc::downgrade(emitter),
            generation,
        });

        Attachment {
            slots: Arc::downgrade(&self.0),
            key,
            generation,
        }
    }

    /// Number of live emitters in the set.
    pub(crate) fn len(&self) -> usize {
        self.0
            .lock()
            .entries
            .iter()
            .filter(|(_, listener)| listener.emitter.strong_count() > 0)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.0.lock().entries.len()
    }

    /// Copy out the live emitters.
    ///
    /// Iterating the copy rather than the set itself lets the caller
    /// invalidate and re-run emitters that attach back to this same set.
    /// Slots whose emitter has been dropped are freed on the way.
    pub(crate) fn snapshot(&self) -> SmallVec<[Emitter; 8]> {
        let mut live = SmallVec::new();
        let mut slots = self.0.lock();
        let mut dead: SmallVec<[usize; 4]> = SmallVec::new();

        for (key, listener) in slots.entries.iter() {
            match listener.emitter.upgrade() {
                Some(inner) => live.push(Emitter::from_inner(inner)),
                None => dead.push(key),
            }
        }
        for key in dead {
            trace!(key, "pruning dropped emitter");
            slots.entries.remove(key);
        }

        live
    }
}

impl Attachment {
    /// Whether this attachment points into `listeners`.
    pub(crate) fn belongs_to(&self, listeners: &ListenerSet) -> bool {
        std::ptr::eq(self.slots.as_ptr(), Arc::as_ptr(&listeners.0))
    }

    /// Free the slot this attachment occupies, if it is still ours.
    pub(crate) fn detach(self) {
        let Some(slots) = self.slots.upgrade() else {
            return;
        };
        let mut slots = slots.lock();
        let ours = slots
            .entries
            .get(self.key)
            .is_some_and(|listener| listener.generation == self.generation);
        if ours {
            slots.entries.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_detach() {
        let listeners = ListenerSet::new();
        let emitter = Emitter::new(|| {});

        let attachment = listeners.insert(emitter.inner());
        assert_eq!(listeners.len(), 1);
        assert!(attachment.belongs_to(&listeners));

        attachment.detach();
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn stale_attachment_does_not_free_reused_slot() {
        let listeners = ListenerSet::new();
        let first = Emitter::new(|| {});
        let second = Emitter::new(|| {});

        let stale = listeners.insert(first.inner());
        let stale_key = stale.key;
        let stale_generation = stale.generation;
        stale.detach();

        // The slab hands the freed key to the next insert.
        let fresh = listeners.insert(second.inner());
        assert_eq!(fresh.key, stale_key);

        let forged = Attachment {
            slots: Arc::downgrade(&listeners.0),
            key: stale_key,
            generation: stale_generation,
        };
        forged.detach();

        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn snapshot_prunes_dropped_emitters() {
        let listeners = ListenerSet::new();
        let kept = Emitter::new(|| {});
        let dropped = Emitter::new(|| {});

        // Leak the attachments on purpose so the emitters do not detach.
        std::mem::forget(listeners.insert(kept.inner()));
        std::mem::forget(listeners.insert(dropped.inner()));
        drop(dropped);

        let live = listeners.snapshot();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id(), kept.id());
        assert_eq!(listeners.0.lock().entries.len(), 1);
    }

    #[test]
    fn belongs_to_distinguishes_sets() {
        let a = ListenerSet::new();
        let b = ListenerSet::new();
        let emitter = Emitter::new(|| {});

        let attachment = a.insert(emitter.inner());
        assert!(attachment.belongs_to(&a));
        assert!(!attachment.belongs_to(&b));
    }
}
