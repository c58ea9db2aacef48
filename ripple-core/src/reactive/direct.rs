//! Direct signals: cells that store their value.

use parking_lot::RwLock;

use super::equal::Equal;
use super::listeners::ListenerSet;
use super::queue;

pub(crate) struct DirectCell<T> {
    value: RwLock<T>,
}

impl<T: Clone> DirectCell<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    pub(crate) fn read(&self) -> T {
        self.value.read().clone()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.read())
    }

    /// Store `next` unless it equals the current value, and schedule the
    /// listeners if it was stored.
    pub(crate) fn write(&self, next: T, equal: &Equal<T>, listeners: &ListenerSet) {
        if equal.eq(&self.value.read(), &next) {
            return;
        }
        *self.value.write() = next;
        queue::push(listeners);
    }
}
