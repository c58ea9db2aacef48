//! Derived signals
//!
//! A derived signal computes its value from other signals through a getter
//! and caches the result. It owns a derived [`Emitter`] which serves as the
//! scope for its getter, so it subscribes to whatever the getter reads.
//!
//! # How Derived Signals Work
//!
//! 1. The cache starts stale. The first read runs the getter under a fresh
//!    tracked scope, stores the result and clears the flag.
//!
//! 2. Reads of a fresh signal return the cache without running the getter.
//!
//! 3. When something the getter read changes, the update queue emits the
//!    internal emitter right away. The signal recomputes untracked and
//!    compares against the cache with its equality function:
//!    - equal: it re-subscribes to its inputs and stops there. Downstream
//!      consumers never hear about it and the cached value is kept.
//!    - different: it marks itself stale and pushes its own listeners into
//!      the active pass. The next read recomputes and re-subscribes.
//!
//! A getter that reads no signals is never invalidated and keeps its first
//! value forever.
//!
//! # Diamonds
//!
//! Derived emitters react in the order they sit in a listener set, so in a
//! diamond (`total = x - y` with `x` and `y` both derived from `base`)
//! `total` can recompute after `x` has reacted but before `y` has. Its
//! comparison then sees a half-updated value and it marks itself stale,
//! and its consumers are notified even when the settled value turns out
//! equal to the old one. Consumers always read the settled value; they may
//! just run once more than strictly needed.
//!
//! Writing runs the setter under the untracked scope and then pushes the
//! listeners unconditionally. The setter's side effect may not be reactive
//! at all, so there is nothing to compare.

use std::sync::Weak;

use parking_lot::Mutex;

use super::emitter::{Emitter, Scope};
use super::equal::Equal;
use super::listeners::ListenerSet;
use super::queue;
use super::signal::SignalInner;

pub(crate) type Getter<T> = Box<dyn Fn(&Scope) -> T + Send + Sync>;
pub(crate) type Setter<T> = Box<dyn Fn(T, &Scope) + Send + Sync>;

struct DerivedState<T> {
    value: Option<T>,
    stale: bool,
}

pub(crate) struct DerivedCell<T> {
    getter: Getter<T>,
    setter: Option<Setter<T>>,
    state: Mutex<DerivedState<T>>,
    emitter: Emitter,
}

impl<T> DerivedCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// `owner` is the signal this cell lives in; the internal emitter calls
    /// back into it when an input changes.
    pub(crate) fn new(owner: Weak<SignalInner<T>>, getter: Getter<T>, setter: Option<Setter<T>>) -> Self {
        let emitter = Emitter::derived(move || {
            if let Some(inner) = owner.upgrade() {
                inner.react();
            }
        });

        Self {
            getter,
            setter,
            state: Mutex::new(DerivedState {
                value: None,
                stale: true,
            }),
            emitter,
        }
    }

    pub(crate) fn is_writable(&self) -> bool {
        self.setter.is_some()
    }

    #[cfg(test)]
    pub(crate) fn is_stale(&self) -> bool {
        self.state.lock().stale
    }

    #[cfg(test)]
    pub(crate) fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    pub(crate) fn read(&self) -> T {
        {
            let state = self.state.lock();
            if !state.stale {
                if let Some(value) = &state.value {
                    return value.clone();
                }
            }
        }

        let scope = self.emitter.create();
        let computed = (self.getter)(&scope);

        let mut state = self.state.lock();
        if !state.stale {
            // A nested read refreshed the cache while the getter ran.
            if let Some(value) = &state.value {
                return value.clone();
            }
        }
        state.value = Some(computed.clone());
        state.stale = false;
        computed
    }

    pub(crate) fn write(&self, value: T, listeners: &ListenerSet) {
        queue::enqueue(|| {
            if let Some(setter) = &self.setter {
                setter(value, &Scope::untracked());
            }
            queue::push(listeners);
        })
    }

    /// Called from the internal emitter once an input has changed and the
    /// emitter has been invalidated.
    ///
    /// The emitter is already detached at this point, so the cell stays
    /// stale until the equal path has re-subscribed. A getter that panics
    /// leaves it stale and the next read recomputes from scratch.
    pub(crate) fn react(&self, equal: &Equal<T>, listeners: &ListenerSet) {
        let was_fresh = !std::mem::replace(&mut self.state.lock().stale, true);
        let next = (self.getter)(&Scope::untracked());

        let changed = {
            let state = self.state.lock();
            match &state.value {
                Some(current) if was_fresh => !equal.eq(current, &next),
                _ => true,
            }
        };

        if changed {
            queue::push(listeners);
        } else {
            let scope = self.emitter.create();
            let _ = (self.getter)(&scope);
            self.state.lock().stale = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::reactive::{Emitter, Equal, Scope, Signal, STATIC_SCOPE};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counting_emitter(count: &Arc<AtomicI32>) -> Emitter {
        let count = count.clone();
        Emitter::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// A derived signal over `source` that counts getter invocations.
    fn doubled(source: &Signal<i32>, calls: &Arc<AtomicI32>) -> Signal<i32> {
        let source = source.clone();
        let calls = calls.clone();
        Signal::derive(move |scope: &Scope| {
            calls.fetch_add(1, Ordering::SeqCst);
            source.read(scope) * 2
        })
    }

    #[test]
    fn derived_computes_on_first_read() {
        let calls = Arc::new(AtomicI32::new(0));
        let source = Signal::new(1);
        let derived = doubled(&source, &calls);

        assert!(derived.is_derived());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(derived.derived_cell().is_some_and(|cell| cell.is_stale()));

        assert_eq!(derived.get_untracked(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(derived.derived_cell().is_some_and(|cell| !cell.is_stale()));
    }

    #[test]
    fn derived_caches_between_invalidations() {
        let calls = Arc::new(AtomicI32::new(0));
        let source = Signal::new(1);
        let derived = doubled(&source, &calls);

        for _ in 0..5 {
            assert_eq!(derived.get_untracked(), 2);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn derived_subscribes_to_getter_inputs() {
        let calls = Arc::new(AtomicI32::new(0));
        let source = Signal::new(1);
        let derived = doubled(&source, &calls);

        derived.get_untracked();
        assert_eq!(source.listener_count(), 1);
        let emitter = derived.derived_cell().map(|cell| cell.emitter().clone());
        assert!(emitter.is_some_and(|e| e.is_derived() && e.attachment_count() == 1));
    }

    #[test]
    fn derived_recomputes_after_upstream_change() {
        let calls = Arc::new(AtomicI32::new(0));
        let source = Signal::new(1);
        let derived = doubled(&source, &calls);
        assert_eq!(derived.get_untracked(), 2);

        source.set(5);
        // One untracked recompute to compare against the cache.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(derived.derived_cell().is_some_and(|cell| cell.is_stale()));

        assert_eq!(derived.get_untracked(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(derived.get_untracked(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn derived_notifies_downstream_once() {
        let calls = Arc::new(AtomicI32::new(0));
        let count = Arc::new(AtomicI32::new(0));
        let source = Signal::new(1);
        let derived = doubled(&source, &calls);
        let emitter = counting_emitter(&count);

        derived.read(&emitter.create());
        source.set(2);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(derived.get_untracked(), 4);
    }

    #[test]
    fn equal_recompute_stops_propagation() {
        let count = Arc::new(AtomicI32::new(0));
        let source = Signal::new(4);
        let is_even = Signal::derive({
            let source = source.clone();
            move |scope| source.read(scope) % 2 == 0
        });
        let emitter = counting_emitter(&count);

        assert!(is_even.read(&emitter.create()));
        source.set(6);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        // Still subscribed upstream, so the next real change gets through.
        assert_eq!(source.listener_count(), 1);
        assert_eq!(is_even.listener_count(), 1);

        source.set(7);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!is_even.get_untracked());
    }

    #[test]
    fn chained_derived_settles_before_consumers() {
        let base = Signal::new(2);
        let doubled = Signal::derive({
            let base = base.clone();
            move |scope| base.read(scope) * 2
        });
        let quadrupled = Signal::derive({
            let doubled = doubled.clone();
            move |scope| doubled.read(scope) * 2
        });

        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();
        let quadrupled_clone = quadrupled.clone();
        let emitter = Emitter::new(move || {
            seen_clone.store(quadrupled_clone.get_untracked(), Ordering::SeqCst);
        });

        assert_eq!(quadrupled.read(&emitter.create()), 8);
        base.set(5);
        assert_eq!(seen.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn getter_without_inputs_keeps_first_value() {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let constant = Signal::derive(move |_| calls_clone.fetch_add(1, Ordering::SeqCst));

        assert_eq!(constant.get_untracked(), 0);
        assert_eq!(constant.get_untracked(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn writable_derived_forwards_to_setter() {
        let source = Signal::new(3);
        let celsius = Signal::derive_writable(
            {
                let source = source.clone();
                move |scope| source.read(scope) * 10
            },
            {
                let source = source.clone();
                move |value: i32, scope: &Scope| {
                    assert!(!scope.is_tracked());
                    source.set(value / 10);
                }
            },
        );

        assert!(celsius.is_writable());
        celsius.set(70);
        assert_eq!(source.get_untracked(), 7);
        assert_eq!(celsius.get_untracked(), 70);
    }

    #[test]
    fn derived_write_always_emits() {
        let count = Arc::new(AtomicI32::new(0));
        let emitter = counting_emitter(&count);
        let derived = Signal::derive_writable(|_| 1, |_: i32, _: &Scope| {});

        derived.read(&emitter.create());
        derived.set(1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Read-only derived signals emit too.
        let read_only = Signal::derive(|_| 1);
        read_only.read(&emitter.create());
        read_only.set(2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(read_only.get_untracked(), 1);
    }

    #[test]
    fn deep_equality_keeps_cached_reference() {
        #[derive(Debug, PartialEq)]
        struct View {
            name: String,
        }

        let name = Signal::new("ada".to_string());
        let age = Signal::new(36);
        let view = Signal::derive_with_equal(
            {
                let (name, age) = (name.clone(), age.clone());
                move |scope| {
                    let _ = age.read(scope);
                    Arc::new(View { name: name.read(scope) })
                }
            },
            Equal::new(|a: &Arc<View>, b: &Arc<View>| a == b),
        );

        let count = Arc::new(AtomicI32::new(0));
        let emitter = counting_emitter(&count);
        let first = view.read(&emitter.create());

        age.set(37);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(Arc::ptr_eq(&first, &view.read(&STATIC_SCOPE)));
    }
}
