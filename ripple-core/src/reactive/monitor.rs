//! Monitors
//!
//! A [`Monitor`] is the consumer-facing end of the engine: the piece a UI
//! binding or a form layer holds on to. It owns a non-derived emitter and
//! exposes the two things such a consumer needs:
//!
//! - `create_scope()` to start a read-cycle (e.g. before each render).
//! - `connect(callback)` to hear about invalidations.
//!
//! [`subscribe`] builds the common case on top: run a function now, and
//! re-run it with a fresh scope every time something it read changes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::emitter::{Emitter, Scope};
use super::queue;

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Connection {
    /// Bumped by every `connect`, so an old `Disconnect` cannot tear down a
    /// newer connection.
    token: u64,
    callback: Option<Callback>,
}

struct MonitorInner {
    emitter: Emitter,
    connection: Arc<Mutex<Connection>>,
    tokens: AtomicU64,
}

/// A caller-owned emitter with a replaceable invalidation callback.
#[derive(Clone)]
pub struct Monitor(Arc<MonitorInner>);

impl Monitor {
    pub fn new() -> Self {
        let connection = Arc::new(Mutex::new(Connection::default()));
        let emitter = Emitter::new({
            let connection = Arc::clone(&connection);
            move || {
                // Clone the callback out so it runs without the lock held.
                let callback = connection.lock().callback.clone();
                if let Some(callback) = callback {
                    callback();
                }
            }
        });

        Self(Arc::new(MonitorInner {
            emitter,
            connection,
            tokens: AtomicU64::new(0),
        }))
    }

    /// Start a new read-cycle. Subscriptions from the previous cycle are
    /// dropped.
    pub fn create_scope(&self) -> Scope {
        self.0.emitter.create()
    }

    pub fn emitter(&self) -> &Emitter {
        &self.0.emitter
    }

    pub fn is_connected(&self) -> bool {
        self.0.connection.lock().callback.is_some()
    }

    /// Register `on_invalidate`, replacing any previous callback. It runs
    /// once per update pass in which something read through this monitor's
    /// current scope changed.
    pub fn connect<F>(&self, on_invalidate: F) -> Disconnect
    where
        F: Fn() + Send + Sync + 'static,
    {
        let token = self.0.tokens.fetch_add(1, Ordering::Relaxed) + 1;
        *self.0.connection.lock() = Connection {
            token,
            callback: Some(Arc::new(on_invalidate)),
        };
        trace!(emitter = %self.0.emitter.id(), token, "monitor connected");

        Disconnect {
            monitor: Some(self.clone()),
            token,
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("emitter", &self.0.emitter)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Teardown handle returned by [`Monitor::connect`] and [`subscribe`].
///
/// Disconnecting (explicitly or by dropping the handle) invalidates the
/// emitter and stops further callbacks.
#[must_use = "dropping a Disconnect immediately ends the subscription"]
pub struct Disconnect {
    monitor: Option<Monitor>,
    token: u64,
}

impl Disconnect {
    pub fn disconnect(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(monitor) = self.monitor.take() else {
            return;
        };
        {
            let mut connection = monitor.0.connection.lock();
            if connection.token != self.token {
                return;
            }
            connection.callback = None;
        }
        monitor.0.emitter.invalidate();
        trace!(emitter = %monitor.0.emitter.id(), token = self.token, "monitor disconnected");
    }
}

impl Drop for Disconnect {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl fmt::Debug for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disconnect")
            .field("active", &self.monitor.is_some())
            .field("token", &self.token)
            .finish()
    }
}

/// Run `f` now with a tracked scope, and again with a fresh scope whenever
/// a signal it read changes.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{subscribe, Signal};
///
/// let count = Signal::new(0);
/// let subscription = subscribe({
///     let count = count.clone();
///     move |scope| println!("count = {}", count.read(scope))
/// });
///
/// count.set(1); // prints "count = 1"
/// subscription.disconnect();
/// count.set(2); // prints nothing
/// ```
pub fn subscribe<F>(f: F) -> Disconnect
where
    F: Fn(&Scope) + Send + Sync + 'static,
{
    let monitor = Monitor::new();
    let run = Arc::new(f);

    let weak = Arc::downgrade(&monitor.0);
    let disconnect = monitor.connect({
        let run = Arc::clone(&run);
        move || {
            if let Some(inner) = weak.upgrade() {
                run(&inner.emitter.create());
            }
        }
    });

    queue::batch(|| run(&monitor.create_scope()));
    disconnect
}
