//! Reactive Primitives
//!
//! This module implements the reactive engine: signals, derived signals,
//! scopes, emitters and the update queue that orders propagation.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A [`Signal`] is a reactive cell. A direct signal stores its value; a
//! derived signal computes it from other signals and caches the result.
//! Every read goes through a [`Scope`]. If the scope is tracked, the read
//! subscribes the scope's emitter to the signal.
//!
//! ## Emitters
//!
//! An [`Emitter`] is the identity of one subscriber. It remembers the
//! signals it is attached to so it can detach from all of them at once.
//! Consumers usually hold one through a [`Monitor`].
//!
//! ## Update passes
//!
//! Writes run inside an update pass (see [`batch`]). Derived signals settle
//! synchronously during the pass; every other emitter fires exactly once,
//! after the pass completes.
//!
//! # Implementation Notes
//!
//! Subscriptions are stored as weak handles in a per-signal slot table,
//! so nothing a signal holds keeps a consumer alive. The pending update
//! queue is thread-local: each thread runs its own cooperative passes.

mod derived;
mod direct;
mod emitter;
mod equal;
mod error;
mod listeners;
mod monitor;
mod queue;
mod signal;

pub use emitter::{Emitter, EmitterId, Scope, STATIC_SCOPE};
pub use equal::Equal;
pub use error::{ReactiveError, Result};
pub use monitor::{subscribe, Disconnect, Monitor};
pub use queue::{batch, is_batching, try_batch, untrack};
pub use signal::{Signal, SignalId};
