//! Error types for the reactive engine.
//!
//! Almost nothing in the engine fails. Reads and writes through any scope
//! are legal, and a panicking getter or setter propagates to the caller.
//! These errors exist only for the explicit `try_*` entry points.

use thiserror::Error;

use super::signal::SignalId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// `try_set` on a derived signal constructed without a setter.
    #[error("{0} is a read-only derived signal")]
    ReadOnly(SignalId),

    /// A getter, setter or emit callback panicked inside `try_batch`.
    #[error("update pass aborted: {0}")]
    Aborted(String),
}

pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
