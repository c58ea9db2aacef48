//! Ripple Core
//!
//! This crate provides a fine-grained reactive state engine. It implements:
//!
//! - Direct and derived signals with pluggable equality
//! - Automatic dependency tracking through per-read scopes
//! - Batched update passes that settle derived signals before notifying
//!   consumers, and notify each consumer exactly once
//!
//! It is the substrate for UI bindings and form layers, which sit on top
//! of [`reactive::Monitor`] and [`reactive::subscribe`].
//!
//! # Example
//!
//! ```rust
//! use ripple_core::reactive::{batch, subscribe, Signal};
//!
//! // Create signals
//! let first = Signal::new("Ada".to_string());
//! let last = Signal::new("Lovelace".to_string());
//!
//! // Create a derived value
//! let full = Signal::derive({
//!     let (first, last) = (first.clone(), last.clone());
//!     move |scope| format!("{} {}", first.read(scope), last.read(scope))
//! });
//!
//! // Subscribe to it
//! let _subscription = subscribe({
//!     let full = full.clone();
//!     move |scope| println!("name: {}", full.read(scope))
//! });
//!
//! // Update both signals; the subscriber runs once
//! batch(|| {
//!     first.set("Grace".to_string());
//!     last.set("Hopper".to_string());
//! });
//! // prints: "name: Grace Hopper"
//! ```

pub mod reactive;
