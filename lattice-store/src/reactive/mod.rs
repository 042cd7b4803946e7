//! Reactive Primitives
//!
//! This module implements the signal substrate the store is built on:
//! signals, memos, effects, the tracking context and the batching runtime.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (such as a memo or effect), the signal
//! registers that context as a dependent. When the signal is written, all
//! dependents are notified.
//!
//! ## Memos
//!
//! A Memo is a derived value that caches its result. It re-evaluates only
//! when one of its dependencies fires.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! ## Batches
//!
//! [`Runtime::batch`] coalesces every notification raised inside it into a
//! single wave: each affected effect runs once, after the batch closes.
//!
//! # Implementation Notes
//!
//! The tracking context is a thread-local stack, so the "current
//! computation" is always restored by a guard rather than by hand.

mod context;
mod effect;
mod id;
mod memo;
mod runtime;
mod signal;

pub use context::{untracked, ReactiveContext};
pub use effect::Effect;
pub use id::{SourceId, SubscriberId};
pub use memo::{Memo, MemoState};
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use signal::Signal;
