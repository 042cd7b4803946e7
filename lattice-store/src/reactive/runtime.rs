//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency registry and decides when dependents run.
//!
//! # How It Works
//!
//! 1. Memos and effects register with the runtime when created.
//!
//! 2. When a computation reads a source, the runtime records the edge
//!    `source -> subscriber`.
//!
//! 3. When a source fires, the runtime:
//!    a. Finds all registered dependents
//!    b. Marks them as "maybe dirty"
//!    c. Runs effects, or queues them if a batch is open
//!    d. Memos are lazy - they recompute on next access
//!
//! # Batching
//!
//! [`Runtime::batch`] defers effects until the outermost batch on the
//! current thread closes. Each queued effect runs once per wave no matter
//! how many of its sources fired.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::id::{SourceId, SubscriberId};

/// A trait for types that can be notified when dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Mark this reactive value as potentially needing update.
    fn mark_maybe_dirty(&self);

    /// Run this reactive value (effects only).
    fn schedule(&self);

    /// Check if this reactive value is an effect (eager) or memo (lazy).
    fn is_eager(&self) -> bool;
}

/// Handle to a registered reactive value.
///
/// Dropping this handle unregisters the reactive value from the runtime.
pub struct ReactiveHandle {
    subscriber_id: SubscriberId,
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.subscriber_id);
    }
}

/// The global reactive runtime.
pub struct Runtime;

type Registry = RwLock<HashMap<SubscriberId, Weak<dyn Reactive>>>;
type SourceSubscribers = RwLock<HashMap<SourceId, IndexSet<SubscriberId>>>;

// Weak references so the registry never keeps a computation alive.
static REGISTRY: OnceLock<Registry> = OnceLock::new();
static SOURCE_SUBSCRIBERS: OnceLock<SourceSubscribers> = OnceLock::new();

fn get_registry() -> &'static Registry {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn get_source_subscribers() -> &'static SourceSubscribers {
    SOURCE_SUBSCRIBERS.get_or_init(|| RwLock::new(HashMap::new()))
}

#[derive(Default)]
struct BatchState {
    depth: usize,
    pending: IndexMap<SubscriberId, Arc<dyn Reactive>>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

struct BatchGuard;

impl BatchGuard {
    fn enter() -> Self {
        BATCH.with(|batch| batch.borrow_mut().depth += 1);
        Self
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let outermost = BATCH.with(|batch| {
            let mut batch = batch.borrow_mut();
            batch.depth -= 1;
            batch.depth == 0
        });
        if !outermost {
            return;
        }

        if std::thread::panicking() {
            let discarded = BATCH.with(|batch| std::mem::take(&mut batch.borrow_mut().pending));
            tracing::debug!(count = discarded.len(), "batch aborted, dropping queued effects");
            drop(discarded);
        } else {
            Runtime::flush();
        }
    }
}

impl Runtime {
    /// Register a reactive value with the runtime.
    ///
    /// Returns a handle that unregisters the value when dropped.
    pub fn register(reactive: Arc<dyn Reactive>) -> ReactiveHandle {
        let id = reactive.subscriber_id();

        get_registry().write().insert(id, Arc::downgrade(&reactive));

        ReactiveHandle { subscriber_id: id }
    }

    fn unregister(id: SubscriberId) {
        get_registry().write().remove(&id);
        Self::clear_dependencies(id);
    }

    /// Record that a subscriber depends on a source.
    ///
    /// Called automatically when a source is read within a reactive context.
    pub fn add_dependency(source_id: SourceId, subscriber_id: SubscriberId) {
        get_source_subscribers()
            .write()
            .entry(source_id)
            .or_default()
            .insert(subscriber_id);
    }

    /// Remove all dependencies for a subscriber.
    ///
    /// Called before re-running a computation to clear stale dependencies.
    pub fn clear_dependencies(subscriber_id: SubscriberId) {
        let mut subscribers = get_source_subscribers().write();
        subscribers.retain(|_, subs| {
            subs.shift_remove(&subscriber_id);
            !subs.is_empty()
        });
    }

    /// Number of subscribers currently recorded for a source.
    pub fn dependent_count(source_id: SourceId) -> usize {
        get_source_subscribers()
            .read()
            .get(&source_id)
            .map_or(0, IndexSet::len)
    }

    /// Notify all subscribers that a source fired.
    ///
    /// This is the core update propagation mechanism.
    pub fn notify_source_change(source_id: SourceId) {
        let subscriber_ids: Vec<SubscriberId> = {
            let subscribers = get_source_subscribers().read();
            match subscribers.get(&source_id) {
                Some(subs) => subs.iter().copied().collect(),
                None => return,
            }
        };

        // Upgrade under the lock, then release it before calling out: marking
        // a memo dirty notifies its own dependents recursively.
        let dependents: Vec<Arc<dyn Reactive>> = {
            let registry = get_registry().read();
            subscriber_ids
                .iter()
                .filter_map(|id| registry.get(id).and_then(Weak::upgrade))
                .collect()
        };

        let mut effects_to_run = Vec::new();
        for reactive in dependents {
            reactive.mark_maybe_dirty();
            if reactive.is_eager() {
                effects_to_run.push(reactive);
            }
        }

        if Self::is_batching() {
            BATCH.with(|batch| {
                let mut batch = batch.borrow_mut();
                for effect in effects_to_run {
                    batch.pending.entry(effect.subscriber_id()).or_insert(effect);
                }
            });
        } else {
            for effect in effects_to_run {
                effect.schedule();
            }
        }
    }

    /// Run `f`, deferring effects until the outermost batch closes.
    ///
    /// Effects queued inside the batch are discarded if `f` panics.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        let _guard = BatchGuard::enter();
        f()
    }

    /// Check if a batch is open on the current thread.
    pub fn is_batching() -> bool {
        BATCH.with(|batch| batch.borrow().depth > 0)
    }

    fn flush() {
        loop {
            let queued = BATCH.with(|batch| std::mem::take(&mut batch.borrow_mut().pending));
            if queued.is_empty() {
                break;
            }
            tracing::trace!(count = queued.len(), "flushing batched effects");
            for (_, effect) in queued {
                effect.schedule();
            }
        }
    }

    /// Get the current subscriber being tracked, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        ReactiveContext::current_subscriber()
    }

    /// Check if we're inside a reactive context.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_active()
    }
}
