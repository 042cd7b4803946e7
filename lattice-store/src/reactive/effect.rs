//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency fires, the runtime runs the effect again, or
//!    queues it until the enclosing batch closes.
//!
//! 3. Before re-running, the effect clears its old dependencies and tracks
//!    new ones during execution.
//!
//! # Differences from Memo
//!
//! - Memos return a value; effects do not.
//! - Memos are lazy (compute on access); effects are eager (run when deps change).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::id::{SourceId, SubscriberId};
use super::runtime::{Reactive, ReactiveHandle, Runtime};

struct EffectInner {
    subscriber_id: SubscriberId,
    run: Box<dyn Fn() + Send + Sync>,
    dependencies: RwLock<HashSet<SourceId>>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        Runtime::clear_dependencies(self.subscriber_id);

        let new_deps = {
            let _ctx = ReactiveContext::enter(self.subscriber_id);
            (self.run)();
            ReactiveContext::get_dependencies()
        };

        *self.dependencies.write() = new_deps.into_iter().collect();
        self.run_count.fetch_add(1, Ordering::SeqCst);
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_maybe_dirty(&self) {}

    fn schedule(&self) {
        self.execute();
    }

    fn is_eager(&self) -> bool {
        true
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Clones share the same computation. It stays registered until the last
/// clone is dropped or [`Effect::dispose`] is called.
///
/// # Example
///
/// ```rust
/// use lattice_store::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let source = count.clone();
/// let effect = Effect::new(move || {
///     let _ = source.get();
/// });
///
/// count.set(5);
/// assert_eq!(effect.run_count(), 2);
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
    _handle: Arc<ReactiveHandle>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it immediately.
    ///
    /// It has no dependencies until [`Effect::execute`] is first called.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new(EffectInner {
            subscriber_id: SubscriberId::new(),
            run: Box::new(run),
            dependencies: RwLock::new(HashSet::new()),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        let handle = Runtime::register(inner.clone());

        Self {
            inner,
            _handle: Arc::new(handle),
        }
    }

    /// Get the subscriber ID for this effect.
    pub fn id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Execute the effect function within a tracking context.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Run the effect again, as the runtime does when a dependency fires.
    pub fn schedule(&self) {
        self.inner.schedule();
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        Runtime::clear_dependencies(self.inner.subscriber_id);
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of distinct sources read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.read().len()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _handle: Arc::clone(&self._handle),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let _effect = Effect::new(move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let effect = Effect::new_lazy(|| {});
        assert_eq!(effect.run_count(), 0);

        effect.execute();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_dependency_fires() {
        let signal = Signal::new(0);
        let seen = Arc::new(AtomicI32::new(-1));

        let source = signal.clone();
        let seen_clone = seen.clone();
        let effect = Effect::new(move || {
            seen_clone.store(source.get(), Ordering::SeqCst);
        });
        assert_eq!(effect.dependency_count(), 1);

        signal.set(7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn batched_writes_run_effect_once() {
        let a = Signal::new(0);
        let b = Signal::new(0);

        let (ra, rb) = (a.clone(), b.clone());
        let effect = Effect::new(move || {
            let _ = ra.get() + rb.get();
        });

        Runtime::batch(|| {
            a.set(1);
            b.set(2);
            a.set(3);
        });
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let source = signal.clone();
        let effect = Effect::new(move || {
            source.get();
        });

        effect.dispose();
        assert!(effect.is_disposed());

        signal.set(1);
        effect.schedule();
        effect.execute();
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn dropped_effect_stops_running() {
        let signal = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));

        let source = signal.clone();
        let run_count_clone = run_count.clone();
        let effect = Effect::new(move || {
            source.get();
            run_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        drop(effect);

        signal.set(1);
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {});
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());

        effect1.execute();
        assert_eq!(effect2.run_count(), 2);

        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
