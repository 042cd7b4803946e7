//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its computation and caches the result.
//!
//! 2. When accessed again, if no dependencies have fired, returns the cache.
//!
//! 3. When a dependency fires, the runtime marks the memo "maybe dirty" and
//!    the memo forwards the notification to its own dependents.
//!
//! 4. On next access, the memo recomputes and becomes clean again.
//!
//! A memo is therefore both a subscriber (of what it reads) and a source
//! (for whoever reads it).

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::id::{SourceId, SubscriberId};
use super::runtime::{Reactive, ReactiveHandle, Runtime};

/// Dirty state for a memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoState {
    /// The cached value is up-to-date.
    Clean,

    /// A dependency fired since the last computation.
    MaybeDirty,

    /// The memo definitely needs to recompute.
    Dirty,
}

struct MemoInner<T> {
    id: SourceId,
    subscriber_id: SubscriberId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    value: RwLock<Option<T>>,
    state: RwLock<MemoState>,
    /// Sources read during the last computation.
    dependencies: RwLock<HashSet<SourceId>>,
}

impl<T> Reactive for MemoInner<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark_maybe_dirty(&self) {
        let became_dirty = {
            let mut state = self.state.write();
            let was_clean = *state == MemoState::Clean;
            if was_clean {
                *state = MemoState::MaybeDirty;
            }
            was_clean
        };
        if became_dirty {
            Runtime::notify_source_change(self.id);
        }
    }

    fn schedule(&self) {}

    fn is_eager(&self) -> bool {
        false
    }
}

/// A cached derived value that recomputes only when dependencies change.
///
/// # Example
///
/// ```rust
/// use lattice_store::reactive::{Memo, Signal};
///
/// let count = Signal::new(2);
/// let source = count.clone();
/// let doubled = Memo::new(move || source.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    inner: Arc<MemoInner<T>>,
    _handle: Arc<ReactiveHandle>,
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a new memo with the given computation function.
    ///
    /// The computation is not run immediately. It runs on first access.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let inner = Arc::new(MemoInner {
            id: SourceId::new(),
            subscriber_id: SubscriberId::new(),
            compute: Box::new(compute),
            value: RwLock::new(None),
            state: RwLock::new(MemoState::Dirty),
            dependencies: RwLock::new(HashSet::new()),
        });
        let handle = Runtime::register(inner.clone());

        Self {
            inner,
            _handle: Arc::new(handle),
        }
    }

    /// Get the memo's source ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the subscriber ID for this memo.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Get the current value, recomputing if necessary.
    pub fn get(&self) -> T {
        if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
            ReactiveContext::track_dependency(self.inner.id);
            Runtime::add_dependency(self.inner.id, subscriber_id);
        }

        if self.state() == MemoState::Clean {
            if let Some(value) = self.inner.value.read().clone() {
                return value;
            }
        }
        self.recompute()
    }

    /// Mark the memo as potentially needing recomputation.
    pub fn mark_maybe_dirty(&self) {
        self.inner.mark_maybe_dirty();
    }

    /// Mark the memo as definitely needing recomputation.
    pub fn mark_dirty(&self) {
        *self.inner.state.write() = MemoState::Dirty;
    }

    fn recompute(&self) -> T {
        Runtime::clear_dependencies(self.inner.subscriber_id);

        let (new_value, new_deps) = {
            let _ctx = ReactiveContext::enter(self.inner.subscriber_id);
            let value = (self.inner.compute)();
            (value, ReactiveContext::get_dependencies())
        };

        *self.inner.dependencies.write() = new_deps.into_iter().collect();
        *self.inner.value.write() = Some(new_value.clone());
        *self.inner.state.write() = MemoState::Clean;

        new_value
    }

    /// Get the current dirty state.
    pub fn state(&self) -> MemoState {
        *self.inner.state.read()
    }

    /// Number of sources read during the last computation.
    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.read().len()
    }

    /// Number of computations currently depending on this memo.
    pub fn dependent_count(&self) -> usize {
        Runtime::dependent_count(self.inner.id)
    }

    /// Check if the memo has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _handle: Arc::clone(&self._handle),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .field("dependent_count", &self.dependent_count())
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
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn memo_computes_on_first_access() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let memo = Memo::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert!(!memo.has_value());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert_eq!(memo.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(memo.has_value());

        // Cached while clean
        assert_eq!(memo.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn memo_recomputes_after_signal_fires() {
        let signal = Signal::new(3);
        let source = signal.clone();
        let memo = Memo::new(move || source.get() + 1);

        assert_eq!(memo.get(), 4);
        assert_eq!(memo.dependency_count(), 1);

        signal.set(10);
        assert_eq!(memo.state(), MemoState::MaybeDirty);
        assert_eq!(memo.get(), 11);
        assert_eq!(memo.state(), MemoState::Clean);
    }

    #[test]
    fn memo_state_transitions() {
        let memo = Memo::new(|| 42);

        assert_eq!(memo.state(), MemoState::Dirty);

        memo.get();
        assert_eq!(memo.state(), MemoState::Clean);

        memo.mark_maybe_dirty();
        assert_eq!(memo.state(), MemoState::MaybeDirty);

        memo.mark_dirty();
        assert_eq!(memo.state(), MemoState::Dirty);

        memo.get();
        assert_eq!(memo.state(), MemoState::Clean);
    }

    #[test]
    fn memo_clone_shares_state() {
        let memo1 = Memo::new(|| 42);
        assert_eq!(memo1.get(), 42);

        let memo2 = memo1.clone();
        assert_eq!(memo1.id(), memo2.id());
        assert!(memo2.has_value());

        memo1.mark_dirty();
        assert_eq!(memo2.state(), MemoState::Dirty);
    }
}
