//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal is written, all subscribers are notified.
//!
//! 3. Notifications trigger re-execution of dependent computations, or
//!    queue it when a batch is open.
//!
//! # Equality
//!
//! Signals created with [`Signal::new`] have equality comparison disabled:
//! every write propagates, even when the new payload equals the old one.
//! This is what store cells rely on, since their payload is a notification
//! token rather than the source of truth. [`Signal::new_deduped`] opts into
//! skipping writes of an equal payload.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::id::{SourceId, SubscriberId};
use super::runtime::Runtime;

type Notifier = Arc<dyn Fn() + Send + Sync>;

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use lattice_store::reactive::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: SourceId,

    value: Arc<RwLock<T>>,

    /// Subscribers that read this signal inside a tracking context.
    subscribers: Arc<RwLock<HashSet<SubscriberId>>>,

    /// Listener callbacks registered through [`Signal::subscribe`].
    notifiers: Arc<RwLock<Vec<(SubscriberId, Notifier)>>>,

    /// `None` means every write propagates.
    equals: Option<fn(&T, &T) -> bool>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with equality comparison disabled.
    pub fn new(value: T) -> Self {
        Self {
            id: SourceId::new(),
            value: Arc::new(RwLock::new(value)),
            subscribers: Arc::new(RwLock::new(HashSet::new())),
            notifiers: Arc::new(RwLock::new(Vec::new())),
            equals: None,
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        self.track();
        self.value.read().clone()
    }

    /// Read the current value by reference, tracking like [`Signal::get`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        let value = self.value.read();
        f(&*value)
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.value.read().clone()
    }

    fn track(&self) {
        if let Some(subscriber_id) = ReactiveContext::current_subscriber() {
            ReactiveContext::track_dependency(self.id);
            self.subscribers.write().insert(subscriber_id);
            Runtime::add_dependency(self.id, subscriber_id);
        }
    }

    /// Set a new value and notify subscribers.
    pub fn set(&self, value: T) {
        if let Some(equals) = self.equals {
            if equals(&*self.value.read(), &value) {
                return;
            }
        }

        *self.value.write() = value;

        self.notify_subscribers();
        Runtime::notify_source_change(self.id);
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let current = self.value.read();
            f(&*current)
        };
        self.set(new_value);
    }

    /// Register a listener callback, invoked on every propagating write.
    pub fn subscribe<F>(&self, subscriber_id: SubscriberId, notify: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribers.write().insert(subscriber_id);
        self.notifiers.write().push((subscriber_id, Arc::new(notify)));
    }

    /// Remove a subscriber.
    pub fn unsubscribe(&self, subscriber_id: SubscriberId) {
        self.subscribers.write().remove(&subscriber_id);
        self.notifiers.write().retain(|(id, _)| *id != subscriber_id);
    }

    fn notify_subscribers(&self) {
        // Snapshot so a listener may subscribe or unsubscribe while running.
        let notifiers: Vec<Notifier> = self
            .notifiers
            .read()
            .iter()
            .map(|(_, notify)| Arc::clone(notify))
            .collect();
        for notify in notifiers {
            notify();
        }
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    /// Create a signal that skips writes of a payload equal to the current one.
    pub fn new_deduped(value: T) -> Self {
        let equals: fn(&T, &T) -> bool = |a, b| a == b;
        Self {
            equals: Some(equals),
            ..Self::new(value)
        }
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: Arc::clone(&self.value),
            subscribers: Arc::clone(&self.subscribers),
            notifiers: Arc::clone(&self.notifiers),
            equals: self.equals,
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counting_listener(signal: &Signal<i32>) -> Arc<AtomicI32> {
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        signal.subscribe(SubscriberId::new(), move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        calls
    }

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn equal_writes_propagate_by_default() {
        let signal = Signal::new(1);
        let calls = counting_listener(&signal);

        signal.set(1);
        signal.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deduped_signal_skips_equal_writes() {
        let signal = Signal::new_deduped(1);
        let calls = counting_listener(&signal);

        signal.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        signal.set(2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let subscriber_id = SubscriberId::new();
        signal.subscribe(subscriber_id, move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        signal.unsubscribe(subscriber_id);
        signal.set(2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn tracked_read_registers_subscriber() {
        let signal = Signal::new(0);
        let id = SubscriberId::new();

        signal.get();
        assert_eq!(signal.subscriber_count(), 0);

        {
            let _ctx = ReactiveContext::enter(id);
            signal.with(|v| *v);
            assert_eq!(ReactiveContext::get_dependencies(), vec![signal.id()]);
        }
        assert_eq!(signal.subscriber_count(), 1);
        assert_eq!(Runtime::dependent_count(signal.id()), 1);
        Runtime::clear_dependencies(id);
    }
}
