//! Mutation Gate & Transaction
//!
//! Writes through a view are only applied while the current thread's write
//! gate is open. [`transaction`] opens it inside a runtime batch, so every
//! dependent sees the net effect of the transaction once, after it closes.
//! The gate is closed by a guard before the batch flushes, also when the
//! update panics.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::cells::{self, CellKey};
use super::node::{Key, Node};
use super::path::Path;
use super::value::{StoreValue, Value};
use super::view::View;
use super::wrap::{unwrap_node, wrap};
use crate::error::{Error, Result};
use crate::reactive::Runtime;

thread_local! {
    static WRITING: Cell<bool> = const { Cell::new(false) };
}

/// Whether writes through views are currently applied on this thread.
pub fn is_writing() -> bool {
    WRITING.with(Cell::get)
}

struct WriteGate {
    previous: bool,
}

impl WriteGate {
    fn open() -> Self {
        Self {
            previous: WRITING.with(|writing| writing.replace(true)),
        }
    }
}

impl Drop for WriteGate {
    fn drop(&mut self) {
        WRITING.with(|writing| writing.set(self.previous));
    }
}

/// Run `f` with view writes enabled, batching every notification it causes.
///
/// A transaction opened inside another one joins it.
pub fn transaction<R>(f: impl FnOnce() -> R) -> R {
    Runtime::batch(|| {
        let _gate = WriteGate::open();
        f()
    })
}

/// Apply one write to `node` and fire the affected cells.
///
/// `key` must already be normalized for `node`. Writing the current value
/// again fires nothing. Any applied write, and any delete, fires the node's
/// shape cell, even when the set of keys did not change.
pub(crate) fn set_property(node: &Node, key: Key, value: Value, deleting: bool) {
    if node.is_frozen() {
        tracing::warn!(node = %node.id(), %key, "ignoring write to a frozen node");
        return;
    }

    let previous = node.get(key.clone());
    if !deleting && previous.as_ref() == Some(&value) {
        return;
    }
    let previous_len = node.list_len();

    let applied = if deleting {
        node.delete(&key)
    } else {
        node.write(&key, value)
    };
    if !applied {
        // A delete notifies structure readers even when nothing was there
        if deleting {
            fire_shape(node);
        }
        return;
    }
    tracing::trace!(node = %node.id(), %key, deleting, "applied store write");

    let Some(cells) = cells::existing_registry(node) else {
        return;
    };

    if let Some(cell) = cells.get(&CellKey::Prop(key.clone())) {
        cell.set(node.get(key.clone()));
    }

    if let (Some(before), Some(after)) = (previous_len, node.list_len()) {
        if before != after {
            // Indices dropped by a shrink, or padded by a write past the end
            for index in before.min(after)..before.max(after) {
                if key == Key::Index(index) {
                    continue;
                }
                if let Some(cell) = cells.get(&CellKey::Prop(Key::Index(index))) {
                    cell.set(node.get(index));
                }
            }
            cells
                .cell(CellKey::Prop(Key::Length), Some(Value::from(before)))
                .set(Some(Value::from(after)));
        }
    }

    if let Some(shape) = cells.get(&CellKey::Shape) {
        shape.set(None);
    }
}

fn fire_shape(node: &Node) {
    let shape = cells::existing_registry(node).and_then(|cells| cells.get(&CellKey::Shape));
    if let Some(shape) = shape {
        shape.set(None);
    }
}

/// Store settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Label used in tracing output.
    pub name: Option<String>,
}

impl StoreOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Create a store over `initial`.
///
/// Returns the read view and the setter through which all writes go.
/// Frozen input is copied, never mutated.
pub fn create_store(initial: Node) -> (View, SetStore) {
    create_store_with(initial, StoreOptions::default())
}

/// [`create_store`] with explicit options.
pub fn create_store_with(initial: Node, options: StoreOptions) -> (View, SetStore) {
    let raw = unwrap_node(&initial, &mut HashMap::new());
    let view = wrap(&raw);
    let name: Arc<str> = options.name.as_deref().unwrap_or("store").into();
    tracing::debug!(store = %name, node = %raw.id(), "created store");

    let setter = SetStore {
        view: view.clone(),
        name,
    };
    (view, setter)
}

/// The write half of a store.
#[derive(Clone)]
pub struct SetStore {
    view: View,
    name: Arc<str>,
}

impl SetStore {
    /// Run `f` against the store's view inside a transaction.
    ///
    /// ```rust
    /// use lattice_store::{create_store, Node};
    ///
    /// let (store, set_store) = create_store(Node::from_pairs([("count", 0)]));
    /// set_store.update(|s| s.set("count", 5));
    /// assert_eq!(store.get("count").and_then(|v| v.as_int()), Some(5));
    /// ```
    pub fn update<R>(&self, f: impl FnOnce(&View) -> R) -> R {
        let _span = tracing::debug_span!("store_update", store = %self.name).entered();
        transaction(|| f(&self.view))
    }

    /// Assign the property addressed by `path`.
    pub fn set_path(&self, path: &Path, value: impl Into<StoreValue>) -> Result<()> {
        let value = value.into();
        self.update(|root| {
            let (parent, key) = Self::resolve_parent(root, path)?;
            parent.set(key, value);
            Ok(())
        })
    }

    /// Delete the property addressed by `path`.
    pub fn delete_path(&self, path: &Path) -> Result<()> {
        self.update(|root| {
            let (parent, key) = Self::resolve_parent(root, path)?;
            parent.delete(key);
            Ok(())
        })
    }

    fn resolve_parent<'p>(root: &View, path: &'p Path) -> Result<(View, &'p Key)> {
        let (last, parents) = path.split_last().ok_or(Error::EmptyPath)?;
        let parent = match root.get_path(&parents)? {
            StoreValue::View(view) => view,
            StoreValue::Value(value) => {
                return Err(Error::NotAggregate {
                    path: parents.to_string(),
                    found: value.type_name(),
                })
            }
        };
        Ok((parent, last))
    }

    /// The view this setter writes through.
    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetStore")
            .field("name", &self.name)
            .field("view", &self.view)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_is_closed_by_default_and_restored() {
        assert!(!is_writing());
        transaction(|| {
            assert!(is_writing());
            transaction(|| assert!(is_writing()));
            assert!(is_writing());
        });
        assert!(!is_writing());
    }

    #[test]
    fn gate_closes_after_panic() {
        let result = std::panic::catch_unwind(|| transaction(|| panic!("update failed")));
        assert!(result.is_err());
        assert!(!is_writing());
        assert!(!Runtime::is_batching());
    }

    #[test]
    fn gate_is_closed_before_batch_flushes() {
        use crate::reactive::{Effect, Signal};
        use std::sync::atomic::{AtomicBool, Ordering};

        let signal = Signal::new(0);
        let saw_open_gate = Arc::new(AtomicBool::new(false));

        let source = signal.clone();
        let saw = saw_open_gate.clone();
        let _effect = Effect::new(move || {
            source.get();
            if is_writing() {
                saw.store(true, Ordering::SeqCst);
            }
        });

        transaction(|| signal.set(1));
        assert!(!saw_open_gate.load(Ordering::SeqCst));
    }

    #[test]
    fn idempotent_write_fires_nothing() {
        let node = Node::from_pairs([("a", 1)]);
        let cell = cells::registry_for(&node).cell(CellKey::Prop(Key::from("a")), Some(Value::Int(1)));
        let shape = cells::registry_for(&node).cell(CellKey::Shape, None);

        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        for signal in [&cell, &shape] {
            let fired = fired.clone();
            signal.subscribe(crate::reactive::SubscriberId::new(), move || {
                fired.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        }

        set_property(&node, Key::from("a"), Value::Int(1), false);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 0);

        set_property(&node, Key::from("a"), Value::Int(2), false);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(cell.get_untracked(), Some(Value::Int(2)));
    }

    #[test]
    fn shrinking_a_list_fires_removed_indices_and_length() {
        let node = Node::from_values([1, 2, 3]);
        let registry = cells::registry_for(&node);
        let last = registry.cell(CellKey::Prop(Key::Index(2)), Some(Value::Int(3)));

        set_property(&node, Key::Length, Value::Int(1), false);

        assert_eq!(last.get_untracked(), None);
        let length = registry.get(&CellKey::Prop(Key::Length)).unwrap();
        assert_eq!(length.get_untracked(), Some(Value::Int(1)));
    }

    #[test]
    fn writing_past_the_end_refreshes_padding() {
        let node = Node::from_values([1]);
        let registry = cells::registry_for(&node);
        let gap = registry.cell(CellKey::Prop(Key::Index(1)), None);

        set_property(&node, Key::Index(2), Value::Int(3), false);

        assert_eq!(gap.get_untracked(), Some(Value::Null));
        let length = registry.get(&CellKey::Prop(Key::Length)).unwrap();
        assert_eq!(length.get_untracked(), Some(Value::Int(3)));
    }

    #[test]
    fn deleting_a_missing_key_fires_shape() {
        let node = Node::from_pairs([("a", 1)]);
        let shape = cells::registry_for(&node).cell(CellKey::Shape, None);

        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = fired.clone();
        shape.subscribe(crate::reactive::SubscriberId::new(), move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        set_property(&node, Key::from("missing"), Value::Null, true);
        assert_eq!(fired.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(node.keys(), vec![Key::from("a")]);
    }

    #[test]
    fn frozen_after_wrapping_ignores_writes() {
        let node = Node::from_pairs([("a", 1)]);
        node.freeze();
        set_property(&node, Key::from("a"), Value::Int(2), false);
        assert_eq!(node.get("a"), Some(Value::Int(1)));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: StoreOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, StoreOptions::default());

        let named: StoreOptions = serde_json::from_str(r#"{"name": "todos"}"#).unwrap();
        assert_eq!(named, StoreOptions::default().with_name("todos"));
    }
}
