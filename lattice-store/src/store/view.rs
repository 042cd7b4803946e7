//! Interception Contract
//!
//! A [`View`] is the transparent, identity-stable face of a raw node. Reads
//! behave like reads on the node, except that inside a tracking context they
//! lazily materialize a cell per property and subscribe to it. Writes and
//! deletes only take effect inside a transaction; outside one they are
//! silently ignored.
//!
//! The reserved markers of the data model map to methods: [`View::raw`]
//! returns the node, the view is its own handle, and [`View::track_self`]
//! subscribes to structural changes.

use std::fmt;
use std::sync::{Arc, Weak};

use super::cells::{self, CellKey};
use super::node::{Key, Node, PropertyDescriptor};
use super::path::Path;
use super::transaction::{self, set_property};
use super::value::{Accessor, StoreValue, Value};
use super::wrap::{unwrap, wrap};
use crate::error::{Error, Result};
use crate::reactive::ReactiveContext;

pub(crate) struct ViewInner {
    node: Node,
}

/// Tracked handle over a raw node. Clones are the same view.
#[derive(Clone)]
pub struct View {
    inner: Arc<ViewInner>,
}

impl View {
    pub(crate) fn bind(node: Node) -> Self {
        Self {
            inner: Arc::new(ViewInner { node }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ViewInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ViewInner> {
        Arc::downgrade(&self.inner)
    }

    /// The raw node behind this view. Never tracks.
    pub fn raw(&self) -> Node {
        self.inner.node.clone()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &View) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_list(&self) -> bool {
        self.inner.node.is_list()
    }

    /// Subscribe the active computation to structural changes of this node.
    pub fn track_self(&self) {
        cells::track_self(&self.inner.node);
    }

    /// Read a property.
    ///
    /// Nested maps and lists come back as views; accessors are evaluated
    /// against this view. Returns `None` for a missing property.
    pub fn get(&self, key: impl Into<Key>) -> Option<StoreValue> {
        let key = self.inner.node.normalize(key);
        self.read(&key).map(|value| self.resolve(value))
    }

    /// The raw value of a property, through its cell when one exists.
    fn read(&self, key: &Key) -> Option<Value> {
        let node = &self.inner.node;
        let cell_key = CellKey::Prop(key.clone());

        if let Some(cell) = cells::existing_registry(node).and_then(|cells| cells.get(&cell_key)) {
            return cell.get();
        }

        let value = node.get(key.clone());
        if ReactiveContext::is_active() && !matches!(value, Some(Value::Accessor(_))) {
            return cells::registry_for(node).cell(cell_key, value).get();
        }
        value
    }

    fn resolve(&self, value: Value) -> StoreValue {
        let value = match value {
            Value::Accessor(getter) => getter.call(self),
            other => other,
        };
        match value {
            Value::Node(node) => StoreValue::View(wrap(&node)),
            other => StoreValue::Value(other),
        }
    }

    /// Whether the property exists. Tracks the property like a read.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = self.inner.node.normalize(key);
        let _ = self.read(&key);
        self.inner.node.contains(key)
    }

    /// Assign a property. Ignored outside a transaction.
    ///
    /// Views are unwrapped before storing, so nodes only ever hold raw data.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<StoreValue>) {
        let key = self.inner.node.normalize(key);
        if !transaction::is_writing() {
            tracing::debug!(node = %self.inner.node.id(), %key, "ignoring write outside a transaction");
            return;
        }
        set_property(&self.inner.node, key, unwrap(value), false);
    }

    /// Delete a property. Ignored outside a transaction.
    pub fn delete(&self, key: impl Into<Key>) {
        let key = self.inner.node.normalize(key);
        if !transaction::is_writing() {
            tracing::debug!(node = %self.inner.node.id(), %key, "ignoring delete outside a transaction");
            return;
        }
        set_property(&self.inner.node, key, Value::Null, true);
    }

    /// Enumerable keys. Subscribes to structural changes.
    pub fn keys(&self) -> Vec<Key> {
        self.track_self();
        self.inner.node.keys()
    }

    /// Describe a property.
    ///
    /// Configurable data properties are reported as accessors that read
    /// through the view they are invoked with, so reflection stays tracked.
    /// Everything else is passed through unchanged.
    pub fn describe(&self, key: impl Into<Key>) -> Option<PropertyDescriptor> {
        let key = self.inner.node.normalize(key);
        match self.inner.node.descriptor(key.clone())? {
            PropertyDescriptor::Data {
                enumerable,
                configurable: true,
                ..
            } => Some(PropertyDescriptor::Accessor {
                get: Accessor::new(move |view| {
                    view.get(key.clone()).map_or(Value::Null, Value::from)
                }),
                enumerable,
                configurable: true,
            }),
            other => Some(other),
        }
    }

    /// Number of elements of a list, or fields of a map. Tracked.
    pub fn len(&self) -> usize {
        if self.is_list() {
            self.read(&Key::Length)
                .and_then(|len| len.as_int())
                .map_or(0, |len| len as usize)
        } else {
            self.keys().len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append to a list. Ignored outside a transaction.
    pub fn push(&self, value: impl Into<StoreValue>) {
        if let Some(len) = self.inner.node.list_len() {
            self.set(Key::Index(len), value);
        }
    }

    /// Remove and return the last element of a list.
    ///
    /// Outside a transaction the element is returned but stays in place.
    pub fn pop(&self) -> Option<StoreValue> {
        let len = self.inner.node.list_len()?.checked_sub(1)?;
        let last = self.get(Key::Index(len));
        self.set(Key::Length, len);
        last
    }

    /// Read a nested property by path, tracking every step.
    pub fn get_path(&self, path: &Path) -> Result<StoreValue> {
        let mut current = StoreValue::View(self.clone());
        for (depth, key) in path.iter().enumerate() {
            let view = match current {
                StoreValue::View(view) => view,
                StoreValue::Value(value) => {
                    return Err(Error::NotAggregate {
                        path: path.prefix(depth).to_string(),
                        found: value.type_name(),
                    })
                }
            };
            current = view
                .get(key)
                .ok_or_else(|| Error::PathNotFound(path.prefix(depth + 1).to_string()))?;
        }
        Ok(current)
    }

    /// Snapshot of the underlying data as JSON. Never tracks.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Value::Node(self.raw()).to_json()
    }

    #[cfg(test)]
    pub(crate) fn has_cell(&self, key: impl Into<Key>) -> bool {
        let key = CellKey::Prop(self.inner.node.normalize(key));
        cells::existing_registry(&self.inner.node).is_some_and(|cells| cells.get(&key).is_some())
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("View").field(&self.inner.node).finish()
    }
}
