//! Raw Nodes
//!
//! A [`Node`] is the plain, mutable aggregate a store wraps: an ordered map
//! of fields or a list of values. Nodes are shared by reference and compared
//! by identity; every node carries a process-unique [`NodeId`] that the
//! store's side tables are keyed by.
//!
//! Methods on `Node` never track or notify. Writes made here are invisible
//! to dependents; go through a [`View`](super::View) inside a transaction
//! for reactive writes.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::value::{Accessor, Value};
use super::{cells, wrap};
use crate::error::{Error, Result};

/// Unique identifier for a raw node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// A property key.
///
/// Keys are interpreted relative to the node they address: on a list,
/// `Field("length")` means [`Key::Length`] and a numeric field means an
/// index; on a map, indices and `Length` are plain field names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// A named field.
    Field(String),
    /// A list position.
    Index(usize),
    /// The length of a list.
    Length,
}

/// Longest list a store will grow to. Indices range below it.
pub const MAX_LIST_LEN: usize = u32::MAX as usize;

/// Parse a list index written in canonical decimal form.
///
/// `"01"`, `"+1"` and out-of-range numbers are field names, not indices.
pub(crate) fn parse_index(text: &str) -> Option<usize> {
    let canonical = match text.as_bytes() {
        [] => false,
        [b'0'] => true,
        [first, rest @ ..] => (b'1'..=b'9').contains(first) && rest.iter().all(u8::is_ascii_digit),
    };
    if !canonical {
        return None;
    }
    text.parse::<usize>().ok().filter(|index| *index < MAX_LIST_LEN)
}

impl Key {
    fn for_list(self) -> Self {
        match self {
            Key::Field(name) if name == "length" => Key::Length,
            Key::Field(name) => match parse_index(&name) {
                Some(index) => Key::Index(index),
                None => Key::Field(name),
            },
            other => other,
        }
    }

    fn for_map(self) -> Self {
        match self {
            Key::Index(index) => Key::Field(index.to_string()),
            Key::Length => Key::Field("length".to_string()),
            field => field,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
            Key::Length => f.write_str("length"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Field(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Field(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

/// Reflection over a single property, in the shape of a property descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyDescriptor {
    /// A stored value.
    Data {
        value: Value,
        writable: bool,
        enumerable: bool,
        configurable: bool,
    },
    /// A computed property.
    Accessor {
        get: Accessor,
        enumerable: bool,
        configurable: bool,
    },
}

impl PropertyDescriptor {
    /// Whether the property can be redefined.
    pub fn is_configurable(&self) -> bool {
        match self {
            PropertyDescriptor::Data { configurable, .. }
            | PropertyDescriptor::Accessor { configurable, .. } => *configurable,
        }
    }

    /// Whether the property shows up in key enumeration.
    pub fn is_enumerable(&self) -> bool {
        match self {
            PropertyDescriptor::Data { enumerable, .. }
            | PropertyDescriptor::Accessor { enumerable, .. } => *enumerable,
        }
    }

    /// Read the property, invoking the getter against `view` if needed.
    pub fn read(&self, view: &super::View) -> Value {
        match self {
            PropertyDescriptor::Data { value, .. } => value.clone(),
            PropertyDescriptor::Accessor { get, .. } => get.call(view),
        }
    }
}

#[derive(Debug, Clone)]
enum Aggregate {
    Map(IndexMap<String, Value>),
    List(Vec<Value>),
}

#[derive(Debug)]
struct NodeData {
    aggregate: Aggregate,
    frozen: bool,
}

struct NodeInner {
    id: NodeId,
    data: RwLock<NodeData>,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        cells::forget(self.id);
        wrap::forget(self.id);
    }
}

/// A shared, identity-bearing map or list.
///
/// Cloning a `Node` clones the reference, not the contents.
#[derive(Clone)]
pub struct Node(Arc<NodeInner>);

impl Node {
    fn from_aggregate(aggregate: Aggregate) -> Self {
        Self(Arc::new(NodeInner {
            id: NodeId::new(),
            data: RwLock::new(NodeData {
                aggregate,
                frozen: false,
            }),
        }))
    }

    /// Create an empty map node.
    pub fn map() -> Self {
        Self::from_aggregate(Aggregate::Map(IndexMap::new()))
    }

    /// Create an empty list node.
    pub fn list() -> Self {
        Self::from_aggregate(Aggregate::List(Vec::new()))
    }

    /// Create a map node from field/value pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::from_aggregate(Aggregate::Map(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        ))
    }

    /// Create a list node from values.
    pub fn from_values<V>(values: impl IntoIterator<Item = V>) -> Self
    where
        V: Into<Value>,
    {
        Self::from_aggregate(Aggregate::List(values.into_iter().map(Into::into).collect()))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_list(&self) -> bool {
        matches!(self.0.data.read().aggregate, Aggregate::List(_))
    }

    pub fn is_frozen(&self) -> bool {
        self.0.data.read().frozen
    }

    /// Make the node immutable. Raw writes fail afterwards, and wrapping it
    /// substitutes a private mutable copy.
    pub fn freeze(&self) -> &Self {
        self.0.data.write().frozen = true;
        self
    }

    /// Number of fields or elements.
    pub fn len(&self) -> usize {
        match &self.0.data.read().aggregate {
            Aggregate::Map(map) => map.len(),
            Aggregate::List(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn list_len(&self) -> Option<usize> {
        match &self.0.data.read().aggregate {
            Aggregate::List(list) => Some(list.len()),
            Aggregate::Map(_) => None,
        }
    }

    /// Interpret `key` relative to this node's kind.
    pub fn normalize(&self, key: impl Into<Key>) -> Key {
        let key = key.into();
        if self.is_list() {
            key.for_list()
        } else {
            key.for_map()
        }
    }

    /// Read a property.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let key = self.normalize(key);
        match (&self.0.data.read().aggregate, &key) {
            (Aggregate::Map(map), Key::Field(name)) => map.get(name).cloned(),
            (Aggregate::List(list), Key::Index(index)) => list.get(*index).cloned(),
            (Aggregate::List(list), Key::Length) => Some(Value::Int(list.len() as i64)),
            _ => None,
        }
    }

    pub fn contains(&self, key: impl Into<Key>) -> bool {
        let key = self.normalize(key);
        match (&self.0.data.read().aggregate, &key) {
            (Aggregate::Map(map), Key::Field(name)) => map.contains_key(name),
            (Aggregate::List(list), Key::Index(index)) => *index < list.len(),
            (Aggregate::List(_), Key::Length) => true,
            _ => false,
        }
    }

    /// Enumerable keys, in order. Lists report their indices.
    pub fn keys(&self) -> Vec<Key> {
        match &self.0.data.read().aggregate {
            Aggregate::Map(map) => map.keys().cloned().map(Key::Field).collect(),
            Aggregate::List(list) => (0..list.len()).map(Key::Index).collect(),
        }
    }

    /// Snapshot of the enumerable entries.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        match &self.0.data.read().aggregate {
            Aggregate::Map(map) => map
                .iter()
                .map(|(name, value)| (Key::Field(name.clone()), value.clone()))
                .collect(),
            Aggregate::List(list) => list
                .iter()
                .cloned()
                .enumerate()
                .map(|(index, value)| (Key::Index(index), value))
                .collect(),
        }
    }

    /// Describe a property.
    ///
    /// List length is never configurable, and neither is anything on a
    /// frozen node.
    pub fn descriptor(&self, key: impl Into<Key>) -> Option<PropertyDescriptor> {
        let key = self.normalize(key);
        let frozen = self.is_frozen();
        let value = self.get(key.clone())?;

        Some(match (key, value) {
            (Key::Length, value) => PropertyDescriptor::Data {
                value,
                writable: !frozen,
                enumerable: false,
                configurable: false,
            },
            (_, Value::Accessor(get)) => PropertyDescriptor::Accessor {
                get,
                enumerable: true,
                configurable: !frozen,
            },
            (_, value) => PropertyDescriptor::Data {
                value,
                writable: !frozen,
                enumerable: true,
                configurable: !frozen,
            },
        })
    }

    /// Write a property without notifying anyone.
    ///
    /// Fails with [`Error::Frozen`] on a frozen node. Malformed list keys
    /// are ignored.
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::Frozen(self.id()));
        }
        let key = self.normalize(key);
        self.write(&key, value.into());
        Ok(())
    }

    /// Delete a property without notifying anyone, returning its old value.
    ///
    /// Deleting a list element leaves a `Null` hole; the length is unchanged.
    pub fn remove(&self, key: impl Into<Key>) -> Result<Option<Value>> {
        if self.is_frozen() {
            return Err(Error::Frozen(self.id()));
        }
        let key = self.normalize(key);
        let previous = self.get(key.clone());
        self.delete(&key);
        Ok(previous)
    }

    /// Append to a list node.
    pub fn push(&self, value: impl Into<Value>) -> Result<()> {
        match self.list_len() {
            Some(len) => self.insert(Key::Index(len), value),
            None => Err(Error::NotAList(self.id())),
        }
    }

    /// An unfrozen copy with the same entries; children are shared.
    pub fn shallow_copy(&self) -> Node {
        Self::from_aggregate(self.0.data.read().aggregate.clone())
    }

    /// Apply a write to a normalized key. Returns whether anything changed
    /// shape or content. Frozen state is the caller's concern.
    pub(crate) fn write(&self, key: &Key, value: Value) -> bool {
        let mut data = self.0.data.write();
        match (&mut data.aggregate, key) {
            (Aggregate::Map(map), Key::Field(name)) => {
                map.insert(name.clone(), value);
                true
            }
            (Aggregate::List(list), Key::Index(index)) => {
                if *index >= list.len() && !resize_list(list, index.saturating_add(1), self.0.id) {
                    return false;
                }
                list[*index] = value;
                true
            }
            (Aggregate::List(list), Key::Length) => match value {
                Value::Int(len) if len >= 0 => {
                    let len = usize::try_from(len).unwrap_or(usize::MAX);
                    resize_list(list, len, self.0.id)
                }
                other => {
                    tracing::warn!(node = %self.0.id, found = other.type_name(), "list length must be a non-negative int");
                    false
                }
            },
            (_, key) => {
                tracing::warn!(node = %self.0.id, %key, "key does not address this node");
                false
            }
        }
    }

    pub(crate) fn delete(&self, key: &Key) -> bool {
        let mut data = self.0.data.write();
        match (&mut data.aggregate, key) {
            (Aggregate::Map(map), Key::Field(name)) => map.shift_remove(name).is_some(),
            (Aggregate::List(list), Key::Index(index)) if *index < list.len() => {
                list[*index] = Value::Null;
                true
            }
            _ => false,
        }
    }
}

/// Resize `list` to `len`, padding with nulls. Refuses lengths past
/// [`MAX_LIST_LEN`] or beyond what can be allocated.
fn resize_list(list: &mut Vec<Value>, len: usize, id: NodeId) -> bool {
    if len > MAX_LIST_LEN {
        tracing::warn!(node = %id, len, "list length out of range");
        return false;
    }
    let additional = len.saturating_sub(list.len());
    if list.try_reserve(additional).is_err() {
        tracing::warn!(node = %id, len, "could not allocate list");
        return false;
    }
    list.resize(len, Value::Null);
    true
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Contents may be cyclic
        let data = self.0.data.read();
        let (kind, len) = match &data.aggregate {
            Aggregate::Map(map) => ("map", map.len()),
            Aggregate::List(list) => ("list", list.len()),
        };
        f.debug_struct("Node")
            .field("id", &self.0.id)
            .field("kind", &kind)
            .field("len", &len)
            .field("frozen", &data.frozen)
            .finish()
    }
}
