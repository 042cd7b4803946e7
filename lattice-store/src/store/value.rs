//! Dynamic values stored in raw nodes, and what a view hands back on read.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Error as _, Serialize, SerializeMap, SerializeSeq, Serializer};

use super::node::{Node, NodeId};
use super::view::View;
use crate::error::Result;

/// A computed property.
///
/// The getter receives the view it is read through, so reads it performs
/// are tracked like any other read on that view.
#[derive(Clone)]
pub struct Accessor(Arc<dyn Fn(&View) -> Value + Send + Sync>);

impl Accessor {
    pub fn new<F>(get: F) -> Self
    where
        F: Fn(&View) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(get))
    }

    pub fn call(&self, view: &View) -> Value {
        (self.0)(view)
    }
}

impl PartialEq for Accessor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Accessor(..)")
    }
}

/// A value of some custom type. Stores hold it but never wrap it.
#[derive(Clone)]
pub struct Opaque(Arc<dyn Any + Send + Sync>);

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opaque(..)")
    }
}

/// A dynamic value.
///
/// Equality is by value for primitives and by identity for nodes,
/// accessors and opaque values, so `NaN` never equals itself and two
/// separately built nodes with the same contents are different values.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A nested map or list.
    Node(Node),
    Accessor(Accessor),
    Opaque(Opaque),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, or ints widened to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    /// Only plain maps and lists are wrapped by a store.
    pub fn is_wrappable(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Node(node) if node.is_list() => "list",
            Value::Node(_) => "map",
            Value::Accessor(_) => "accessor",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Parse JSON text into a fresh value graph.
    pub fn from_json_str(text: &str) -> Result<Value> {
        Ok(serde_json::from_str(text)?)
    }

    /// Snapshot into a JSON value. Fails on cyclic graphs.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::Int(value as i64)
            }
        })*
    };
}

impl_from_int!(i32, i64, u32, usize);

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl From<Accessor> for Value {
    fn from(accessor: Accessor) -> Self {
        Value::Accessor(accessor)
    }
}

impl From<Opaque> for Value {
    fn from(opaque: Opaque) -> Self {
        Value::Opaque(opaque)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Node(Node::from_values(items)),
            serde_json::Value::Object(fields) => Value::Node(Node::from_pairs(fields)),
        }
    }
}

thread_local! {
    static SERIALIZING: RefCell<HashSet<NodeId>> = RefCell::new(HashSet::new());
}

/// Marks a node as on the serialization stack for the guard's lifetime.
struct CycleGuard(NodeId);

impl CycleGuard {
    fn enter(id: NodeId) -> Option<Self> {
        SERIALIZING
            .with(|active| active.borrow_mut().insert(id))
            .then(|| Self(id))
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        SERIALIZING.with(|active| active.borrow_mut().remove(&self.0));
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null | Value::Accessor(_) | Value::Opaque(_) => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Node(node) => node.serialize(serializer),
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let _guard = CycleGuard::enter(self.id())
            .ok_or_else(|| S::Error::custom(format!("cycle through {}", self.id())))?;

        let entries = self.entries();
        if self.is_list() {
            let mut seq = serializer.serialize_seq(Some(entries.len()))?;
            for (_, value) in &entries {
                seq.serialize_element(value)?;
            }
            seq.end()
        } else {
            let mut map = serializer.serialize_map(Some(entries.len()))?;
            for (key, value) in &entries {
                map.serialize_entry(&key.to_string(), value)?;
            }
            map.end()
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

/// What a read through a view produces: nested aggregates come back
/// wrapped, everything else as a plain value.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Value(Value),
    View(View),
}

impl StoreValue {
    pub fn as_view(&self) -> Option<&View> {
        match self {
            StoreValue::View(view) => Some(view),
            StoreValue::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            StoreValue::Value(value) => Some(value),
            StoreValue::View(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.as_value().and_then(Value::as_int)
    }

    pub fn as_float(&self) -> Option<f64> {
        self.as_value().and_then(Value::as_float)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_value().and_then(Value::as_bool)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StoreValue::Value(Value::Null))
    }

    /// The view to descend into, or `None` for a leaf.
    pub fn into_view(self) -> Option<View> {
        match self {
            StoreValue::View(view) => Some(view),
            StoreValue::Value(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            StoreValue::Value(value) => value.type_name(),
            StoreValue::View(view) if view.is_list() => "list",
            StoreValue::View(_) => "map",
        }
    }
}

macro_rules! impl_store_value_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for StoreValue {
            fn from(value: $ty) -> Self {
                StoreValue::Value(value.into())
            }
        })*
    };
}

impl_store_value_from!(Value, i32, i64, u32, usize, bool, f64, &str, String, Node, Accessor, Opaque);

impl From<View> for StoreValue {
    fn from(view: View) -> Self {
        StoreValue::View(view)
    }
}

impl From<&View> for StoreValue {
    fn from(view: &View) -> Self {
        StoreValue::View(view.clone())
    }
}

impl From<StoreValue> for Value {
    fn from(value: StoreValue) -> Self {
        super::unwrap(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn equality_is_identity_for_aggregates() {
        let node = Node::map();
        assert_eq!(Value::Node(node.clone()), Value::Node(node));
        assert_ne!(Value::Node(Node::map()), Value::Node(Node::map()));
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_eq!(Value::from("a"), Value::String("a".into()));
    }

    #[test]
    fn json_round_trip_preserves_shape() {
        let source = json!({"title": "groceries", "items": [{"done": false}, {"done": true}], "ratio": 0.5});
        let value = Value::from(source.clone());

        assert_eq!(value.type_name(), "map");
        assert_eq!(value.to_json().unwrap(), source);
    }

    #[test]
    fn parse_from_text() {
        let value = Value::from_json_str(r#"[1, "two", null]"#).unwrap();
        let node = value.as_node().unwrap();
        assert!(node.is_list());
        assert_eq!(node.get(1usize), Some(Value::from("two")));

        assert!(Value::from_json_str("{").is_err());
    }

    #[test]
    fn serializing_a_cycle_fails() {
        let node = Node::map();
        node.insert("me", node.clone()).unwrap();

        let err = Value::Node(node.clone()).to_json().unwrap_err();
        assert!(err.to_string().contains("cycle"));

        // Break the cycle so the node can be freed
        node.remove("me").unwrap();
    }

    #[test]
    fn rejected_cycle_guard_keeps_the_outer_one_active() {
        let id = Node::map().id();
        let is_active = || SERIALIZING.with(|active| active.borrow().contains(&id));

        let outer = CycleGuard::enter(id).unwrap();
        assert!(CycleGuard::enter(id).is_none());
        assert!(is_active());

        drop(outer);
        assert!(!is_active());
    }

    #[test]
    fn shared_children_are_not_cycles() {
        let shared = Node::from_pairs([("n", 1)]);
        let root = Node::from_pairs([("a", shared.clone()), ("b", shared)]);
        assert_eq!(
            Value::Node(root).to_json().unwrap(),
            json!({"a": {"n": 1}, "b": {"n": 1}})
        );
    }

    #[test]
    fn opaque_values_downcast() {
        struct Handle(u8);
        let opaque = Opaque::new(Handle(7));
        assert_eq!(opaque.downcast_ref::<Handle>().map(|h| h.0), Some(7));
        assert!(!Value::Opaque(opaque).is_wrappable());
    }
}
