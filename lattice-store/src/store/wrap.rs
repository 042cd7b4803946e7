//! Wrap/Unwrap Layer
//!
//! [`wrap`] hands out exactly one [`View`] per raw node for as long as that
//! view is alive, through a side table of weak references keyed by
//! [`NodeId`]. A frozen node is wrapped through a private copy, which a
//! second table keeps for as long as the frozen node lives. [`unwrap`] goes
//! the other way and strips a value graph down to plain nodes, replacing
//! frozen nodes by mutable copies on the way.

use std::collections::HashMap;
use std::sync::{OnceLock, Weak};

use dashmap::DashMap;

use super::node::{Node, NodeId};
use super::value::{StoreValue, Value};
use super::view::{View, ViewInner};

static VIEWS: OnceLock<DashMap<NodeId, Weak<ViewInner>>> = OnceLock::new();

fn get_views() -> &'static DashMap<NodeId, Weak<ViewInner>> {
    VIEWS.get_or_init(DashMap::new)
}

static COPIES: OnceLock<DashMap<NodeId, Node>> = OnceLock::new();

fn get_copies() -> &'static DashMap<NodeId, Node> {
    COPIES.get_or_init(DashMap::new)
}

/// The node of record standing in for `frozen`, copied on first use.
fn copy_of_frozen(frozen: &Node) -> Node {
    if let Some(copy) = get_copies().get(&frozen.id()).map(|entry| entry.value().clone()) {
        return copy;
    }
    let copy = unwrap_node(frozen, &mut HashMap::new());
    get_copies().insert(frozen.id(), copy.clone());
    copy
}

/// Whether a store would wrap this value: views themselves and plain maps
/// and lists. Primitives, accessors and opaque values are never wrapped.
pub fn is_wrappable(value: &StoreValue) -> bool {
    match value {
        StoreValue::View(_) => true,
        StoreValue::Value(value) => value.is_wrappable(),
    }
}

fn cached_view(id: NodeId) -> Option<View> {
    let weak = get_views().get(&id).map(|entry| entry.value().clone())?;
    weak.upgrade().map(View::from_inner)
}

/// The view over `node`, created on first call.
///
/// A frozen node is never mutated: the view is bound to a private copy, and
/// later calls with the frozen node wrap that same copy again.
pub fn wrap(node: &Node) -> View {
    if let Some(view) = cached_view(node.id()) {
        return view;
    }

    let target = if node.is_frozen() {
        copy_of_frozen(node)
    } else {
        node.clone()
    };

    let view = match cached_view(target.id()) {
        Some(view) => view,
        None => {
            let view = View::bind(target.clone());
            get_views().insert(target.id(), view.downgrade());
            view
        }
    };
    if !target.ptr_eq(node) {
        tracing::debug!(frozen = %node.id(), copy = %target.id(), "wrapped a copy of a frozen node");
        get_views().insert(node.id(), view.downgrade());
    }
    view
}

/// Strip a value down to raw data.
///
/// A view returns its node directly. Anything else is walked: frozen nodes
/// are shallow-copied, other nodes are updated in place wherever a child's
/// unwrap produced a different node. Accessors are left alone. Each node is
/// visited once, so cycles terminate.
pub fn unwrap(value: impl Into<StoreValue>) -> Value {
    match value.into() {
        StoreValue::View(view) => Value::Node(view.raw()),
        StoreValue::Value(Value::Node(node)) => Value::Node(unwrap_node(&node, &mut HashMap::new())),
        StoreValue::Value(other) => other,
    }
}

pub(crate) fn unwrap_node(node: &Node, visited: &mut HashMap<NodeId, Node>) -> Node {
    if let Some(done) = visited.get(&node.id()) {
        return done.clone();
    }

    let target = if node.is_frozen() {
        node.shallow_copy()
    } else {
        node.clone()
    };
    visited.insert(node.id(), target.clone());

    for (key, value) in target.entries() {
        if let Value::Node(child) = value {
            let unwrapped = unwrap_node(&child, visited);
            if !unwrapped.ptr_eq(&child) {
                target.write(&key, Value::Node(unwrapped));
            }
        }
    }
    target
}

/// Called when a node is dropped.
pub(crate) fn forget(id: NodeId) {
    get_views().remove(&id);
    // Dropping the copy may drop further nodes, so not under the shard lock
    let copy = get_copies().remove(&id);
    drop(copy);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Accessor;

    #[test]
    fn wrap_is_identity_stable() {
        let node = Node::from_pairs([("a", 1)]);
        let first = wrap(&node);
        let second = wrap(&node);
        assert!(first.ptr_eq(&second));
        assert!(first.raw().ptr_eq(&node));
    }

    #[test]
    fn unwrap_returns_original_reference() {
        let node = Node::from_pairs([("a", 1)]);
        let view = wrap(&node);

        assert_eq!(unwrap(&view), Value::Node(node.clone()));
        assert_eq!(unwrap(Value::Node(node.clone())), Value::Node(node));
        assert_eq!(unwrap(5), Value::Int(5));
    }

    #[test]
    fn unwrap_survives_cycles() {
        let a = Node::map();
        let b = Node::from_pairs([("parent", a.clone())]);
        a.insert("child", b.clone()).unwrap();

        let view = wrap(&a);
        assert_eq!(unwrap(Value::Node(a.clone())), Value::Node(a.clone()));
        assert!(unwrap(&view).as_node().unwrap().ptr_eq(&a));

        b.remove("parent").unwrap();
    }

    #[test]
    fn frozen_nodes_are_copied_not_mutated() {
        let inner = Node::from_pairs([("x", 1)]);
        inner.freeze();
        let outer = Node::from_pairs([("inner", inner.clone())]);
        outer.freeze();

        let unwrapped = unwrap(Value::Node(outer.clone()));
        let copy = unwrapped.as_node().unwrap();
        assert!(!copy.ptr_eq(&outer));
        assert!(!copy.is_frozen());

        let inner_copy = copy.get("inner").unwrap();
        assert!(!inner_copy.as_node().unwrap().ptr_eq(&inner));
        assert!(outer.get("inner").unwrap().as_node().unwrap().ptr_eq(&inner));
    }

    #[test]
    fn frozen_child_of_mutable_parent_is_replaced_in_place() {
        let child = Node::from_values([1, 2]);
        child.freeze();
        let parent = Node::from_pairs([("child", child.clone())]);

        let unwrapped = unwrap(Value::Node(parent.clone()));
        assert!(unwrapped.as_node().unwrap().ptr_eq(&parent));
        let replaced = parent.get("child").unwrap();
        assert!(!replaced.as_node().unwrap().ptr_eq(&child));
        assert!(!replaced.as_node().unwrap().is_frozen());
    }

    #[test]
    fn frozen_shared_child_maps_to_one_copy() {
        let shared = Node::map();
        shared.freeze();
        let parent = Node::from_pairs([("a", shared.clone()), ("b", shared)]);

        unwrap(Value::Node(parent.clone()));
        let a = parent.get("a").unwrap();
        let b = parent.get("b").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn wrapping_frozen_node_binds_a_copy() {
        let frozen = Node::from_pairs([("a", 1)]);
        frozen.freeze();

        let view = wrap(&frozen);
        assert!(!view.raw().ptr_eq(&frozen));
        assert!(!view.raw().is_frozen());
        assert!(wrap(&frozen).ptr_eq(&view));
        assert!(wrap(&view.raw()).ptr_eq(&view));
    }

    #[test]
    fn rewrapping_a_frozen_node_keeps_earlier_writes() {
        let frozen = Node::from_pairs([("a", 1)]);
        frozen.freeze();

        let view = wrap(&frozen);
        let copy_id = view.raw().id();
        crate::store::transaction(|| view.set("a", 2));
        drop(view);

        let again = wrap(&frozen);
        assert_eq!(again.raw().id(), copy_id);
        assert_eq!(again.get("a").and_then(|v| v.as_int()), Some(2));
        assert_eq!(frozen.get("a"), Some(Value::Int(1)));
    }

    #[test]
    fn frozen_copy_is_released_with_the_frozen_node() {
        let frozen = Node::map();
        frozen.freeze();
        let id = frozen.id();

        drop(wrap(&frozen));
        assert!(get_copies().contains_key(&id));

        drop(frozen);
        assert!(!get_copies().contains_key(&id));
    }

    #[test]
    fn accessors_are_not_unwrapped() {
        let getter = Accessor::new(|_| Value::Int(1));
        let node = Node::from_pairs([("computed", Value::Accessor(getter.clone()))]);

        unwrap(Value::Node(node.clone()));
        assert_eq!(node.get("computed"), Some(Value::Accessor(getter)));
    }

    #[test]
    fn wrappable_values() {
        let node = Node::map();
        assert!(is_wrappable(&StoreValue::from(node.clone())));
        assert!(is_wrappable(&StoreValue::from(wrap(&node))));
        assert!(!is_wrappable(&StoreValue::from(1)));
        assert!(!is_wrappable(&StoreValue::from(Accessor::new(|_| Value::Null))));
    }
}
