//! Cell Registry
//!
//! Per raw node, a lazily populated map from property key to a reactive
//! cell. The registry lives in a side table keyed by [`NodeId`] rather than
//! on the node, so user data never carries hidden keys. An entry is dropped
//! together with its node; cells are never pruned before that.
//!
//! A cell's payload mirrors the property's current value, but the node stays
//! the source of truth. Cells use signals with equality disabled: what
//! matters is that a write fires them, not what they hold.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::node::{Key, Node, NodeId};
use super::value::Value;
use crate::reactive::{ReactiveContext, Signal};

/// Key of a cell within a node's registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum CellKey {
    /// Whole-object structure: enumeration, existence checks.
    Shape,
    Prop(Key),
}

pub(crate) type Cell = Signal<Option<Value>>;

#[derive(Default)]
pub(crate) struct CellRegistry {
    cells: Mutex<HashMap<CellKey, Cell>>,
}

impl CellRegistry {
    /// The cell for `key`, if one was ever materialized.
    pub(crate) fn get(&self, key: &CellKey) -> Option<Cell> {
        self.cells.lock().get(key).cloned()
    }

    /// The cell for `key`, created with `initial` as payload if absent.
    pub(crate) fn cell(&self, key: CellKey, initial: Option<Value>) -> Cell {
        self.cells
            .lock()
            .entry(key)
            .or_insert_with_key(|key| {
                tracing::trace!(?key, "materializing cell");
                Signal::new(initial)
            })
            .clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.lock().len()
    }
}

static CELLS: OnceLock<DashMap<NodeId, Arc<CellRegistry>>> = OnceLock::new();

fn get_cells() -> &'static DashMap<NodeId, Arc<CellRegistry>> {
    CELLS.get_or_init(DashMap::new)
}

/// The node's registry, if any cell was ever created for it.
pub(crate) fn existing_registry(node: &Node) -> Option<Arc<CellRegistry>> {
    get_cells()
        .get(&node.id())
        .map(|registry| Arc::clone(registry.value()))
}

/// The node's registry, attaching an empty one on first access.
pub(crate) fn registry_for(node: &Node) -> Arc<CellRegistry> {
    Arc::clone(get_cells().entry(node.id()).or_default().value())
}

/// Register the active computation as dependent on `node`'s structure.
pub(crate) fn track_self(node: &Node) {
    if ReactiveContext::is_active() {
        registry_for(node).cell(CellKey::Shape, None).with(|_| ());
    }
}

/// Called when a node is dropped.
pub(crate) fn forget(id: NodeId) {
    // Drop the registry outside the map's shard lock: releasing cells can
    // drop closures that own other nodes.
    let removed = get_cells().remove(&id);
    drop(removed);
}
