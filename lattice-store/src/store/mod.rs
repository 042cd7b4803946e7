//! Reactive Stores
//!
//! A store wraps a plain graph of maps and lists (raw [`Node`]s) in a
//! [`View`] that tracks reads property by property. Nothing is tracked up
//! front: the first read of a property inside a memo or effect creates a
//! cell for it, and only that cell is fired when the property changes.
//!
//! # Reads
//!
//! Outside a tracking context a view reads like the node itself. Inside
//! one, each property read subscribes to that property, and [`View::keys`]
//! subscribes to the node's structure.
//!
//! # Writes
//!
//! All writes go through [`SetStore::update`], which runs a closure inside a
//! [`transaction`]. Assigning through a view anywhere else does nothing. A
//! write fires the written property's cell, the list length cell when the
//! length changed, and the node's structure cell. Writing a property's
//! current value fires nothing.
//!
//! # Example
//!
//! ```rust
//! use lattice_store::reactive::Effect;
//! use lattice_store::{create_store, Value};
//! use serde_json::json;
//!
//! let initial = Value::from(json!({"todos": [{"title": "write docs", "done": false}]}));
//! let (store, set_store) = create_store(initial.as_node().unwrap().clone());
//!
//! let view = store.clone();
//! let effect = Effect::new(move || {
//!     let _ = view.get_path(&"todos.0.done".into());
//! });
//!
//! set_store.set_path(&"todos.0.done".into(), true).unwrap();
//! assert_eq!(effect.run_count(), 2);
//! ```

mod cells;
mod node;
mod path;
mod transaction;
mod value;
mod view;
mod wrap;

pub use node::{Key, Node, NodeId, PropertyDescriptor, MAX_LIST_LEN};
pub use path::Path;
pub use transaction::{create_store, create_store_with, is_writing, transaction, SetStore, StoreOptions};
pub use value::{Accessor, Opaque, StoreValue, Value};
pub use view::View;
pub use wrap::{is_wrappable, unwrap, wrap};
