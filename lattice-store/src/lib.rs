//! Lattice Store
//!
//! Fine-grained reactive stores for the Lattice runtime. A store is a deep,
//! transparent view over a plain graph of maps and lists:
//!
//! - Every property is an independently trackable reactive cell, created
//!   lazily the first time a tracking computation reads it.
//! - Writes are only applied inside a transaction and fire exactly the cells
//!   whose value changed, plus a structure cell for enumeration readers.
//!
//! # Architecture
//!
//! - `reactive`: signals, memos, effects, the tracking context and batching
//! - `store`: raw nodes, the wrap/unwrap layer, views and transactions
//!
//! # Example
//!
//! ```rust
//! use lattice_store::reactive::Effect;
//! use lattice_store::{create_store, Node};
//!
//! let (store, set_store) = create_store(Node::from_pairs([("count", 0)]));
//!
//! let view = store.clone();
//! let effect = Effect::new(move || {
//!     println!("count = {:?}", view.get("count"));
//! });
//!
//! set_store.update(|s| s.set("count", 5));
//! assert_eq!(effect.run_count(), 2);
//!
//! // Same value again: nothing fires
//! set_store.update(|s| s.set("count", 5));
//! assert_eq!(effect.run_count(), 2);
//! ```

pub mod error;
pub mod reactive;
pub mod store;

pub use error::{Error, Result};
pub use store::{
    create_store, create_store_with, is_wrappable, transaction, unwrap, wrap, Accessor, Key, Node,
    NodeId, Opaque, Path, PropertyDescriptor, SetStore, StoreOptions, StoreValue, Value, View,
};
