//! Error types for lattice-store
//!
//! Reactive writes never fail: a write outside a transaction is ignored and
//! unwrapping a cyclic graph terminates. Errors come from raw node access,
//! path lookups and JSON conversion.

use thiserror::Error;

use crate::store::NodeId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} is frozen")]
    Frozen(NodeId),

    #[error("{0} is not a list")]
    NotAList(NodeId),

    #[error("path not found: `{0}`")]
    PathNotFound(String),

    #[error("expected a map or list at `{path}`, found {found}")]
    NotAggregate { path: String, found: &'static str },

    #[error("path is empty")]
    EmptyPath,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
