//! Hierarchical node store and query engine for the Scrapyard bookmark
//! manager: shelves, groups, bookmarks, archives and separators in one tree,
//! with payload blobs, word indexes and filtered tree-aware queries.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod service;
pub mod storage;

pub use config::{ConfigError, StorageConfig};
pub use db::DbError;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::node::{
    NewNode, Node, NodeId, NodePatch, NodeRef, NodeType, NodeValidationError, TodoState,
    DEFAULT_SHELF_ID, DEFAULT_SHELF_NAME, DEFAULT_SHELF_UUID,
};
pub use model::payload::{Blob, BlobData, IndexEntry, NewBlob};
pub use query::engine::{NodeQuery, QueryDepth, QueryOrder};
pub use repo::error::{StoreError, StoreResult};
pub use repo::index_repo::index_words;
pub use storage::{OpenError, Storage};

/// Minimal health-check API for linkage probes.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
