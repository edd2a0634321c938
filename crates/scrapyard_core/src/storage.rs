//! Store context shared by all callers in one process or session.
//!
//! # Responsibility
//! - Own the migrated SQLite connection and its config.
//! - Expose node, blob, index, query and tree operations in one place.
//!
//! # Invariants
//! - Every multi-step entry point runs inside one immediate transaction.
//! - The connection is migrated and schema-checked before any operation.

use crate::config::StorageConfig;
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::logging::{init_logging, LoggingError};
use crate::model::node::{NewNode, Node, NodeId, NodePatch, NodeRef, TodoState};
use crate::model::payload::{Blob, IndexEntry, NewBlob};
use crate::query::engine::{query_nodes, NodeQuery};
use crate::query::subtree;
use crate::repo::blob_repo::{BlobRepository, SqliteBlobRepository};
use crate::repo::error::{StoreError, StoreResult};
use crate::repo::index_repo::{IndexRepository, SqliteIndexRepository};
use crate::repo::mutator::in_transaction;
use crate::repo::node_repo::{NodeRepository, SqliteNodeRepository};
use crate::repo::schema::ensure_store_ready;
use crate::service::shelf_service::ShelfRegistry;
use crate::service::tree_service::TreeService;
use log::{info, warn};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Tree service bound to one connection or transaction.
pub type SqliteTreeService<'conn> =
    TreeService<SqliteNodeRepository<'conn>, SqliteBlobRepository<'conn>>;

/// Errors from opening a `Storage` context.
#[derive(Debug)]
pub enum OpenError {
    Logging(LoggingError),
    Store(StoreError),
}

impl Display for OpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logging(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for OpenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Logging(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<StoreError> for OpenError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<DbError> for OpenError {
    fn from(value: DbError) -> Self {
        Self::Store(StoreError::Db(value))
    }
}

/// Node store context.
pub struct Storage {
    conn: Connection,
    config: StorageConfig,
}

impl Storage {
    /// Opens the store described by `config`, starting file logging when
    /// `log_dir` is set.
    ///
    /// A logger already running with another configuration is kept; the
    /// mismatch is logged as a warning.
    pub fn open(config: &StorageConfig) -> Result<Self, OpenError> {
        if let Some(log_dir) = config.log_dir.as_deref() {
            match init_logging(&config.log_level, log_dir) {
                Ok(()) => {}
                Err(LoggingError::AlreadyInitialized { level, log_dir }) => warn!(
                    "event=storage_open module=storage status=warn reason=logger_active level={} log_dir={}",
                    level,
                    log_dir.display()
                ),
                Err(err) => return Err(OpenError::Logging(err)),
            }
        }

        let conn = open_db(&config.db_path)?;
        ensure_store_ready(&conn)?;
        info!(
            "event=storage_open module=storage status=ok in_memory={}",
            config.is_in_memory()
        );
        Ok(Self {
            conn,
            config: config.clone(),
        })
    }

    /// Opens a private in-memory store without file logging.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = open_db_in_memory()?;
        ensure_store_ready(&conn)?;
        Ok(Self {
            conn,
            config: StorageConfig::in_memory(),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Raw connection for callers composing their own transactions.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Runs `work` inside one transaction on this store.
    pub fn transaction<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        in_transaction(&self.conn, work)
    }

    fn nodes(&self) -> SqliteNodeRepository<'_> {
        SqliteNodeRepository::new(&self.conn)
    }

    fn blobs(&self) -> SqliteBlobRepository<'_> {
        SqliteBlobRepository::new(&self.conn)
    }

    fn index(&self) -> SqliteIndexRepository<'_> {
        SqliteIndexRepository::new(&self.conn)
    }

    /// Shelf registry over this store.
    pub fn shelves(&self) -> ShelfRegistry<SqliteNodeRepository<'_>> {
        ShelfRegistry::new(self.nodes())
    }

    /// Runs `work` against a tree service inside one transaction.
    pub fn tree<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&SqliteTreeService<'_>) -> StoreResult<T>,
    {
        in_transaction(&self.conn, |conn| {
            let service = TreeService::new(
                SqliteNodeRepository::new(conn),
                SqliteBlobRepository::new(conn),
            );
            work(&service)
        })
    }

    // Node store.

    pub fn create(&self, datum: &NewNode, reset_order: bool) -> StoreResult<Node> {
        self.nodes().create_node(datum, reset_order)
    }

    pub fn get(&self, id: NodeId) -> StoreResult<Option<Node>> {
        self.nodes().get_node(id)
    }

    pub fn get_by_uuid(&self, uuid: &str) -> StoreResult<Option<Node>> {
        self.nodes().get_node_by_uuid(uuid)
    }

    pub fn get_many(&self, ids: &[NodeId]) -> StoreResult<Vec<Node>> {
        self.nodes().get_nodes(ids)
    }

    pub fn get_children(&self, parent_id: NodeId) -> StoreResult<Vec<Node>> {
        self.nodes().get_children(parent_id)
    }

    pub fn update(&self, patch: &NodePatch) -> StoreResult<Node> {
        self.nodes().update_node(patch)
    }

    pub fn update_many(&self, patches: &[NodePatch]) -> StoreResult<Vec<Node>> {
        self.nodes().update_nodes(patches)
    }

    /// Deletes exactly `ids` with their blob and index rows.
    pub fn delete_nodes(&self, ids: &[NodeId]) -> StoreResult<()> {
        self.nodes().delete_nodes(ids)
    }

    // Subtree and query.

    pub fn resolve_subtree(&self, ids: &[NodeId]) -> StoreResult<BTreeSet<NodeId>> {
        subtree::resolve_subtree(&self.conn, ids)
    }

    pub fn query_full_subtree(&self, ids: &[NodeId]) -> StoreResult<Vec<Node>> {
        subtree::query_full_subtree(&self.conn, ids)
    }

    pub fn query(&self, scope: Option<NodeId>, query: &NodeQuery) -> StoreResult<Vec<Node>> {
        query_nodes(&self.conn, scope, query)
    }

    // Shelves.

    pub fn find_shelves(&self) -> StoreResult<Vec<Node>> {
        self.shelves().find_shelves()
    }

    pub fn find_shelf(&self, name: &str) -> StoreResult<Option<Node>> {
        self.shelves().find_shelf(name)
    }

    pub fn find_group(&self, parent_id: NodeId, name: &str) -> StoreResult<Option<Node>> {
        self.shelves().find_group(parent_id, name)
    }

    pub fn create_shelf(&self, name: &str) -> StoreResult<Node> {
        in_transaction(&self.conn, |conn| {
            ShelfRegistry::new(SqliteNodeRepository::new(conn)).create_shelf(name)
        })
    }

    // Blobs and index.

    pub fn store_blob(&self, node_id: NodeId, blob: &NewBlob) -> StoreResult<Blob> {
        self.blobs().store_blob(node_id, blob)
    }

    pub fn fetch_blob(&self, node: &NodeRef) -> StoreResult<Option<Blob>> {
        self.blobs().fetch_blob(node)
    }

    pub fn store_index(&self, node_id: NodeId, words: &[String]) -> StoreResult<IndexEntry> {
        self.index().store_index(node_id, words)
    }

    pub fn fetch_index(&self, node_id: NodeId) -> StoreResult<Option<IndexEntry>> {
        self.index().fetch_index(node_id)
    }

    pub fn search_index(&self, word: &str) -> StoreResult<Vec<NodeId>> {
        self.index().search_index(word)
    }

    // Tree operations.

    pub fn create_group(&self, parent_id: NodeId, name: &str) -> StoreResult<Node> {
        self.tree(|tree| tree.create_group(parent_id, name))
    }

    pub fn add_bookmark(
        &self,
        parent_id: NodeId,
        name: &str,
        uri: &str,
        tags: &[String],
    ) -> StoreResult<Node> {
        self.tree(|tree| tree.add_bookmark(parent_id, name, uri, tags))
    }

    pub fn add_archive(
        &self,
        parent_id: NodeId,
        name: &str,
        uri: &str,
        tags: &[String],
        payload: &NewBlob,
    ) -> StoreResult<Node> {
        self.tree(|tree| tree.add_archive(parent_id, name, uri, tags, payload))
    }

    pub fn add_separator(&self, parent_id: NodeId) -> StoreResult<Node> {
        self.tree(|tree| tree.add_separator(parent_id))
    }

    pub fn rename_node(&self, id: NodeId, name: &str) -> StoreResult<Node> {
        self.tree(|tree| tree.rename_node(id, name))
    }

    pub fn move_nodes(&self, ids: &[NodeId], new_parent_id: NodeId) -> StoreResult<Vec<Node>> {
        self.tree(|tree| tree.move_nodes(ids, new_parent_id))
    }

    pub fn copy_nodes(&self, ids: &[NodeId], new_parent_id: NodeId) -> StoreResult<Vec<Node>> {
        self.tree(|tree| tree.copy_nodes(ids, new_parent_id))
    }

    pub fn reorder_nodes(&self, ordered_ids: &[NodeId]) -> StoreResult<()> {
        self.tree(|tree| tree.reorder_nodes(ordered_ids))
    }

    pub fn set_todo_state(
        &self,
        states: &[(NodeId, Option<TodoState>)],
    ) -> StoreResult<Vec<Node>> {
        self.tree(|tree| tree.set_todo_state(states))
    }

    /// Deletes `ids` and all descendants atomically.
    pub fn delete_subtree(&self, ids: &[NodeId]) -> StoreResult<BTreeSet<NodeId>> {
        self.tree(|tree| tree.delete_subtree(ids))
    }
}
