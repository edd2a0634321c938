//! Node repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD APIs over the `nodes` table and its tag index.
//! - Own identity (id, uuid) and timestamp assignment.
//! - Keep SQL details inside the store boundary.
//!
//! # Invariants
//! - Ids come from `AUTOINCREMENT` and are never reused; uuids are fresh v4.
//! - Creation resets `pos`/`todo_pos` to 1 unless the caller opts out.
//! - Updates merge over stored fields and bump `date_modified`.
//! - Update/delete on a missing id fail with `NotFound` and roll back.

use crate::model::node::{name_key, NewNode, Node, NodeId, NodePatch, NodeRef, NodeType, TodoState};
use crate::query::subtree;
use crate::repo::error::{StoreError, StoreResult};
use crate::repo::mutator;
use crate::repo::schema::ensure_store_ready;
use crate::repo::{sql_placeholders, MAX_BIND_PARAMS};
use log::{debug, info};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap};

pub(crate) const NODE_COLUMNS: &str = "id,
    uuid,
    parent_id,
    type,
    name,
    uri,
    pos,
    todo_pos,
    date_added,
    date_modified,
    todo_state,
    todo_date";

/// Repository interface for node operations.
pub trait NodeRepository {
    /// Creates one node and returns the stored record.
    fn create_node(&self, datum: &NewNode, reset_order: bool) -> StoreResult<Node>;
    /// Loads one node by id.
    fn get_node(&self, id: NodeId) -> StoreResult<Option<Node>>;
    /// Loads one node by uuid.
    fn get_node_by_uuid(&self, uuid: &str) -> StoreResult<Option<Node>>;
    /// Loads all existing nodes among `ids`. Missing ids are skipped.
    fn get_nodes(&self, ids: &[NodeId]) -> StoreResult<Vec<Node>>;
    /// Lists direct children of one parent.
    fn get_children(&self, parent_id: NodeId) -> StoreResult<Vec<Node>>;
    /// Merges one patch over the stored node.
    fn update_node(&self, patch: &NodePatch) -> StoreResult<Node>;
    /// Merges all patches in order inside one transaction.
    fn update_nodes(&self, patches: &[NodePatch]) -> StoreResult<Vec<Node>>;
    /// Deletes nodes with their blob and index rows. Descendants are kept.
    fn delete_nodes(&self, ids: &[NodeId]) -> StoreResult<()>;
    /// Resolves `ids` plus all transitive descendants.
    fn resolve_subtree(&self, ids: &[NodeId]) -> StoreResult<BTreeSet<NodeId>>;
    /// Lists all shelves in id order.
    fn find_shelves(&self) -> StoreResult<Vec<Node>>;
    /// Finds one shelf by case-insensitive name.
    fn find_shelf(&self, name: &str) -> StoreResult<Option<Node>>;
    /// Finds one direct child of `parent_id` by case-insensitive name.
    fn find_child_by_name(&self, parent_id: NodeId, name: &str) -> StoreResult<Option<Node>>;
    /// Re-parents nodes after a cycle check, appending them to the new parent.
    fn move_nodes(&self, ids: &[NodeId], new_parent_id: NodeId) -> StoreResult<Vec<Node>>;
    /// Deep-copies subtrees (including blobs and index entries) under a parent.
    fn copy_nodes(&self, ids: &[NodeId], new_parent_id: NodeId) -> StoreResult<Vec<Node>>;
    /// Rewrites sibling `pos` densely as 1..N in the given order.
    fn reorder_children(&self, ordered_ids: &[NodeId]) -> StoreResult<()>;
}

/// SQLite-backed node repository.
pub struct SqliteNodeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNodeRepository<'conn> {
    /// Creates repository from a connection already known to be migrated.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates repository after verifying schema readiness.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self { conn })
    }
}

impl NodeRepository for SqliteNodeRepository<'_> {
    fn create_node(&self, datum: &NewNode, reset_order: bool) -> StoreResult<Node> {
        let node = mutator::in_transaction(self.conn, |conn| {
            mutator::insert_node(conn, datum, reset_order)
        })?;
        debug!(
            "event=node_create module=repo status=ok node_id={} type={}",
            node.id,
            node.kind.as_str()
        );
        Ok(node)
    }

    fn get_node(&self, id: NodeId) -> StoreResult<Option<Node>> {
        load_node(self.conn, id)
    }

    fn get_node_by_uuid(&self, uuid: &str) -> StoreResult<Option<Node>> {
        let id: Option<NodeId> = self
            .conn
            .query_row("SELECT id FROM nodes WHERE uuid = ?1;", [uuid], |row| {
                row.get(0)
            })
            .optional()?;
        match id {
            Some(id) => load_node(self.conn, id),
            None => Ok(None),
        }
    }

    fn get_nodes(&self, ids: &[NodeId]) -> StoreResult<Vec<Node>> {
        load_nodes_by_ids(self.conn, ids)
    }

    fn get_children(&self, parent_id: NodeId) -> StoreResult<Vec<Node>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS}
             FROM nodes
             WHERE parent_id = ?1
             ORDER BY pos ASC, id ASC;"
        ))?;
        let nodes = collect_nodes(stmt.query([parent_id])?)?;
        with_tags(self.conn, nodes)
    }

    fn update_node(&self, patch: &NodePatch) -> StoreResult<Node> {
        let now = super::now_epoch_ms();
        let node = mutator::in_transaction(self.conn, |conn| {
            mutator::update_node_in(conn, patch, now)
        })?;
        debug!(
            "event=node_update module=repo status=ok node_id={}",
            node.id
        );
        Ok(node)
    }

    fn update_nodes(&self, patches: &[NodePatch]) -> StoreResult<Vec<Node>> {
        let now = super::now_epoch_ms();
        let nodes = mutator::in_transaction(self.conn, |conn| {
            patches
                .iter()
                .map(|patch| mutator::update_node_in(conn, patch, now))
                .collect::<StoreResult<Vec<_>>>()
        })?;
        info!(
            "event=nodes_update module=repo status=ok count={}",
            nodes.len()
        );
        Ok(nodes)
    }

    fn delete_nodes(&self, ids: &[NodeId]) -> StoreResult<()> {
        let deleted = mutator::in_transaction(self.conn, |conn| mutator::delete_nodes_in(conn, ids))?;
        info!(
            "event=nodes_delete module=repo status=ok count={}",
            deleted
        );
        Ok(())
    }

    fn resolve_subtree(&self, ids: &[NodeId]) -> StoreResult<BTreeSet<NodeId>> {
        subtree::resolve_subtree(self.conn, ids)
    }

    fn find_shelves(&self) -> StoreResult<Vec<Node>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS}
             FROM nodes
             WHERE type = 'shelf'
             ORDER BY id ASC;"
        ))?;
        let nodes = collect_nodes(stmt.query([])?)?;
        with_tags(self.conn, nodes)
    }

    fn find_shelf(&self, name: &str) -> StoreResult<Option<Node>> {
        let id: Option<NodeId> = self
            .conn
            .query_row(
                "SELECT id
                 FROM nodes
                 WHERE type = 'shelf'
                   AND name_key = ?1;",
                [name_key(name)],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => load_node(self.conn, id),
            None => Ok(None),
        }
    }

    fn find_child_by_name(&self, parent_id: NodeId, name: &str) -> StoreResult<Option<Node>> {
        let id: Option<NodeId> = self
            .conn
            .query_row(
                "SELECT id
                 FROM nodes
                 WHERE parent_id = ?1
                   AND name_key = ?2
                 ORDER BY id ASC
                 LIMIT 1;",
                rusqlite::params![parent_id, name_key(name)],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => load_node(self.conn, id),
            None => Ok(None),
        }
    }

    fn move_nodes(&self, ids: &[NodeId], new_parent_id: NodeId) -> StoreResult<Vec<Node>> {
        let now = super::now_epoch_ms();
        let moved = mutator::in_transaction(self.conn, |conn| {
            mutator::move_nodes_in(conn, ids, new_parent_id, now)
        })?;
        info!(
            "event=nodes_move module=repo status=ok count={} parent_id={}",
            moved.len(),
            new_parent_id
        );
        Ok(moved)
    }

    fn copy_nodes(&self, ids: &[NodeId], new_parent_id: NodeId) -> StoreResult<Vec<Node>> {
        let copies = mutator::in_transaction(self.conn, |conn| {
            mutator::copy_nodes_in(conn, ids, new_parent_id)
        })?;
        info!(
            "event=nodes_copy module=repo status=ok roots={} parent_id={}",
            copies.len(),
            new_parent_id
        );
        Ok(copies)
    }

    fn reorder_children(&self, ordered_ids: &[NodeId]) -> StoreResult<()> {
        let now = super::now_epoch_ms();
        mutator::in_transaction(self.conn, |conn| {
            mutator::reorder_children_in(conn, ordered_ids, now)
        })
    }
}

/// Loads one node with its tags.
pub(crate) fn load_node(conn: &Connection, id: NodeId) -> StoreResult<Option<Node>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NODE_COLUMNS}
         FROM nodes
         WHERE id = ?1;"
    ))?;
    let mut rows = stmt.query([id])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let mut node = parse_node_row(row)?;
    node.tags = load_tags(conn, &[id])?.remove(&id).unwrap_or_default();
    Ok(Some(node))
}

/// Loads one node or fails with `NotFound`.
pub(crate) fn load_required_node(conn: &Connection, id: NodeId) -> StoreResult<Node> {
    load_node(conn, id)?.ok_or(StoreError::NotFound(NodeRef::Id(id)))
}

/// Loads existing nodes among `ids`, ascending by id.
pub(crate) fn load_nodes_by_ids(conn: &Connection, ids: &[NodeId]) -> StoreResult<Vec<Node>> {
    let unique: BTreeSet<NodeId> = ids.iter().copied().collect();
    let unique: Vec<NodeId> = unique.into_iter().collect();
    let mut nodes = Vec::with_capacity(unique.len());
    for chunk in unique.chunks(MAX_BIND_PARAMS) {
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS}
             FROM nodes
             WHERE id IN ({})
             ORDER BY id ASC;",
            sql_placeholders(chunk.len())
        ))?;
        nodes.extend(collect_nodes(stmt.query(params_from_iter(chunk.iter()))?)?);
    }
    with_tags(conn, nodes)
}

/// Drains rows produced by a `NODE_COLUMNS` select. Tags are left empty.
pub(crate) fn collect_nodes(mut rows: rusqlite::Rows<'_>) -> StoreResult<Vec<Node>> {
    let mut nodes = Vec::new();
    while let Some(row) = rows.next()? {
        nodes.push(parse_node_row(row)?);
    }
    Ok(nodes)
}

/// Fills `tags` for every node with one batched read per chunk.
pub(crate) fn with_tags(conn: &Connection, mut nodes: Vec<Node>) -> StoreResult<Vec<Node>> {
    let ids: Vec<NodeId> = nodes.iter().map(|node| node.id).collect();
    let mut tags = load_tags(conn, &ids)?;
    for node in &mut nodes {
        node.tags = tags.remove(&node.id).unwrap_or_default();
    }
    Ok(nodes)
}

fn load_tags(conn: &Connection, ids: &[NodeId]) -> StoreResult<HashMap<NodeId, BTreeSet<String>>> {
    let mut tags: HashMap<NodeId, BTreeSet<String>> = HashMap::new();
    for chunk in ids.chunks(MAX_BIND_PARAMS) {
        let mut stmt = conn.prepare(&format!(
            "SELECT node_id, tag
             FROM node_tags
             WHERE node_id IN ({});",
            sql_placeholders(chunk.len())
        ))?;
        let mut rows = stmt.query(params_from_iter(chunk.iter()))?;
        while let Some(row) = rows.next()? {
            let node_id: NodeId = row.get(0)?;
            let tag: String = row.get(1)?;
            tags.entry(node_id).or_default().insert(tag);
        }
    }
    Ok(tags)
}

fn parse_node_row(row: &Row<'_>) -> StoreResult<Node> {
    let type_text: String = row.get("type")?;
    let kind = NodeType::parse(&type_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid node type `{type_text}` in nodes.type"))
    })?;

    let todo_state = match row.get::<_, Option<String>>("todo_state")? {
        Some(value) => Some(TodoState::parse(&value).ok_or_else(|| {
            StoreError::InvalidData(format!(
                "invalid todo state `{value}` in nodes.todo_state"
            ))
        })?),
        None => None,
    };

    Ok(Node {
        id: row.get("id")?,
        uuid: row.get("uuid")?,
        parent_id: row.get("parent_id")?,
        kind,
        name: row.get("name")?,
        uri: row.get("uri")?,
        tags: BTreeSet::new(),
        pos: row.get("pos")?,
        todo_pos: row.get("todo_pos")?,
        date_added: row.get("date_added")?,
        date_modified: row.get("date_modified")?,
        todo_state,
        todo_date: row.get("todo_date")?,
    })
}
