//! Transactional multi-row writes over nodes, blobs and index entries.
//!
//! # Responsibility
//! - Run batches of node writes inside one immediate transaction.
//! - Cascade deletes in blob -> index -> node order.
//! - Enforce tree invariants (parent kind, no cycles) at write time.
//!
//! # Invariants
//! - A batch either commits fully or leaves no visible change.
//! - Within `update_node_in` batches, later patches for the same id win.
//! - Deleting a node never deletes its descendants.

use crate::model::node::{
    name_key, normalize_tags, validate_shape, NewNode, Node, NodeId, NodePatch, NodeRef,
    NodeValidationError,
};
use crate::query::subtree;
use crate::repo::error::{map_write_error, StoreError, StoreResult};
use crate::repo::node_repo::{load_nodes_by_ids, load_required_node};
use crate::repo::{now_epoch_ms, sql_placeholders, MAX_BIND_PARAMS};
use log::warn;
use rusqlite::{params, params_from_iter, Connection, Transaction, TransactionBehavior};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Runs `work` inside an immediate transaction, or inside a savepoint of
/// the caller's transaction when one is already open on `conn`.
///
/// A failed nested `work` rolls back to its savepoint, so the caller's
/// transaction keeps none of its partial writes.
pub fn in_transaction<T, F>(conn: &Connection, work: F) -> StoreResult<T>
where
    F: FnOnce(&Connection) -> StoreResult<T>,
{
    if !conn.is_autocommit() {
        return in_savepoint(conn, work);
    }

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let value = work(&tx)?;
    tx.commit()?;
    Ok(value)
}

fn in_savepoint<T, F>(conn: &Connection, work: F) -> StoreResult<T>
where
    F: FnOnce(&Connection) -> StoreResult<T>,
{
    conn.execute_batch("SAVEPOINT store_batch;")?;
    match work(conn) {
        Ok(value) => {
            conn.execute_batch("RELEASE store_batch;")?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) =
                conn.execute_batch("ROLLBACK TO store_batch; RELEASE store_batch;")
            {
                warn!(
                    "event=savepoint_rollback module=repo status=error error={}",
                    rollback_err
                );
            }
            Err(err)
        }
    }
}

/// Inserts one node with fresh identity and timestamps.
pub(crate) fn insert_node(conn: &Connection, datum: &NewNode, reset_order: bool) -> StoreResult<Node> {
    datum.validate()?;
    if let Some(parent_id) = datum.parent_id {
        ensure_parent_accepts_children(conn, parent_id)?;
    }

    let (pos, todo_pos) = if reset_order {
        (1, 1)
    } else {
        (datum.pos.unwrap_or(1), datum.todo_pos.unwrap_or(1))
    };
    let now = now_epoch_ms();
    let uuid = Uuid::new_v4().to_string();

    conn.execute(
        "INSERT INTO nodes (
            uuid,
            parent_id,
            type,
            name,
            name_key,
            uri,
            pos,
            todo_pos,
            date_added,
            date_modified,
            todo_state,
            todo_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, ?10, ?11);",
        params![
            uuid,
            datum.parent_id,
            datum.kind.as_str(),
            datum.name.as_str(),
            name_key(&datum.name),
            datum.uri.as_deref(),
            pos,
            todo_pos,
            now,
            datum.todo_state.map(|state| state.as_str()),
            datum.todo_date.as_deref(),
        ],
    )
    .map_err(map_write_error)?;

    let id = conn.last_insert_rowid();
    let tags = normalize_tags(datum.tags.as_slice());
    replace_tags(conn, id, &tags)?;

    Ok(Node {
        id,
        uuid,
        parent_id: datum.parent_id,
        kind: datum.kind,
        name: datum.name.clone(),
        uri: datum.uri.clone(),
        tags,
        pos,
        todo_pos,
        date_added: now,
        date_modified: now,
        todo_state: datum.todo_state,
        todo_date: datum.todo_date.clone(),
    })
}

/// Merges one patch over the stored node and persists the result.
pub(crate) fn update_node_in(conn: &Connection, patch: &NodePatch, now: i64) -> StoreResult<Node> {
    let existing = load_required_node(conn, patch.id)?;
    let mut merged = patch.merge_into(&existing);
    validate_shape(merged.kind, merged.parent_id, &merged.name)?;

    if merged.parent_id != existing.parent_id {
        if let Some(parent_id) = merged.parent_id {
            ensure_parent_accepts_children(conn, parent_id)?;
            ensure_no_cycle(conn, merged.id, parent_id)?;
        }
    }
    if existing.kind.is_container() && !merged.kind.is_container() && has_children(conn, merged.id)?
    {
        return Err(NodeValidationError::LeafWithChildren(merged.id).into());
    }

    merged.date_modified = now.max(existing.date_modified + 1);
    conn.execute(
        "UPDATE nodes
         SET parent_id = ?2,
             type = ?3,
             name = ?4,
             name_key = ?5,
             uri = ?6,
             pos = ?7,
             todo_pos = ?8,
             date_modified = ?9,
             todo_state = ?10,
             todo_date = ?11
         WHERE id = ?1;",
        params![
            merged.id,
            merged.parent_id,
            merged.kind.as_str(),
            merged.name.as_str(),
            name_key(&merged.name),
            merged.uri.as_deref(),
            merged.pos,
            merged.todo_pos,
            merged.date_modified,
            merged.todo_state.map(|state| state.as_str()),
            merged.todo_date.as_deref(),
        ],
    )
    .map_err(map_write_error)?;

    if patch.tags.is_some() {
        replace_tags(conn, merged.id, &merged.tags)?;
    }
    Ok(merged)
}

/// Deletes blob, index and node rows for `ids`, in that order.
///
/// Returns the number of deleted nodes. Fails with `NotFound` on the first
/// missing id, before anything is deleted.
pub(crate) fn delete_nodes_in(conn: &Connection, ids: &[NodeId]) -> StoreResult<usize> {
    let unique: Vec<NodeId> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
    let existing: BTreeSet<NodeId> = load_nodes_by_ids(conn, &unique)?
        .into_iter()
        .map(|node| node.id)
        .collect();
    if let Some(missing) = unique.iter().find(|id| !existing.contains(*id)) {
        return Err(StoreError::NotFound(NodeRef::Id(*missing)));
    }

    for chunk in unique.chunks(MAX_BIND_PARAMS) {
        let placeholders = sql_placeholders(chunk.len());
        conn.execute(
            &format!("DELETE FROM blobs WHERE node_id IN ({placeholders});"),
            params_from_iter(chunk.iter()),
        )?;
        conn.execute(
            &format!("DELETE FROM node_index WHERE node_id IN ({placeholders});"),
            params_from_iter(chunk.iter()),
        )?;
    }
    let mut deleted = 0;
    for chunk in unique.chunks(MAX_BIND_PARAMS) {
        deleted += conn.execute(
            &format!(
                "DELETE FROM nodes WHERE id IN ({});",
                sql_placeholders(chunk.len())
            ),
            params_from_iter(chunk.iter()),
        )?;
    }
    Ok(deleted)
}

/// Re-parents `ids` under `new_parent_id`, appending after existing siblings.
pub(crate) fn move_nodes_in(
    conn: &Connection,
    ids: &[NodeId],
    new_parent_id: NodeId,
    now: i64,
) -> StoreResult<Vec<Node>> {
    ensure_parent_accepts_children(conn, new_parent_id)?;
    let mut next_pos = next_child_pos(conn, new_parent_id)?;
    let mut moved = Vec::with_capacity(ids.len());
    for &id in ids {
        let mut patch = NodePatch::new(id);
        patch.parent_id = Some(new_parent_id);
        patch.pos = Some(next_pos);
        moved.push(update_node_in(conn, &patch, now)?);
        next_pos += 1;
    }
    Ok(moved)
}

/// Deep-copies each subtree rooted at `ids` under `new_parent_id`.
///
/// Returns the copied roots. Roots already covered by an earlier root's
/// subtree are skipped so nothing is copied twice.
pub(crate) fn copy_nodes_in(
    conn: &Connection,
    ids: &[NodeId],
    new_parent_id: NodeId,
) -> StoreResult<Vec<Node>> {
    ensure_parent_accepts_children(conn, new_parent_id)?;
    let mut next_pos = next_child_pos(conn, new_parent_id)?;
    let mut copied: BTreeSet<NodeId> = BTreeSet::new();
    let mut roots = Vec::new();

    for &root_id in ids {
        if copied.contains(&root_id) {
            continue;
        }
        let members = subtree::resolve_subtree(conn, &[root_id])?;
        let snapshot = load_nodes_by_ids(conn, &members.iter().copied().collect::<Vec<_>>())?;
        let by_id: HashMap<NodeId, &Node> = snapshot.iter().map(|node| (node.id, node)).collect();

        let mut id_map: HashMap<NodeId, NodeId> = HashMap::new();
        let mut frontier = vec![root_id];
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for old_id in frontier {
                let Some(source) = by_id.get(&old_id) else {
                    continue;
                };
                let (parent_id, pos) = if old_id == root_id {
                    (new_parent_id, next_pos)
                } else {
                    match source.parent_id.and_then(|parent| id_map.get(&parent)) {
                        Some(&mapped) => (mapped, source.pos),
                        None => continue,
                    }
                };
                let copy = insert_node(conn, &copy_datum(source, parent_id, pos), false)?;
                copy_payload(conn, old_id, copy.id)?;
                id_map.insert(old_id, copy.id);
                copied.insert(old_id);
                if old_id == root_id {
                    roots.push(copy);
                }
                next.extend(
                    snapshot
                        .iter()
                        .filter(|node| node.parent_id == Some(old_id) && !id_map.contains_key(&node.id))
                        .map(|node| node.id),
                );
            }
            frontier = next;
        }
        next_pos += 1;
    }
    Ok(roots)
}

/// Rewrites `pos` as 1..N following `ordered_ids`. All ids must share a
/// parent and appear once.
pub(crate) fn reorder_children_in(
    conn: &Connection,
    ordered_ids: &[NodeId],
    now: i64,
) -> StoreResult<()> {
    let mut seen = BTreeSet::new();
    if let Some(&duplicate) = ordered_ids.iter().find(|&&id| !seen.insert(id)) {
        return Err(NodeValidationError::DuplicateId(duplicate).into());
    }

    let nodes = load_nodes_by_ids(conn, ordered_ids)?;
    let parents: HashMap<NodeId, Option<NodeId>> =
        nodes.iter().map(|node| (node.id, node.parent_id)).collect();
    let mut shared_parent: Option<Option<NodeId>> = None;
    for id in ordered_ids {
        let parent = *parents
            .get(id)
            .ok_or(StoreError::NotFound(NodeRef::Id(*id)))?;
        match shared_parent {
            None => shared_parent = Some(parent),
            Some(expected) if expected != parent => {
                return Err(NodeValidationError::NotSiblings(*id).into());
            }
            Some(_) => {}
        }
    }

    for (index, id) in ordered_ids.iter().enumerate() {
        conn.execute(
            "UPDATE nodes
             SET pos = ?2,
                 date_modified = MAX(date_modified + 1, ?3)
             WHERE id = ?1;",
            params![id, index as i64 + 1, now],
        )?;
    }
    Ok(())
}

fn copy_datum(source: &Node, parent_id: NodeId, pos: i64) -> NewNode {
    NewNode {
        parent_id: Some(parent_id),
        kind: source.kind,
        name: source.name.clone(),
        uri: source.uri.clone(),
        tags: source.tags.iter().cloned().collect(),
        pos: Some(pos),
        todo_pos: Some(source.todo_pos),
        todo_state: source.todo_state,
        todo_date: source.todo_date.clone(),
    }
}

fn copy_payload(conn: &Connection, from: NodeId, to: NodeId) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO blobs (node_id, kind, data, media_type, byte_length)
         SELECT ?2, kind, data, media_type, byte_length
         FROM blobs
         WHERE node_id = ?1;",
        params![from, to],
    )?;
    let inserted = conn.execute(
        "INSERT INTO node_index (node_id)
         SELECT ?2
         FROM node_index
         WHERE node_id = ?1;",
        params![from, to],
    )?;
    if inserted > 0 {
        let entry_id = conn.last_insert_rowid();
        conn.execute(
            "INSERT INTO node_index_words (entry_id, word)
             SELECT ?2, w.word
             FROM node_index_words w
             INNER JOIN node_index i ON i.id = w.entry_id
             WHERE i.node_id = ?1;",
            params![from, entry_id],
        )?;
    }
    Ok(())
}

fn replace_tags(conn: &Connection, node_id: NodeId, tags: &BTreeSet<String>) -> StoreResult<()> {
    conn.execute("DELETE FROM node_tags WHERE node_id = ?1;", [node_id])?;
    for tag in tags {
        conn.execute(
            "INSERT OR IGNORE INTO node_tags (node_id, tag) VALUES (?1, ?2);",
            params![node_id, tag],
        )?;
    }
    Ok(())
}

fn ensure_parent_accepts_children(conn: &Connection, parent_id: NodeId) -> StoreResult<()> {
    let parent = match load_required_node(conn, parent_id) {
        Ok(parent) => parent,
        Err(StoreError::NotFound(_)) => {
            return Err(NodeValidationError::ParentNotFound(parent_id).into());
        }
        Err(other) => return Err(other),
    };
    if !parent.kind.is_container() {
        return Err(NodeValidationError::ParentNotContainer {
            parent_id,
            kind: parent.kind,
        }
        .into());
    }
    Ok(())
}

fn ensure_no_cycle(conn: &Connection, node_id: NodeId, parent_id: NodeId) -> StoreResult<()> {
    if node_id == parent_id || subtree::resolve_subtree(conn, &[node_id])?.contains(&parent_id) {
        warn!(
            "event=node_move module=repo status=rejected reason=cycle node_id={} parent_id={}",
            node_id, parent_id
        );
        return Err(NodeValidationError::CycleDetected { node_id, parent_id }.into());
    }
    Ok(())
}

fn has_children(conn: &Connection, node_id: NodeId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM nodes WHERE parent_id = ?1);",
        [node_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn next_child_pos(conn: &Connection, parent_id: NodeId) -> StoreResult<i64> {
    let next = conn.query_row(
        "SELECT COALESCE(MAX(pos), 0) + 1
         FROM nodes
         WHERE parent_id = ?1;",
        [parent_id],
        |row| row.get(0),
    )?;
    Ok(next)
}
