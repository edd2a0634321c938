//! Transitive descendant resolution over `parent_id` links.
//!
//! # Responsibility
//! - Expand one or more roots into their full subtree id set.
//!
//! # Invariants
//! - Expansion runs level by level with one batched read per level chunk.
//! - Each node is visited at most once, so a corrupted cyclic `parent_id`
//!   graph terminates instead of looping.
//! - Overlapping roots are merged silently; only real cycles are logged.
//! - Reads outside an explicit transaction see no snapshot across levels.

use crate::model::node::{Node, NodeId, NodeRef};
use crate::repo::error::{StoreError, StoreResult};
use crate::repo::node_repo::load_nodes_by_ids;
use crate::repo::{sql_placeholders, MAX_BIND_PARAMS};
use log::warn;
use rusqlite::{params_from_iter, Connection};
use std::collections::{BTreeSet, HashMap};

/// Returns `ids` plus every transitive descendant.
///
/// # Errors
/// - `NotFound` when any root id does not exist.
pub fn resolve_subtree(conn: &Connection, ids: &[NodeId]) -> StoreResult<BTreeSet<NodeId>> {
    let walk = walk_subtree(conn, ids)?;
    for (child_id, parent_id) in &walk.cycle_links {
        warn!(
            "event=subtree_cycle module=query status=skipped node_id={} parent_id={}",
            child_id, parent_id
        );
    }
    Ok(walk.members)
}

struct SubtreeWalk {
    members: BTreeSet<NodeId>,
    /// `(child_id, parent_id)` links that lead a root back into itself.
    cycle_links: Vec<(NodeId, NodeId)>,
}

/// Only roots can be reached twice, since every node has one parent. A
/// revisited root is a cycle when the parent that reached it descends from
/// that same root; otherwise the roots merely overlap.
fn walk_subtree(conn: &Connection, ids: &[NodeId]) -> StoreResult<SubtreeWalk> {
    let roots: BTreeSet<NodeId> = ids.iter().copied().collect();
    let roots_vec: Vec<NodeId> = roots.iter().copied().collect();
    let found: BTreeSet<NodeId> = load_nodes_by_ids(conn, &roots_vec)?
        .into_iter()
        .map(|node| node.id)
        .collect();
    if let Some(missing) = roots.difference(&found).next() {
        return Err(StoreError::NotFound(NodeRef::Id(*missing)));
    }

    let mut members = roots;
    let mut reached_from: HashMap<NodeId, NodeId> = HashMap::new();
    let mut cycle_links = Vec::new();
    let mut frontier = roots_vec;
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for (child_id, parent_id) in children_of(conn, &frontier)? {
            if members.insert(child_id) {
                reached_from.insert(child_id, parent_id);
                next.push(child_id);
            } else if origin_root(&reached_from, parent_id) == child_id {
                cycle_links.push((child_id, parent_id));
            }
        }
        frontier = next;
    }
    Ok(SubtreeWalk {
        members,
        cycle_links,
    })
}

fn origin_root(reached_from: &HashMap<NodeId, NodeId>, mut id: NodeId) -> NodeId {
    while let Some(&parent_id) = reached_from.get(&id) {
        id = parent_id;
    }
    id
}

/// Loads the nodes of every subtree rooted at `ids`, ascending by id.
pub fn query_full_subtree(conn: &Connection, ids: &[NodeId]) -> StoreResult<Vec<Node>> {
    let members: Vec<NodeId> = resolve_subtree(conn, ids)?.into_iter().collect();
    load_nodes_by_ids(conn, &members)
}

/// Direct children of every parent in `parents` as `(child_id, parent_id)`.
fn children_of(conn: &Connection, parents: &[NodeId]) -> StoreResult<Vec<(NodeId, NodeId)>> {
    let mut children = Vec::new();
    for chunk in parents.chunks(MAX_BIND_PARAMS) {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, parent_id
             FROM nodes
             WHERE parent_id IN ({})
             ORDER BY id ASC;",
            sql_placeholders(chunk.len())
        ))?;
        let mut rows = stmt.query(params_from_iter(chunk.iter()))?;
        while let Some(row) = rows.next()? {
            children.push((row.get(0)?, row.get(1)?));
        }
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::{resolve_subtree, walk_subtree};
    use crate::db::open_db_in_memory;
    use crate::model::node::DEFAULT_SHELF_ID;
    use rusqlite::params;
    use std::collections::BTreeSet;

    fn insert_raw(conn: &rusqlite::Connection, id: i64, parent_id: i64) {
        conn.execute(
            "INSERT INTO nodes (id, uuid, parent_id, type, name, date_added, date_modified)
             VALUES (?1, ?2, ?3, 'group', 'g', 0, 0);",
            params![id, format!("raw-{id}"), parent_id],
        )
        .unwrap();
    }

    #[test]
    fn cyclic_parent_links_terminate() {
        let conn = open_db_in_memory().unwrap();
        insert_raw(&conn, 10, DEFAULT_SHELF_ID);
        insert_raw(&conn, 11, 10);
        insert_raw(&conn, 12, 11);
        // Corrupt the tree: 10 now hangs below its own descendant.
        conn.execute("UPDATE nodes SET parent_id = 12 WHERE id = 10;", [])
            .unwrap();

        let resolved = resolve_subtree(&conn, &[10]).unwrap();
        assert_eq!(resolved, BTreeSet::from([10, 11, 12]));
        assert_eq!(walk_subtree(&conn, &[10]).unwrap().cycle_links, vec![(10, 12)]);
    }

    #[test]
    fn overlapping_roots_are_deduplicated() {
        let conn = open_db_in_memory().unwrap();
        insert_raw(&conn, 10, DEFAULT_SHELF_ID);
        insert_raw(&conn, 11, 10);

        let resolved = resolve_subtree(&conn, &[11, 10, DEFAULT_SHELF_ID]).unwrap();
        assert_eq!(resolved, BTreeSet::from([DEFAULT_SHELF_ID, 10, 11]));
        assert!(walk_subtree(&conn, &[11, 10, DEFAULT_SHELF_ID])
            .unwrap()
            .cycle_links
            .is_empty());
    }
}
