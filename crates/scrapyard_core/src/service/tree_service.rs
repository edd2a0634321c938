//! Bookmark tree use-case service.
//!
//! # Responsibility
//! - Provide group, bookmark, archive and separator creation.
//! - Provide rename, move, copy, reorder, todo and subtree-delete operations.
//!
//! # Invariants
//! - Names are trimmed before they reach the repository.
//! - `create_group` is idempotent per parent and case-insensitive name.
//! - Multi-step operations are atomic only when the caller runs them inside
//!   `in_transaction`; `Storage` does so for every entry point.

use crate::model::node::{
    name_key, NewNode, Node, NodeId, NodePatch, NodeType, TodoState, DEFAULT_SHELF_ID,
};
use crate::model::payload::NewBlob;
use crate::repo::blob_repo::BlobRepository;
use crate::repo::error::{StoreError, StoreResult};
use crate::repo::node_repo::NodeRepository;
use log::info;
use std::collections::BTreeSet;

/// Bookmark tree service facade.
pub struct TreeService<N: NodeRepository, B: BlobRepository> {
    nodes: N,
    blobs: B,
}

impl<N: NodeRepository, B: BlobRepository> TreeService<N, B> {
    /// Creates service from repository implementations.
    pub fn new(nodes: N, blobs: B) -> Self {
        Self { nodes, blobs }
    }

    /// Returns the group named `name` under `parent_id`, creating it when
    /// missing.
    pub fn create_group(&self, parent_id: NodeId, name: &str) -> StoreResult<Node> {
        let key = name_key(name);
        let existing = self
            .nodes
            .get_children(parent_id)?
            .into_iter()
            .filter(|child| child.kind == NodeType::Group && name_key(&child.name) == key)
            .min_by_key(|child| child.id);
        if let Some(existing) = existing {
            return Ok(existing);
        }
        self.nodes
            .create_node(&NewNode::group(parent_id, name.trim()), true)
    }

    /// Creates a bookmark under a container.
    pub fn add_bookmark(
        &self,
        parent_id: NodeId,
        name: &str,
        uri: &str,
        tags: &[String],
    ) -> StoreResult<Node> {
        let datum = NewNode::bookmark(parent_id, name.trim(), uri.trim()).with_tags(tags);
        self.nodes.create_node(&datum, true)
    }

    /// Creates an archive node and stores its payload.
    pub fn add_archive(
        &self,
        parent_id: NodeId,
        name: &str,
        uri: &str,
        tags: &[String],
        payload: &NewBlob,
    ) -> StoreResult<Node> {
        let datum = NewNode::archive(parent_id, name.trim(), uri.trim()).with_tags(tags);
        let node = self.nodes.create_node(&datum, true)?;
        self.blobs.store_blob(node.id, payload)?;
        info!(
            "event=archive_add module=service status=ok node_id={} size={}",
            node.id,
            payload.data.len()
        );
        Ok(node)
    }

    /// Appends a separator after the current last child of `parent_id`.
    pub fn add_separator(&self, parent_id: NodeId) -> StoreResult<Node> {
        let next_pos = self
            .nodes
            .get_children(parent_id)?
            .iter()
            .map(|child| child.pos)
            .max()
            .map_or(1, |pos| pos + 1);
        let mut datum = NewNode::separator(parent_id);
        datum.pos = Some(next_pos);
        self.nodes.create_node(&datum, false)
    }

    /// Renames one node.
    pub fn rename_node(&self, id: NodeId, name: &str) -> StoreResult<Node> {
        let mut patch = NodePatch::new(id);
        patch.name = Some(name.trim().to_string());
        self.nodes.update_node(&patch)
    }

    /// Moves nodes under a new container, appended after its children.
    pub fn move_nodes(&self, ids: &[NodeId], new_parent_id: NodeId) -> StoreResult<Vec<Node>> {
        self.nodes.move_nodes(ids, new_parent_id)
    }

    /// Deep-copies nodes with their subtrees and payloads under a container.
    pub fn copy_nodes(&self, ids: &[NodeId], new_parent_id: NodeId) -> StoreResult<Vec<Node>> {
        self.nodes.copy_nodes(ids, new_parent_id)
    }

    /// Assigns `pos` 1..N to siblings following the given order.
    pub fn reorder_nodes(&self, ordered_ids: &[NodeId]) -> StoreResult<()> {
        self.nodes.reorder_children(ordered_ids)
    }

    /// Sets or clears the todo state of each listed node.
    pub fn set_todo_state(&self, states: &[(NodeId, Option<TodoState>)]) -> StoreResult<Vec<Node>> {
        let patches: Vec<NodePatch> = states
            .iter()
            .map(|&(id, state)| {
                let mut patch = NodePatch::new(id);
                patch.todo_state = Some(state);
                if state.is_none() {
                    patch.todo_date = Some(None);
                }
                patch
            })
            .collect();
        self.nodes.update_nodes(&patches)
    }

    /// Deletes the given nodes and all of their descendants.
    ///
    /// Returns the set of removed ids. The default shelf is refused here;
    /// raw `delete_nodes` still accepts it.
    pub fn delete_subtree(&self, ids: &[NodeId]) -> StoreResult<BTreeSet<NodeId>> {
        let doomed = self.nodes.resolve_subtree(ids)?;
        if doomed.contains(&DEFAULT_SHELF_ID) {
            return Err(StoreError::Conflict(
                "the default shelf cannot be deleted".to_string(),
            ));
        }
        let doomed_ids: Vec<NodeId> = doomed.iter().copied().collect();
        self.nodes.delete_nodes(&doomed_ids)?;
        info!(
            "event=subtree_delete module=service status=ok roots={} removed={}",
            ids.len(),
            doomed_ids.len()
        );
        Ok(doomed)
    }
}

#[cfg(test)]
mod tests {
    use super::TreeService;
    use crate::db::open_db_in_memory;
    use crate::model::node::{NodeType, TodoState, DEFAULT_SHELF_ID};
    use crate::repo::blob_repo::SqliteBlobRepository;
    use crate::repo::error::StoreError;
    use crate::repo::node_repo::{NodeRepository, SqliteNodeRepository};

    #[test]
    fn create_group_reuses_same_name_group() {
        let conn = open_db_in_memory().unwrap();
        let service = TreeService::new(
            SqliteNodeRepository::new(&conn),
            SqliteBlobRepository::new(&conn),
        );

        let first = service.create_group(DEFAULT_SHELF_ID, "Reading").unwrap();
        let second = service.create_group(DEFAULT_SHELF_ID, "  reading ").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.kind, NodeType::Group);
    }

    #[test]
    fn separators_append_after_last_child() {
        let conn = open_db_in_memory().unwrap();
        let service = TreeService::new(
            SqliteNodeRepository::new(&conn),
            SqliteBlobRepository::new(&conn),
        );

        let mut bookmark = service
            .add_bookmark(DEFAULT_SHELF_ID, "a", "https://a.example", &[])
            .unwrap();
        bookmark = service.rename_node(bookmark.id, " A ").unwrap();
        let separator = service.add_separator(DEFAULT_SHELF_ID).unwrap();

        assert_eq!(bookmark.name, "A");
        assert_eq!(separator.kind, NodeType::Separator);
        assert!(separator.pos > bookmark.pos);
    }

    #[test]
    fn clearing_todo_state_drops_todo_date() {
        let conn = open_db_in_memory().unwrap();
        let nodes = SqliteNodeRepository::new(&conn);
        let service = TreeService::new(
            SqliteNodeRepository::new(&conn),
            SqliteBlobRepository::new(&conn),
        );
        let bookmark = service
            .add_bookmark(DEFAULT_SHELF_ID, "task", "https://t.example", &[])
            .unwrap();

        service
            .set_todo_state(&[(bookmark.id, Some(TodoState::Waiting))])
            .unwrap();
        assert_eq!(
            nodes.get_node(bookmark.id).unwrap().unwrap().todo_state,
            Some(TodoState::Waiting)
        );

        let cleared = service.set_todo_state(&[(bookmark.id, None)]).unwrap();
        assert_eq!(cleared[0].todo_state, None);
        assert_eq!(cleared[0].todo_date, None);
    }

    #[test]
    fn default_shelf_is_not_deletable() {
        let conn = open_db_in_memory().unwrap();
        let service = TreeService::new(
            SqliteNodeRepository::new(&conn),
            SqliteBlobRepository::new(&conn),
        );

        let err = service.delete_subtree(&[DEFAULT_SHELF_ID]).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }
}
