//! Shelf and group lookup by case-insensitive name.
//!
//! # Responsibility
//! - Resolve shelves and direct children by canonical name key.
//! - Create shelves while keeping shelf names unique per key.
//!
//! # Invariants
//! - Shelf names are unique by `name_key` (trimmed lowercase), so lookups
//!   are deterministic.
//! - Among same-key siblings, group lookup returns the lowest id.

use crate::model::node::{NewNode, Node, NodeId};
use crate::repo::error::{StoreError, StoreResult};
use crate::repo::node_repo::NodeRepository;
use log::info;

/// Shelf registry facade over a node repository.
pub struct ShelfRegistry<R: NodeRepository> {
    repo: R,
}

impl<R: NodeRepository> ShelfRegistry<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Lists every shelf in id order.
    pub fn find_shelves(&self) -> StoreResult<Vec<Node>> {
        self.repo.find_shelves()
    }

    /// Finds the shelf named `name`, ignoring case and surrounding spaces.
    pub fn find_shelf(&self, name: &str) -> StoreResult<Option<Node>> {
        self.repo.find_shelf(name)
    }

    /// Finds the direct child of `parent_id` named `name`, ignoring case.
    pub fn find_group(&self, parent_id: NodeId, name: &str) -> StoreResult<Option<Node>> {
        self.repo.find_child_by_name(parent_id, name)
    }

    /// Creates a shelf.
    ///
    /// # Errors
    /// - `Conflict` when a shelf with the same canonical name exists.
    pub fn create_shelf(&self, name: &str) -> StoreResult<Node> {
        let name = name.trim();
        if self.repo.find_shelf(name)?.is_some() {
            return Err(StoreError::Conflict(format!("shelf already exists: {name}")));
        }
        let shelf = self.repo.create_node(&NewNode::shelf(name), true)?;
        info!(
            "event=shelf_create module=service status=ok node_id={}",
            shelf.id
        );
        Ok(shelf)
    }

    /// Returns the shelf named `name`, creating it when missing.
    pub fn get_or_create_shelf(&self, name: &str) -> StoreResult<Node> {
        match self.repo.find_shelf(name)? {
            Some(shelf) => Ok(shelf),
            None => self.create_shelf(name),
        }
    }
}
