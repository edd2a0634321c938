//! Domain model for the bookmark/archive tree.
//!
//! # Responsibility
//! - Define canonical node, blob and index records used by the store.
//! - Keep shape-level validation next to the data it guards.
//!
//! # Invariants
//! - Every node is identified by a store-assigned `NodeId` and a stable uuid.
//! - Deletion is a hard delete; blob and index rows go with their node.

pub mod node;
pub mod payload;
