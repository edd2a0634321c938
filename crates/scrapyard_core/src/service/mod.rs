//! Use-case services over the node repositories.
//!
//! # Responsibility
//! - Orchestrate repository calls into bookmark-manager operations.
//! - Keep callers decoupled from SQL details.

pub mod shelf_service;
pub mod tree_service;
