//! Tree-aware read paths: subtree resolution and filtered node queries.
//!
//! # Responsibility
//! - Resolve transitive descendants with batched per-level reads.
//! - Compose predicate filters over the node table.

pub mod engine;
pub mod subtree;
