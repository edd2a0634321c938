//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for nodes, blobs and
//!   index entries.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Multi-row writes run inside one immediate transaction.
//! - Repository APIs return semantic errors (`NotFound`, `Validation`,
//!   `Conflict`) in addition to DB transport errors.

pub mod blob_repo;
pub mod error;
pub mod index_repo;
pub mod mutator;
pub mod node_repo;
pub mod schema;

use std::time::{SystemTime, UNIX_EPOCH};

/// Upper bound on bound parameters per `IN (...)` statement.
pub(crate) const MAX_BIND_PARAMS: usize = 500;

/// Returns `?, ?, ...` with `count` placeholders.
pub(crate) fn sql_placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{now_epoch_ms, sql_placeholders};

    #[test]
    fn placeholders_are_comma_separated() {
        assert_eq!(sql_placeholders(1), "?");
        assert_eq!(sql_placeholders(3), "?, ?, ?");
    }

    #[test]
    fn clock_is_after_2020() {
        assert!(now_epoch_ms() > 1_577_836_800_000);
    }
}
