//! Store-level error taxonomy shared by node, blob and index repositories.

use crate::db::DbError;
use crate::model::node::{NodeRef, NodeValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by store operations.
///
/// Storage failures are propagated unchanged inside `Db`; nothing at this
/// layer retries.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target node of an update, delete or blob write does not exist.
    NotFound(NodeRef),
    /// Write would break a tree invariant.
    Validation(NodeValidationError),
    /// Uniqueness violation (uuid, shelf name, blob/index owner).
    Conflict(String),
    /// Search pattern is not a valid regular expression.
    InvalidQuery { pattern: String, message: String },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(node) => write!(f, "node not found: {node}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Conflict(message) => write!(f, "conflict: {message}"),
            Self::InvalidQuery { pattern, message } => {
                write!(f, "invalid search pattern `{pattern}`: {message}")
            }
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "node store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "node store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "node store requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<NodeValidationError> for StoreError {
    fn from(value: NodeValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Maps write failures, turning unique-constraint violations into `Conflict`.
pub(crate) fn map_write_error(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, message) = &err {
        if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            return StoreError::Conflict(
                message
                    .clone()
                    .unwrap_or_else(|| "unique constraint failed".to_string()),
            );
        }
    }
    StoreError::from(err)
}
