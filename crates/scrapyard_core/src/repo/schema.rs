//! Readiness checks run before a repository touches a connection.

use crate::db::migrations::latest_version;
use crate::repo::error::{StoreError, StoreResult};
use rusqlite::Connection;

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "nodes",
        &[
            "id",
            "uuid",
            "parent_id",
            "type",
            "name",
            "name_key",
            "uri",
            "pos",
            "todo_pos",
            "date_added",
            "date_modified",
            "todo_state",
            "todo_date",
        ],
    ),
    ("node_tags", &["node_id", "tag"]),
    (
        "blobs",
        &["id", "node_id", "kind", "data", "media_type", "byte_length"],
    ),
    ("node_index", &["id", "node_id"]),
    ("node_index_words", &["entry_id", "word"]),
];

/// Verifies schema version, tables and columns required by the store.
pub fn ensure_store_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &(table, columns) in REQUIRED_COLUMNS {
        if !table_exists(conn, table)? {
            return Err(StoreError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(StoreError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
