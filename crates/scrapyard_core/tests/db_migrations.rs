use rusqlite::Connection;
use scrapyard_core::db::migrations::latest_version;
use scrapyard_core::db::{open_db, open_db_in_memory, DbError};
use scrapyard_core::{Storage, StoreError, DEFAULT_SHELF_ID, DEFAULT_SHELF_NAME, DEFAULT_SHELF_UUID};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in ["nodes", "node_tags", "blobs", "node_index", "node_index_words"] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn default_shelf_is_seeded_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scrapyard.db");

    drop(open_db(&path).unwrap());
    let conn = open_db(&path).unwrap();

    let (id, uuid, name, pos): (i64, String, String, i64) = conn
        .query_row(
            "SELECT id, uuid, name, pos FROM nodes WHERE type = 'shelf';",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(id, DEFAULT_SHELF_ID);
    assert_eq!(uuid, DEFAULT_SHELF_UUID);
    assert_eq!(name, DEFAULT_SHELF_NAME);
    assert_eq!(pos, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn foreign_keys_are_enabled() {
    let conn = open_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);
}

#[test]
fn node_repository_rejects_stale_schema_version() {
    let storage = Storage::open_in_memory().unwrap();
    storage
        .conn()
        .execute_batch("PRAGMA user_version = 0;")
        .unwrap();

    let err = scrapyard_core::repo::node_repo::SqliteNodeRepository::try_new(storage.conn())
        .err()
        .unwrap();
    assert!(matches!(
        err,
        StoreError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "missing table {table_name}");
}
