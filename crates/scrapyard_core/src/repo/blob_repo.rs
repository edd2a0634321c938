//! Archived payload repository.
//!
//! # Responsibility
//! - Store and fetch the single blob owned by a node.
//!
//! # Invariants
//! - Storing replaces any previous blob for the same node.
//! - Blob rows are removed only through `delete_nodes` cascades.

use crate::model::node::{NodeId, NodeRef};
use crate::model::payload::{Blob, BlobData, NewBlob};
use crate::repo::error::{map_write_error, StoreError, StoreResult};
use crate::repo::schema::ensure_store_ready;
use log::debug;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Repository interface for blob operations.
pub trait BlobRepository {
    /// Stores `blob` for an existing node, replacing any previous payload.
    fn store_blob(&self, node_id: NodeId, blob: &NewBlob) -> StoreResult<Blob>;
    /// Fetches the blob owned by the referenced node.
    fn fetch_blob(&self, node: &NodeRef) -> StoreResult<Option<Blob>>;
}

/// SQLite-backed blob repository.
pub struct SqliteBlobRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBlobRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self { conn })
    }
}

impl BlobRepository for SqliteBlobRepository<'_> {
    fn store_blob(&self, node_id: NodeId, blob: &NewBlob) -> StoreResult<Blob> {
        if !node_exists(self.conn, node_id)? {
            return Err(StoreError::NotFound(NodeRef::Id(node_id)));
        }

        let (kind, data, byte_length) = match &blob.data {
            BlobData::Text(text) => ("text", Value::Text(text.clone()), None),
            BlobData::Binary(bytes) => (
                "binary",
                Value::Blob(bytes.clone()),
                Some(bytes.len() as i64),
            ),
        };

        self.conn
            .execute(
                "INSERT INTO blobs (node_id, kind, data, media_type, byte_length)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(node_id) DO UPDATE SET
                    kind = excluded.kind,
                    data = excluded.data,
                    media_type = excluded.media_type,
                    byte_length = excluded.byte_length;",
                params![node_id, kind, data, blob.media_type.as_deref(), byte_length],
            )
            .map_err(map_write_error)?;

        debug!(
            "event=blob_store module=repo status=ok node_id={} kind={} size={}",
            node_id,
            kind,
            blob.data.len()
        );
        load_blob(self.conn, node_id)?.ok_or(StoreError::NotFound(NodeRef::Id(node_id)))
    }

    fn fetch_blob(&self, node: &NodeRef) -> StoreResult<Option<Blob>> {
        let node_id = match node {
            NodeRef::Id(id) => *id,
            NodeRef::Uuid(uuid) => {
                let id: Option<NodeId> = self
                    .conn
                    .query_row("SELECT id FROM nodes WHERE uuid = ?1;", [uuid], |row| {
                        row.get(0)
                    })
                    .optional()?;
                match id {
                    Some(id) => id,
                    None => return Ok(None),
                }
            }
        };
        load_blob(self.conn, node_id)
    }
}

fn load_blob(conn: &Connection, node_id: NodeId) -> StoreResult<Option<Blob>> {
    let mut stmt = conn.prepare(
        "SELECT id, node_id, kind, data, media_type, byte_length
         FROM blobs
         WHERE node_id = ?1;",
    )?;
    let mut rows = stmt.query([node_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(parse_blob_row(row)?)),
        None => Ok(None),
    }
}

fn parse_blob_row(row: &Row<'_>) -> StoreResult<Blob> {
    let kind: String = row.get("kind")?;
    let data = match kind.as_str() {
        "text" => BlobData::Text(row.get("data")?),
        "binary" => BlobData::Binary(row.get("data")?),
        other => {
            return Err(StoreError::InvalidData(format!(
                "invalid blob kind `{other}` in blobs.kind"
            )));
        }
    };

    Ok(Blob {
        id: row.get("id")?,
        node_id: row.get("node_id")?,
        data,
        media_type: row.get("media_type")?,
        byte_length: row.get("byte_length")?,
    })
}

fn node_exists(conn: &Connection, node_id: NodeId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1);",
        [node_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
