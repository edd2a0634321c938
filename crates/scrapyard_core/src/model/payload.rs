//! Archived payload and search index records attached 1:1 to nodes.
//!
//! # Invariants
//! - At most one blob and one index entry exist per node.
//! - `byte_length` is set only for binary payloads.

use crate::model::node::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Blob payload body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum BlobData {
    /// Captured page text (HTML or plain).
    Text(String),
    /// Raw bytes, e.g. a saved PDF or image.
    Binary(Vec<u8>),
}

impl BlobData {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Input for storing a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlob {
    pub data: BlobData,
    pub media_type: Option<String>,
}

impl NewBlob {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            data: BlobData::Text(value.into()),
            media_type: None,
        }
    }

    pub fn binary(bytes: impl Into<Vec<u8>>, media_type: Option<String>) -> Self {
        Self {
            data: BlobData::Binary(bytes.into()),
            media_type,
        }
    }
}

/// Persisted blob row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub id: i64,
    pub node_id: NodeId,
    pub data: BlobData,
    pub media_type: Option<String>,
    pub byte_length: Option<i64>,
}

/// Persisted word-set index row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: i64,
    pub node_id: NodeId,
    pub words: BTreeSet<String>,
}
