//! Word-set index repository.
//!
//! # Responsibility
//! - Persist one word set per node for search acceleration.
//! - Look up nodes by indexed word.
//!
//! # Invariants
//! - Words are stored lowercase and deduplicated.
//! - At most one entry per node; storing replaces the previous word set.

use crate::model::node::{NodeId, NodeRef};
use crate::model::payload::IndexEntry;
use crate::repo::error::{StoreError, StoreResult};
use crate::repo::mutator::in_transaction;
use crate::repo::schema::ensure_store_ready;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;

static WORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{L}\p{N}_]+").expect("word pattern is valid"));

/// Repository interface for index operations.
pub trait IndexRepository {
    /// Replaces the word set indexed for `node_id`.
    fn store_index(&self, node_id: NodeId, words: &[String]) -> StoreResult<IndexEntry>;
    /// Loads the entry for `node_id`.
    fn fetch_index(&self, node_id: NodeId) -> StoreResult<Option<IndexEntry>>;
    /// Lists node ids whose entry contains `word`, ascending.
    fn search_index(&self, word: &str) -> StoreResult<Vec<NodeId>>;
}

/// SQLite-backed index repository.
pub struct SqliteIndexRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteIndexRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self { conn })
    }
}

impl IndexRepository for SqliteIndexRepository<'_> {
    fn store_index(&self, node_id: NodeId, words: &[String]) -> StoreResult<IndexEntry> {
        let words: BTreeSet<String> = words
            .iter()
            .map(|word| word.trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();

        in_transaction(self.conn, |conn| {
            let exists: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1);",
                [node_id],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(StoreError::NotFound(NodeRef::Id(node_id)));
            }

            conn.execute(
                "INSERT OR IGNORE INTO node_index (node_id) VALUES (?1);",
                [node_id],
            )?;
            let entry_id: i64 = conn.query_row(
                "SELECT id FROM node_index WHERE node_id = ?1;",
                [node_id],
                |row| row.get(0),
            )?;
            conn.execute(
                "DELETE FROM node_index_words WHERE entry_id = ?1;",
                [entry_id],
            )?;
            for word in &words {
                conn.execute(
                    "INSERT INTO node_index_words (entry_id, word) VALUES (?1, ?2);",
                    params![entry_id, word],
                )?;
            }

            Ok(IndexEntry {
                id: entry_id,
                node_id,
                words,
            })
        })
    }

    fn fetch_index(&self, node_id: NodeId) -> StoreResult<Option<IndexEntry>> {
        let entry_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM node_index WHERE node_id = ?1;",
                [node_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(entry_id) = entry_id else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare("SELECT word FROM node_index_words WHERE entry_id = ?1;")?;
        let mut rows = stmt.query([entry_id])?;
        let mut words = BTreeSet::new();
        while let Some(row) = rows.next()? {
            words.insert(row.get::<_, String>(0)?);
        }
        Ok(Some(IndexEntry {
            id: entry_id,
            node_id,
            words,
        }))
    }

    fn search_index(&self, word: &str) -> StoreResult<Vec<NodeId>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.node_id
             FROM node_index_words w
             INNER JOIN node_index i ON i.id = w.entry_id
             WHERE w.word = ?1
             ORDER BY i.node_id ASC;",
        )?;
        let mut rows = stmt.query([word.trim().to_lowercase()])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            ids.push(row.get(0)?);
        }
        Ok(ids)
    }
}

/// Splits free text into a lowercase, deduplicated word list.
pub fn index_words(text: &str) -> Vec<String> {
    WORD_PATTERN
        .find_iter(text)
        .map(|found| found.as_str().to_lowercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
