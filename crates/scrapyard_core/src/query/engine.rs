//! Composable filtered queries over the node table.
//!
//! # Responsibility
//! - Combine type, text, scope and tag predicates conjunctively.
//! - Apply optional custom ordering and result limit.
//!
//! # Invariants
//! - `search` is a case-insensitive regular expression matched against
//!   `name` or `uri`.
//! - A tag filter never matches an untagged node.
//! - A present but empty `types` or `tags` list matches nothing.
//! - `limit` bounds the final filtered and ordered result, not the scan.
//! - Without `order = Custom` results come back in ascending id order.

use crate::model::node::{normalize_tags, Node, NodeId, NodeRef, NodeType};
use crate::query::subtree::resolve_subtree;
use crate::repo::error::{StoreError, StoreResult};
use crate::repo::node_repo::{collect_nodes, with_tags, NODE_COLUMNS};
use crate::repo::sql_placeholders;
use log::debug;
use regex::{Regex, RegexBuilder};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;

/// Scope mode relative to the query's scope node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryDepth {
    /// Direct children of the scope node.
    #[serde(rename = "group")]
    Group,
    /// Strict descendants of the scope node.
    #[serde(rename = "subtree")]
    Subtree,
    /// Scope node plus its descendants.
    #[serde(rename = "root+subtree")]
    RootAndSubtree,
}

/// Result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOrder {
    /// Natural storage order (ascending id).
    #[default]
    Natural,
    /// Stable ascending sort by `pos`.
    Custom,
}

/// Query options. Every present filter narrows the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeQuery {
    /// Case-insensitive regex over name or uri. Blank means no filter.
    pub search: Option<String>,
    /// Matches nodes sharing at least one tag. An empty list matches nothing.
    pub tags: Option<Vec<String>>,
    /// Matches nodes whose type is listed. An empty list matches nothing.
    pub types: Option<Vec<NodeType>>,
    /// Requires a scope node; without one the result is empty.
    pub path: bool,
    /// Maximum number of returned nodes.
    pub limit: Option<u32>,
    /// Scope mode, applied only when a scope node is given.
    pub depth: Option<QueryDepth>,
    pub order: QueryOrder,
}

impl NodeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, pattern: impl Into<String>) -> Self {
        self.search = Some(pattern.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn types(mut self, types: impl IntoIterator<Item = NodeType>) -> Self {
        self.types = Some(types.into_iter().collect());
        self
    }

    pub fn depth(mut self, depth: QueryDepth) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn custom_order(mut self) -> Self {
        self.order = QueryOrder::Custom;
        self
    }

    pub fn with_path(mut self) -> Self {
        self.path = true;
        self
    }
}

/// Runs `query` relative to an optional scope node.
///
/// # Errors
/// - `NotFound` when `scope` names a missing node.
/// - `InvalidQuery` when `search` is not a valid regular expression.
pub fn query_nodes(
    conn: &Connection,
    scope: Option<NodeId>,
    query: &NodeQuery,
) -> StoreResult<Vec<Node>> {
    let started_at = Instant::now();
    if query.path && scope.is_none() {
        return Ok(Vec::new());
    }

    let matcher = compile_search(query.search.as_deref())?;
    let scope_filter = match scope {
        Some(scope_id) => build_scope(conn, scope_id, query.depth)?,
        None => ScopeFilter::Any,
    };

    let mut sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE 1 = 1");
    let mut bind_values: Vec<Value> = Vec::new();

    let tag_filter = query
        .tags
        .as_ref()
        .map(|tags| normalize_tags(tags.as_slice()));
    let empty_types = query.types.as_ref().is_some_and(|types| types.is_empty());
    let empty_tags = tag_filter.as_ref().is_some_and(|tags| tags.is_empty());
    if empty_types || empty_tags {
        debug!(
            "event=query_run module=query status=ok reason=empty_filter results=0 duration_ms={}",
            started_at.elapsed().as_millis()
        );
        return Ok(Vec::new());
    }

    if let Some(types) = query.types.as_ref() {
        sql.push_str(&format!(" AND type IN ({})", sql_placeholders(types.len())));
        bind_values.extend(
            types
                .iter()
                .map(|kind| Value::Text(kind.as_str().to_string())),
        );
    }

    if let ScopeFilter::Children(parent_id) = scope_filter {
        sql.push_str(" AND parent_id = ?");
        bind_values.push(Value::Integer(parent_id));
    }

    if let Some(tags) = tag_filter.as_ref() {
        sql.push_str(&format!(
            " AND EXISTS (
                SELECT 1
                FROM node_tags nt
                WHERE nt.node_id = nodes.id
                  AND nt.tag IN ({})
            )",
            sql_placeholders(tags.len())
        ));
        bind_values.extend(tags.iter().map(|tag| Value::Text(tag.clone())));
    }

    sql.push_str(" ORDER BY id ASC;");

    let mut stmt = conn.prepare(&sql)?;
    let candidates = collect_nodes(stmt.query(params_from_iter(bind_values))?)?;

    let mut nodes: Vec<Node> = candidates
        .into_iter()
        .filter(|node| scope_filter.admits(node.id))
        .filter(|node| matcher.as_ref().map_or(true, |rx| matches_text(rx, node)))
        .collect();

    if query.order == QueryOrder::Custom {
        nodes.sort_by_key(|node| node.pos);
    }
    if let Some(limit) = query.limit {
        nodes.truncate(limit as usize);
    }

    let nodes = with_tags(conn, nodes)?;
    debug!(
        "event=query_run module=query status=ok scope={} results={} duration_ms={}",
        scope.map_or_else(|| "none".to_string(), |id| id.to_string()),
        nodes.len(),
        started_at.elapsed().as_millis()
    );
    Ok(nodes)
}

enum ScopeFilter {
    Any,
    Children(NodeId),
    Members(BTreeSet<NodeId>),
}

impl ScopeFilter {
    fn admits(&self, id: NodeId) -> bool {
        match self {
            Self::Any | Self::Children(_) => true,
            Self::Members(members) => members.contains(&id),
        }
    }
}

fn build_scope(
    conn: &Connection,
    scope_id: NodeId,
    depth: Option<QueryDepth>,
) -> StoreResult<ScopeFilter> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1);",
        [scope_id],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(StoreError::NotFound(NodeRef::Id(scope_id)));
    }

    Ok(match depth {
        None => ScopeFilter::Any,
        Some(QueryDepth::Group) => ScopeFilter::Children(scope_id),
        Some(QueryDepth::Subtree) => {
            let mut members = resolve_subtree(conn, &[scope_id])?;
            members.remove(&scope_id);
            ScopeFilter::Members(members)
        }
        Some(QueryDepth::RootAndSubtree) => {
            ScopeFilter::Members(resolve_subtree(conn, &[scope_id])?)
        }
    })
}

fn compile_search(pattern: Option<&str>) -> StoreResult<Option<Regex>> {
    let Some(pattern) = pattern.filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|err| StoreError::InvalidQuery {
            pattern: pattern.to_string(),
            message: err.to_string(),
        })
}

fn matches_text(matcher: &Regex, node: &Node) -> bool {
    matcher.is_match(&node.name) || node.uri.as_deref().is_some_and(|uri| matcher.is_match(uri))
}

#[cfg(test)]
mod tests {
    use super::{compile_search, NodeQuery, QueryDepth, QueryOrder};
    use crate::repo::error::StoreError;

    #[test]
    fn blank_search_disables_text_filter() {
        assert!(compile_search(Some("   ")).unwrap().is_none());
        assert!(compile_search(None).unwrap().is_none());
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = compile_search(Some("(unclosed")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery { pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn search_is_case_insensitive() {
        let rx = compile_search(Some("rust")).unwrap().unwrap();
        assert!(rx.is_match("The RUST Book"));
    }

    #[test]
    fn options_deserialize_from_message_json() {
        let query: NodeQuery = serde_json::from_str(
            r#"{"search":"x","types":["bookmark","archive"],"depth":"root+subtree","order":"custom","limit":5}"#,
        )
        .unwrap();
        assert_eq!(query.depth, Some(QueryDepth::RootAndSubtree));
        assert_eq!(query.order, QueryOrder::Custom);
        assert_eq!(query.limit, Some(5));
        assert!(!query.path);
        assert!(query.tags.is_none());
    }
}
