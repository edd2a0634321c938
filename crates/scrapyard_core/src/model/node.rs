//! Node domain model.
//!
//! # Responsibility
//! - Define the canonical tree record shared by shelves, groups, bookmarks,
//!   archives and separators.
//! - Provide creation and patch shapes consumed by the node repository.
//!
//! # Invariants
//! - `id` and `uuid` are assigned by the store and never change.
//! - Only `NodeType::Shelf` may lack a parent.
//! - Leaf types (`Bookmark`, `Archive`, `Separator`) never have children.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned integer primary key.
pub type NodeId = i64;

/// Reserved id of the shelf seeded on first initialization.
pub const DEFAULT_SHELF_ID: NodeId = 1;
/// Reserved uuid of the shelf seeded on first initialization.
pub const DEFAULT_SHELF_UUID: &str = "1";
/// Name of the shelf seeded on first initialization.
pub const DEFAULT_SHELF_NAME: &str = "default";

/// Node category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Tree root; a whole tree's namespace.
    Shelf,
    /// Folder that can contain other nodes.
    Group,
    /// Link to a URI.
    Bookmark,
    /// Link to a URI with captured content in the blob store.
    Archive,
    /// Visual divider in listings.
    Separator,
}

impl NodeType {
    /// Returns whether nodes of this type may have children.
    pub fn is_container(self) -> bool {
        matches!(self, Self::Shelf | Self::Group)
    }

    /// Stable storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shelf => "shelf",
            Self::Group => "group",
            Self::Bookmark => "bookmark",
            Self::Archive => "archive",
            Self::Separator => "separator",
        }
    }

    /// Parses a storage label.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "shelf" => Some(Self::Shelf),
            "group" => Some(Self::Group),
            "bookmark" => Some(Self::Bookmark),
            "archive" => Some(Self::Archive),
            "separator" => Some(Self::Separator),
            _ => None,
        }
    }
}

/// Org-style todo keyword attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoState {
    Todo,
    Waiting,
    Postponed,
    Cancelled,
    Done,
}

impl TodoState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Waiting => "waiting",
            Self::Postponed => "postponed",
            Self::Cancelled => "cancelled",
            Self::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "todo" => Some(Self::Todo),
            "waiting" => Some(Self::Waiting),
            "postponed" => Some(Self::Postponed),
            "cancelled" => Some(Self::Cancelled),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// External reference to a node, either by primary key or by uuid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRef {
    Id(NodeId),
    Uuid(String),
}

impl Display for NodeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id}"),
            Self::Uuid(uuid) => write!(f, "uuid={uuid}"),
        }
    }
}

impl From<NodeId> for NodeRef {
    fn from(value: NodeId) -> Self {
        Self::Id(value)
    }
}

/// Persisted tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Stable external reference used across contexts.
    pub uuid: String,
    /// `None` only for shelves.
    pub parent_id: Option<NodeId>,
    /// Serialized as `type` to match external schema naming.
    #[serde(rename = "type")]
    pub kind: NodeType,
    pub name: String,
    pub uri: Option<String>,
    /// Normalized to trimmed lowercase.
    pub tags: BTreeSet<String>,
    /// Sibling display order.
    pub pos: i64,
    /// Sibling order inside todo listings.
    pub todo_pos: i64,
    /// Epoch milliseconds.
    pub date_added: i64,
    /// Epoch milliseconds. Bumped by every update.
    pub date_modified: i64,
    pub todo_state: Option<TodoState>,
    /// Free-form date text, as entered by the user.
    pub todo_date: Option<String>,
}

/// Input datum for node creation.
///
/// Identity, timestamps and (by default) order keys are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNode {
    pub parent_id: Option<NodeId>,
    #[serde(rename = "type")]
    pub kind: NodeType,
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Honored only when creation opts out of order reset.
    #[serde(default)]
    pub pos: Option<i64>,
    /// Honored only when creation opts out of order reset.
    #[serde(default)]
    pub todo_pos: Option<i64>,
    #[serde(default)]
    pub todo_state: Option<TodoState>,
    #[serde(default)]
    pub todo_date: Option<String>,
}

impl NewNode {
    /// Creates a datum with only structural fields set.
    pub fn new(kind: NodeType, parent_id: Option<NodeId>, name: impl Into<String>) -> Self {
        Self {
            parent_id,
            kind,
            name: name.into(),
            uri: None,
            tags: Vec::new(),
            pos: None,
            todo_pos: None,
            todo_state: None,
            todo_date: None,
        }
    }

    pub fn shelf(name: impl Into<String>) -> Self {
        Self::new(NodeType::Shelf, None, name)
    }

    pub fn group(parent_id: NodeId, name: impl Into<String>) -> Self {
        Self::new(NodeType::Group, Some(parent_id), name)
    }

    pub fn bookmark(parent_id: NodeId, name: impl Into<String>, uri: impl Into<String>) -> Self {
        let mut node = Self::new(NodeType::Bookmark, Some(parent_id), name);
        node.uri = Some(uri.into());
        node
    }

    pub fn archive(parent_id: NodeId, name: impl Into<String>, uri: impl Into<String>) -> Self {
        let mut node = Self::new(NodeType::Archive, Some(parent_id), name);
        node.uri = Some(uri.into());
        node
    }

    pub fn separator(parent_id: NodeId) -> Self {
        Self::new(NodeType::Separator, Some(parent_id), "-")
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Validates shape-level invariants that do not need storage access.
    pub fn validate(&self) -> Result<(), NodeValidationError> {
        validate_shape(self.kind, self.parent_id, &self.name)
    }
}

/// Partial update merged over an existing node.
///
/// `None` fields retain their stored value. Clearable fields use a nested
/// `Option` where `Some(None)` clears.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePatch {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub kind: Option<NodeType>,
    pub name: Option<String>,
    pub uri: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub pos: Option<i64>,
    pub todo_pos: Option<i64>,
    pub todo_state: Option<Option<TodoState>>,
    pub todo_date: Option<Option<String>>,
}

impl NodePatch {
    /// Creates an empty patch targeting `id`.
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Applies this patch to a copy of `node`. Identity fields are untouched.
    pub fn merge_into(&self, node: &Node) -> Node {
        let mut merged = node.clone();
        if let Some(parent_id) = self.parent_id {
            merged.parent_id = Some(parent_id);
        }
        if let Some(kind) = self.kind {
            merged.kind = kind;
        }
        if let Some(name) = self.name.as_ref() {
            merged.name = name.clone();
        }
        if let Some(uri) = self.uri.as_ref() {
            merged.uri = uri.clone();
        }
        if let Some(tags) = self.tags.as_ref() {
            merged.tags = normalize_tags(tags.as_slice());
        }
        if let Some(pos) = self.pos {
            merged.pos = pos;
        }
        if let Some(todo_pos) = self.todo_pos {
            merged.todo_pos = todo_pos;
        }
        if let Some(todo_state) = self.todo_state {
            merged.todo_state = todo_state;
        }
        if let Some(todo_date) = self.todo_date.as_ref() {
            merged.todo_date = todo_date.clone();
        }
        merged
    }
}

/// Shape-level validation error for node writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeValidationError {
    /// A non-shelf node was given no parent.
    MissingParent(NodeType),
    /// A shelf was given a parent.
    ShelfWithParent,
    /// Shelf/group name is blank after trim.
    BlankName(NodeType),
    /// Parent id does not reference an existing node.
    ParentNotFound(NodeId),
    /// Parent exists but is a leaf type.
    ParentNotContainer { parent_id: NodeId, kind: NodeType },
    /// Retyping a node with children into a leaf type.
    LeafWithChildren(NodeId),
    /// Move would place a node inside its own subtree.
    CycleDetected { node_id: NodeId, parent_id: NodeId },
    /// Reorder input mixes children of different parents.
    NotSiblings(NodeId),
    /// Reorder input lists the same node more than once.
    DuplicateId(NodeId),
}

impl Display for NodeValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingParent(kind) => {
                write!(f, "{} node requires a parent", kind.as_str())
            }
            Self::ShelfWithParent => write!(f, "shelf node must not have a parent"),
            Self::BlankName(kind) => write!(f, "{} name must not be blank", kind.as_str()),
            Self::ParentNotFound(id) => write!(f, "parent node not found: {id}"),
            Self::ParentNotContainer { parent_id, kind } => write!(
                f,
                "parent node {parent_id} is a {} and cannot have children",
                kind.as_str()
            ),
            Self::LeafWithChildren(id) => {
                write!(f, "node {id} has children and cannot become a leaf type")
            }
            Self::CycleDetected { node_id, parent_id } => write!(
                f,
                "move would create cycle: node {node_id} under parent {parent_id}"
            ),
            Self::NotSiblings(id) => {
                write!(f, "node {id} does not share a parent with the reordered nodes")
            }
            Self::DuplicateId(id) => write!(f, "node {id} is listed more than once"),
        }
    }
}

impl Error for NodeValidationError {}

/// Checks parent presence against type and blank container names.
pub fn validate_shape(
    kind: NodeType,
    parent_id: Option<NodeId>,
    name: &str,
) -> Result<(), NodeValidationError> {
    match (kind, parent_id) {
        (NodeType::Shelf, Some(_)) => return Err(NodeValidationError::ShelfWithParent),
        (NodeType::Shelf, None) => {}
        (other, None) => return Err(NodeValidationError::MissingParent(other)),
        (_, Some(_)) => {}
    }
    if kind.is_container() && name.trim().is_empty() {
        return Err(NodeValidationError::BlankName(kind));
    }
    Ok(())
}

/// Canonical lookup key for case-insensitive name matching.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Normalizes one tag value. Blank tags are dropped.
pub fn normalize_tag(tag: &str) -> Option<String> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Normalizes and deduplicates tag values.
pub fn normalize_tags<S: AsRef<str>>(tags: &[S]) -> BTreeSet<String> {
    tags.iter()
        .filter_map(|tag| normalize_tag(tag.as_ref()))
        .collect()
}
