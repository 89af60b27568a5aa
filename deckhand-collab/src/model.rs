//! Slide deck data model.
//!
//! ```text
//! Document ──┬── slides: [Slide] ── elements: [Element]
//!            ├── creator: Option<ConnectionId>
//!            └── users: { ConnectionId → Member }
//! ```
//!
//! Documents are persisted whole, so every type here round-trips through
//! both serde_json (wire) and bincode (RocksDB records).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one live WebSocket connection.
///
/// Serialized as a bare UUID string so it can key JSON objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Member role within a document session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Creator,
    Editor,
    Viewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Creator => "creator",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        };
        f.write_str(name)
    }
}

/// A connection's participation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub nickname: String,
    pub role: Role,
    /// Join ordinal within the document (failover order).
    pub joined: u64,
}

/// A positioned content unit: text or an image reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: Uuid,
    pub content: String,
    pub x: f64,
    pub y: f64,
}

/// Element as submitted by a client. Every field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementDraft {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

impl ElementDraft {
    /// Draft for a new text element at the given position.
    pub fn text(content: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: None,
            content: Some(content.into()),
            x: Some(x),
            y: Some(y),
        }
    }

    /// Draft that overwrites the element with `id`.
    pub fn replacing(id: Uuid, content: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: Some(id),
            ..Self::text(content, x, y)
        }
    }

    /// Materialize under `id`, filling absent fields with defaults.
    pub fn into_element(self, id: Uuid) -> Element {
        Element {
            id,
            content: self.content.unwrap_or_default(),
            x: self.x.unwrap_or_default(),
            y: self.y.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub id: Uuid,
    pub elements: Vec<Element>,
}

impl Slide {
    /// Empty slide with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            elements: Vec::new(),
        }
    }

    pub fn element(&self, id: Uuid) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }
}

impl Default for Slide {
    fn default() -> Self {
        Self::new()
    }
}

/// A presentation: ordered slides plus its live session membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub slides: Vec<Slide>,
    #[serde(rename = "creatorId")]
    pub creator: Option<ConnectionId>,
    #[serde(rename = "users")]
    pub members: BTreeMap<ConnectionId, Member>,
    /// Last join ordinal handed out.
    pub join_seq: u64,
}

impl Document {
    /// New deck with one empty slide, no creator and no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            slides: vec![Slide::new()],
            creator: None,
            members: BTreeMap::new(),
            join_seq: 0,
        }
    }

    pub fn summary(&self) -> DocumentSummary {
        DocumentSummary {
            id: self.id,
            name: self.name.clone(),
        }
    }

    pub fn slide(&self, id: Uuid) -> Option<&Slide> {
        self.slides.iter().find(|s| s.id == id)
    }

    pub fn slide_mut(&mut self, id: Uuid) -> Option<&mut Slide> {
        self.slides.iter_mut().find(|s| s.id == id)
    }

    pub fn member(&self, connection: ConnectionId) -> Option<&Member> {
        self.members.get(&connection)
    }

    /// Number of members currently holding the creator role.
    pub fn creator_count(&self) -> usize {
        self.members
            .values()
            .filter(|m| m.role == Role::Creator)
            .count()
    }
}

/// Listing entry: `{id, name}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub name: String,
}
