//! Real-time wire protocol.
//!
//! Every frame is a WebSocket text message holding one JSON object,
//! adjacently tagged by event name:
//!
//! ```text
//! {"event": "update-element", "data": {"slideId": "…", "element": {…}}}
//! {"event": "add-slide"}
//! ```
//!
//! Client → server: `join-presentation`, `update-user-role`, `add-slide`,
//! `remove-slide`, `update-element`, `remove-shape`, `update-thumbnail`.
//!
//! Server → client: `error-message`, `presentation-data` (full snapshot, never
//! a diff), `update-user-list` (connection id → nickname and role).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ConnectionId, Document, ElementDraft, Member, Role};
use crate::mutation::Mutation;

/// Messages accepted from a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    JoinPresentation {
        document_id: Uuid,
        nickname: String,
    },
    UpdateUserRole {
        target_connection_id: ConnectionId,
        new_role: Role,
    },
    AddSlide,
    RemoveSlide {
        slide_id: Uuid,
    },
    UpdateElement {
        slide_id: Uuid,
        element: ElementDraft,
    },
    RemoveShape {
        slide_id: Uuid,
        element_id: Uuid,
    },
    /// Client-rendered preview; logged only.
    UpdateThumbnail {
        thumbnail: String,
    },
}

impl ClientMessage {
    /// Mutation carried by this message, if it is one.
    pub fn into_mutation(self) -> Option<Mutation> {
        match self {
            ClientMessage::AddSlide => Some(Mutation::AddSlide),
            ClientMessage::RemoveSlide { slide_id } => Some(Mutation::RemoveSlide { slide_id }),
            ClientMessage::UpdateElement { slide_id, element } => {
                Some(Mutation::UpsertElement { slide_id, element })
            }
            ClientMessage::RemoveShape {
                slide_id,
                element_id,
            } => Some(Mutation::RemoveElement {
                slide_id,
                element_id,
            }),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

/// Entry of the `update-user-list` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEntry {
    pub nickname: String,
    pub role: Role,
}

impl From<&Member> for MemberEntry {
    fn from(member: &Member) -> Self {
        Self {
            nickname: member.nickname.clone(),
            role: member.role,
        }
    }
}

pub type UserList = BTreeMap<ConnectionId, MemberEntry>;

/// Messages sent to connections, either directly or through a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    ErrorMessage { text: String },
    PresentationData(Document),
    UpdateUserList(UserList),
}

impl ServerMessage {
    pub fn error(text: impl Into<String>) -> Self {
        ServerMessage::ErrorMessage { text: text.into() }
    }

    /// Full snapshot of `document`.
    pub fn snapshot(document: &Document) -> Self {
        ServerMessage::PresentationData(document.clone())
    }

    /// Current member list of `document`.
    pub fn user_list(document: &Document) -> Self {
        ServerMessage::UpdateUserList(
            document
                .members
                .iter()
                .map(|(id, member)| (*id, MemberEntry::from(member)))
                .collect(),
        )
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}
