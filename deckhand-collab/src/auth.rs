//! Authorization gate.
//!
//! Permission matrix:
//!
//! | Role    | Read | Elements | Slides | Roles |
//! |---------|------|----------|--------|-------|
//! | creator | ✓    | ✓        | ✓      | ✓     |
//! | editor  | ✓    | ✓        |        |       |
//! | viewer  | ✓    |          |        |       |
//!
//! Callers pass the freshly loaded [`Document`]; the actor's role is read
//! from its live membership on every call and never cached.

use std::fmt;

use crate::model::{ConnectionId, Document, Role};

/// Operations gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    ManageSlides,
    ManageElements,
    ManageRoles,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Read => "read",
            Operation::ManageSlides => "manage slides",
            Operation::ManageElements => "manage elements",
            Operation::ManageRoles => "manage roles",
        };
        f.write_str(name)
    }
}

impl Role {
    /// Whether this role may perform `operation`.
    pub fn permits(self, operation: Operation) -> bool {
        match (self, operation) {
            (_, Operation::Read) => true,
            (Role::Creator, _) => true,
            (Role::Editor, Operation::ManageElements) => true,
            _ => false,
        }
    }
}

/// Rejection from [`authorize`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("connection {actor} ({role:?}) may not {operation}")]
pub struct Denied {
    pub actor: ConnectionId,
    pub role: Option<Role>,
    pub operation: Operation,
}

/// Role `connection` holds in `document` right now.
///
/// Creator authority requires both the member record and `Document.creator`
/// to agree; a stale creator record counts as viewer.
pub fn effective_role(document: &Document, connection: ConnectionId) -> Option<Role> {
    let member = document.members.get(&connection)?;
    let is_creator = document.creator == Some(connection);
    Some(match member.role {
        _ if is_creator => Role::Creator,
        Role::Creator => Role::Viewer,
        role => role,
    })
}

/// Check `actor` against the permission matrix, returning its role.
pub fn authorize(
    document: &Document,
    actor: ConnectionId,
    operation: Operation,
) -> Result<Option<Role>, Denied> {
    let role = effective_role(document, actor);
    let allowed = match role {
        Some(role) => role.permits(operation),
        None => operation == Operation::Read,
    };
    if allowed {
        Ok(role)
    } else {
        Err(Denied {
            actor,
            role,
            operation,
        })
    }
}
