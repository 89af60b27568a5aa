//! Membership rules: admission, departure with creator failover, role changes.
//!
//! These functions mutate a loaded [`Document`] only; persisting the result
//! and notifying the room is the caller's job (see [`crate::session`]).

use crate::auth::{self, Operation};
use crate::model::{ConnectionId, Document, Member, Role};

/// Admit `connection` to `document` and return the role it was given.
///
/// The first connection to join a memberless, creatorless document becomes
/// creator; everyone after that starts as viewer. Re-admitting an existing
/// member only refreshes its nickname.
pub fn admit(document: &mut Document, connection: ConnectionId, nickname: &str) -> Role {
    if let Some(existing) = document.members.get_mut(&connection) {
        existing.nickname = nickname.to_string();
        return existing.role;
    }

    let role = if document.creator.is_none() && document.members.is_empty() {
        Role::Creator
    } else {
        Role::Viewer
    };

    document.join_seq += 1;
    if role == Role::Creator {
        document.creator = Some(connection);
    }
    document.members.insert(
        connection,
        Member {
            nickname: nickname.to_string(),
            role,
            joined: document.join_seq,
        },
    );
    role
}

/// Outcome of removing a member.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub connection: ConnectionId,
    pub member: Member,
    /// Member promoted to creator by failover, if any.
    pub promoted: Option<ConnectionId>,
}

/// Remove `connection` from `document`, handing creator authority over if needed.
///
/// Returns `None` when the connection was not a member.
pub fn depart(document: &mut Document, connection: ConnectionId) -> Option<Departure> {
    let member = document.members.remove(&connection)?;

    let mut promoted = None;
    if document.creator == Some(connection) {
        document.creator = None;
        if let Some(next) = successor(document) {
            if let Some(heir) = document.members.get_mut(&next) {
                heir.role = Role::Creator;
            }
            document.creator = Some(next);
            promoted = Some(next);
        }
    }

    Some(Departure {
        connection,
        member,
        promoted,
    })
}

/// Re-seat creator authority after members were dropped without failover.
///
/// A creator id that no longer names a member is cleared; if members remain,
/// the failover successor is promoted. Returns the promoted member.
pub fn reseat_creator(document: &mut Document) -> Option<ConnectionId> {
    if let Some(creator) = document.creator {
        if document.members.contains_key(&creator) {
            return None;
        }
        document.creator = None;
    }
    let next = successor(document)?;
    if let Some(heir) = document.members.get_mut(&next) {
        heir.role = Role::Creator;
    }
    document.creator = Some(next);
    Some(next)
}

/// Failover order: earliest join ordinal, then lowest connection id.
fn successor(document: &Document) -> Option<ConnectionId> {
    document
        .members
        .iter()
        .min_by_key(|(id, member)| (member.joined, **id))
        .map(|(id, _)| *id)
}

/// Why a role change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoleChangeRejected {
    #[error("only the creator may change roles")]
    NotCreator,

    #[error("target {0} is not a member")]
    UnknownTarget(ConnectionId),

    #[error("the creator cannot be demoted")]
    CreatorDemotion,

    #[error("creator authority cannot be granted by role change")]
    CreatorPromotion,
}

/// Set `target`'s role on behalf of `actor`.
pub fn assign_role(
    document: &mut Document,
    actor: ConnectionId,
    target: ConnectionId,
    new_role: Role,
) -> Result<(), RoleChangeRejected> {
    auth::authorize(document, actor, Operation::ManageRoles)
        .map_err(|_| RoleChangeRejected::NotCreator)?;

    let target_is_creator = document.creator == Some(target);
    let member = document
        .members
        .get_mut(&target)
        .ok_or(RoleChangeRejected::UnknownTarget(target))?;

    match (target_is_creator, new_role) {
        (true, Role::Creator) | (false, Role::Editor | Role::Viewer) => {
            member.role = new_role;
            Ok(())
        }
        (true, _) => Err(RoleChangeRejected::CreatorDemotion),
        (false, Role::Creator) => Err(RoleChangeRejected::CreatorPromotion),
    }
}
