//! Session orchestration.
//!
//! ```text
//! join ──► resolve ──► reap ──► admit ──► subscribe ──► persist ──► user list → room
//!                                                                └──► snapshot → requester
//!
//! mutate ─► resolve ─► reap ─► authorize ─► apply ─► persist ─► snapshot → room
//!
//! leave ──► unsubscribe ─► resolve ─► depart (+failover) ─► persist ─► user list → room
//! ```
//!
//! Every request reloads the document, applies its change, and writes the
//! whole document back. Concurrent requests on one document are not
//! serialized: the later `persist` wins and the earlier change is lost.
//!
//! If `persist` fails nothing is broadcast and the error is returned
//! to the caller.
//!
//! "Reap" drops stored members with no live peer in the room, so a leave
//! that failed to persist does not strand creator authority.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::Denied;
use crate::broadcast::{FrameReceiver, RoomManager};
use crate::membership::{self, Departure, RoleChangeRejected};
use crate::model::{ConnectionId, Document, Role};
use crate::mutation::{self, Applied, Mutation};
use crate::protocol::{ProtocolError, ServerMessage};
use crate::registry::SessionRegistry;
use crate::store::StoreError;

/// Per-connection state: its id and the room it is in.
///
/// `document` is only changed by [`Session::join`] and [`Session::leave`].
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    id: ConnectionId,
    document: Option<Uuid>,
}

impl ConnectionContext {
    pub fn new() -> Self {
        Self::with_id(ConnectionId::new())
    }

    pub fn with_id(id: ConnectionId) -> Self {
        Self { id, document: None }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn document(&self) -> Option<Uuid> {
        self.document
    }
}

impl Default for ConnectionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("presentation {0} not found")]
    NotFound(Uuid),

    #[error("connection has not joined a presentation")]
    NotJoined,

    #[error(transparent)]
    Denied(#[from] Denied),

    #[error(transparent)]
    RoleChange(#[from] RoleChangeRejected),

    #[error("storage failure: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Server-side failures, as opposed to rejected requests.
    pub fn is_internal(&self) -> bool {
        matches!(self, SessionError::Store(_) | SessionError::Protocol(_))
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => SessionError::NotFound(id),
            other => SessionError::Store(other),
        }
    }
}

/// Result of a successful join.
pub struct Joined {
    /// Snapshot to send to the joiner.
    pub snapshot: Document,
    pub role: Role,
    /// Room frames for this connection.
    pub receiver: FrameReceiver,
}

/// Shared handle over the registry and rooms; cloned into every connection.
#[derive(Clone)]
pub struct Session {
    registry: Arc<SessionRegistry>,
    rooms: Arc<RoomManager>,
}

impl Session {
    pub fn new(registry: SessionRegistry, broadcast_capacity: usize) -> Self {
        Self {
            registry: Arc::new(registry),
            rooms: Arc::new(RoomManager::new(broadcast_capacity)),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    /// Join `ctx` to the room of `document_id` under `nickname`.
    ///
    /// A connection already in a room leaves it first. On `NotFound` nothing
    /// changes, including the current room.
    pub async fn join(
        &self,
        ctx: &mut ConnectionContext,
        document_id: Uuid,
        nickname: &str,
    ) -> Result<Joined, SessionError> {
        let mut document = self.registry.resolve(document_id).await?;

        if ctx.document.is_some() {
            self.leave(ctx).await?;
            document = self.registry.resolve(document_id).await?;
        }

        self.reap_stale(&mut document).await;
        let role = membership::admit(&mut document, ctx.id, nickname);

        // Subscribe before persisting so a stored member always has a live peer.
        let receiver = self.rooms.join(document_id, ctx.id).await;
        if let Err(e) = self.registry.persist(&document).await {
            self.rooms.leave(&document_id, &ctx.id).await;
            return Err(e.into());
        }
        ctx.document = Some(document_id);
        self.rooms
            .broadcast(&document_id, &ServerMessage::user_list(&document))
            .await?;

        log::info!(
            "{nickname} ({}) joined presentation {document_id} as {role}",
            ctx.id
        );
        Ok(Joined {
            snapshot: document,
            role,
            receiver,
        })
    }

    /// Remove `ctx` from its room, running creator failover.
    ///
    /// Returns `None` when the connection was not a tracked member.
    pub async fn leave(
        &self,
        ctx: &mut ConnectionContext,
    ) -> Result<Option<Departure>, SessionError> {
        let Some(document_id) = ctx.document.take() else {
            return Ok(None);
        };

        self.rooms.leave(&document_id, &ctx.id).await;

        let mut document = match self.registry.resolve(document_id).await {
            Ok(document) => document,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let departure = membership::depart(&mut document, ctx.id);
        let reaped = self.reap_stale(&mut document).await;
        if departure.is_none() && !reaped {
            return Ok(None);
        }
        self.registry.persist(&document).await?;
        self.rooms
            .broadcast(&document_id, &ServerMessage::user_list(&document))
            .await?;

        if let Some(departure) = &departure {
            log::info!(
                "{} ({}) left presentation {document_id}",
                departure.member.nickname,
                ctx.id
            );
            if let Some(heir) = departure.promoted {
                log::info!("{heir} promoted to creator of {document_id}");
            }
        }
        Ok(departure)
    }

    /// Change `target`'s role on behalf of the connection in `ctx`.
    pub async fn update_role(
        &self,
        ctx: &ConnectionContext,
        target: ConnectionId,
        new_role: Role,
    ) -> Result<(), SessionError> {
        let document_id = ctx.document.ok_or(SessionError::NotJoined)?;
        let mut document = self.registry.resolve(document_id).await?;

        let reaped = self.reap_stale(&mut document).await;
        let assigned = membership::assign_role(&mut document, ctx.id, target, new_role);
        if assigned.is_ok() || reaped {
            self.registry.persist(&document).await?;
            self.rooms
                .broadcast(&document_id, &ServerMessage::user_list(&document))
                .await?;
        }
        assigned?;

        log::debug!("{target} is now {new_role} in {document_id}");
        Ok(())
    }

    /// Apply `mutation` to the document of the room `ctx` is in.
    ///
    /// An [`Applied::Unchanged`] result is neither persisted nor broadcast.
    pub async fn mutate(
        &self,
        ctx: &ConnectionContext,
        mutation: Mutation,
    ) -> Result<Applied, SessionError> {
        let document_id = ctx.document.ok_or(SessionError::NotJoined)?;
        let mut document = self.registry.resolve(document_id).await?;

        let reaped = self.reap_stale(&mut document).await;
        let outcome = mutation::execute(&mut document, ctx.id, mutation);
        let changed = outcome.as_ref().is_ok_and(|applied| applied.changed());
        if changed || reaped {
            self.registry.persist(&document).await?;
        }
        if reaped {
            self.rooms
                .broadcast(&document_id, &ServerMessage::user_list(&document))
                .await?;
        }
        let applied = outcome?;
        if changed {
            self.rooms
                .broadcast(&document_id, &ServerMessage::snapshot(&document))
                .await?;
            log::trace!("{:?} on {document_id} by {}", applied, ctx.id);
        }
        Ok(applied)
    }

    /// Depart every stored member that has no live peer in this process's
    /// room, then make sure a remaining member holds creator authority.
    ///
    /// Such members are left behind when a leave could not be persisted or
    /// another process owned the room. Returns whether `document` changed;
    /// the caller persists.
    async fn reap_stale(&self, document: &mut Document) -> bool {
        let mut stale = Vec::new();
        for id in document.members.keys() {
            if !self.rooms.is_live(&document.id, id).await {
                stale.push(*id);
            }
        }

        let mut changed = false;
        for id in stale {
            let Some(departure) = membership::depart(document, id) else {
                continue;
            };
            log::warn!(
                "Dropping stale member {} ({id}) from {}",
                departure.member.nickname,
                document.id
            );
            if let Some(heir) = departure.promoted {
                log::info!("{heir} promoted to creator of {}", document.id);
            }
            changed = true;
        }
        if let Some(heir) = membership::reseat_creator(document) {
            log::info!("{heir} promoted to creator of {}", document.id);
            changed = true;
        }
        changed
    }
}
