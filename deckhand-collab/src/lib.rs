//! # deckhand-collab: real-time collaborative slide-deck sessions
//!
//! Several people open the same presentation; every accepted edit is stored
//! and the full deck is pushed to everyone in the room.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌──────────────┐
//! │ Browser     │ ◄────────────────► │ CollabServer │──── REST (axum)
//! │ (per user)  │     JSON events    │              │
//! └─────────────┘                    └──────┬───────┘
//!                                           │ Session
//!                       ┌───────────────────┼───────────────────┐
//!                       ▼                   ▼                   ▼
//!               ┌───────────────┐   ┌──────────────┐   ┌───────────────┐
//!               │SessionRegistry│   │ auth +       │   │ RoomManager   │
//!               │ DocumentStore │   │ membership + │   │ BroadcastGroup│
//!               │ (RocksDB/mem) │   │ mutation     │   │ (fan-out)     │
//!               └───────────────┘   └──────────────┘   └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`model`]: documents, slides, elements, members and roles
//! - [`auth`]: role → permission table and the single authorization check
//! - [`membership`]: join, leave with creator failover, role changes
//! - [`mutation`]: slide and element edits
//! - [`protocol`]: JSON event wire format
//! - [`store`]: document persistence (in-memory, RocksDB)
//! - [`registry`]: create / resolve / persist documents
//! - [`broadcast`]: room fan-out
//! - [`session`]: request orchestration per connection
//! - [`server`]: WebSocket server
//! - [`api`]: HTTP endpoints

pub mod api;
pub mod auth;
pub mod broadcast;
pub mod membership;
pub mod model;
pub mod mutation;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod store;

// Re-exports for convenience
pub use auth::{authorize, Denied, Operation};
pub use broadcast::{BroadcastGroup, BroadcastStats, RoomManager};
pub use membership::{Departure, RoleChangeRejected};
pub use model::{
    ConnectionId, Document, DocumentSummary, Element, ElementDraft, Member, Role, Slide,
};
pub use mutation::{Applied, Mutation};
pub use protocol::{ClientMessage, MemberEntry, ProtocolError, ServerMessage, UserList};
pub use registry::SessionRegistry;
pub use server::{CollabServer, ServerConfig, ServerStats};
pub use session::{ConnectionContext, Joined, Session, SessionError};
pub use store::{DocumentMetadata, DocumentStore, MemoryStore, RocksStore, StoreConfig, StoreError};
