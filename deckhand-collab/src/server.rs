//! WebSocket session server.
//!
//! Architecture:
//! ```text
//! Client A ──┐                         ┌── SessionRegistry ── DocumentStore
//!            ├── connection task ── Session
//! Client B ──┘   (ConnectionContext)   └── RoomManager ── BroadcastGroup (per document)
//!                                                │
//!                                     ┌──────────┼───────────┐
//!                                     ▼          ▼           ▼
//!                                  Client A   Client B    Client C
//! ```
//!
//! Each connection runs in its own task with a `select!` loop over the
//! socket and, once joined, its room's broadcast receiver. Replies meant for
//! the requester alone (join snapshot, error messages) go straight to the
//! socket; everything else reaches the connection through the room.
//!
//! The REST surface in [`crate::api`] is served next to the socket on its own
//! listener and shares the same registry.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

use crate::api;
use crate::broadcast::FrameReceiver;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::SessionRegistry;
use crate::session::{ConnectionContext, Session, SessionError};
use crate::store::{DocumentStore, MemoryStore, RocksStore, StoreConfig, StoreError};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket listen address
    pub bind_addr: String,
    /// HTTP API listen address
    pub http_addr: String,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    /// RocksDB directory (None = in-memory only)
    pub storage_path: Option<PathBuf>,
    /// Front-end bundle served by the HTTP listener
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            http_addr: "127.0.0.1:5000".to_string(),
            broadcast_capacity: 256,
            storage_path: None,
            static_dir: None,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
}

pub struct CollabServer {
    config: ServerConfig,
    session: Session,
    stats: Arc<RwLock<ServerStats>>,
}

impl CollabServer {
    /// Create a server, opening RocksDB when `storage_path` is set.
    pub fn new(config: ServerConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn DocumentStore> = match &config.storage_path {
            Some(path) => Arc::new(RocksStore::open(StoreConfig {
                path: path.clone(),
                ..StoreConfig::default()
            })?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: ServerConfig, store: Arc<dyn DocumentStore>) -> Self {
        let session = Session::new(SessionRegistry::new(store), config.broadcast_capacity);
        Self {
            config,
            session,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// Default configuration, in-memory storage.
    pub fn with_defaults() -> Self {
        Self::with_store(ServerConfig::default(), Arc::new(MemoryStore::new()))
    }

    /// Clear stale membership, bind both listeners and serve until one of
    /// them fails.
    pub async fn run(&self) -> Result<(), BoxError> {
        self.session.registry().recover().await?;

        let realtime = TcpListener::bind(&self.config.bind_addr).await?;
        let http = TcpListener::bind(&self.config.http_addr).await?;
        log::info!("Session server listening on ws://{}", self.config.bind_addr);
        log::info!("HTTP API listening on http://{}", self.config.http_addr);

        let router = api::router(
            self.session.registry().clone(),
            self.config.static_dir.as_deref(),
        );
        tokio::try_join!(self.serve_realtime(realtime), api::serve(http, router))?;
        Ok(())
    }

    /// Accept WebSocket connections on `listener` forever.
    pub async fn serve_realtime(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let session = self.session.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, session, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Drive one connection, then run leave semantics however it ended.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        session: Session,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), BoxError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let mut ctx = ConnectionContext::new();
        log::info!("WebSocket connection {} established from {addr}", ctx.id());

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let result = Self::serve_peer(ws_stream, &session, &mut ctx, &stats).await;

        if let Err(e) = session.leave(&mut ctx).await {
            log::error!("Failed to clean up connection {}: {e}", ctx.id());
        }
        {
            let mut s = stats.write().await;
            s.active_connections -= 1;
            s.active_rooms = session.rooms().room_count().await;
        }
        log::info!("Connection {} from {addr} closed", ctx.id());
        result
    }

    async fn serve_peer(
        ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
        session: &Session,
        ctx: &mut ConnectionContext,
        stats: &RwLock<ServerStats>,
    ) -> Result<(), BoxError> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let mut room_rx: Option<FrameReceiver> = None;

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            {
                                let mut s = stats.write().await;
                                s.total_messages += 1;
                                s.total_bytes += text.len() as u64;
                            }

                            match ClientMessage::decode(text.as_str()) {
                                Ok(request) => {
                                    let reply = Self::dispatch(session, ctx, &mut room_rx, request).await;
                                    if let Some(reply) = reply {
                                        ws_sender.send(Message::text(reply.encode()?)).await?;
                                    }
                                }
                                Err(e) => {
                                    log::warn!("Dropping undecodable frame from {}: {e}", ctx.id());
                                }
                            }
                        }

                        Some(Ok(Message::Binary(data))) => {
                            log::debug!("Ignoring {}-byte binary frame from {}", data.len(), ctx.id());
                        }

                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }

                        Some(Ok(Message::Close(_))) | None => break,

                        Some(Err(e)) => {
                            log::warn!("WebSocket error on {}: {e}", ctx.id());
                            break;
                        }

                        _ => {}
                    }
                }

                frame = async {
                    match room_rx.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    match frame {
                        Ok(frame) => {
                            ws_sender.send(Message::text(frame.to_string())).await?;
                        }
                        Err(RecvError::Lagged(n)) => {
                            log::warn!("Connection {} lagged by {n} frames", ctx.id());
                        }
                        Err(RecvError::Closed) => room_rx = None,
                    }
                }
            }
        }

        Ok(())
    }

    /// Run one request and produce the reply owed to the requester, if any.
    ///
    /// Rejected requests get no reply. Missing documents and server-side
    /// failures are reported with an `error-message`.
    async fn dispatch(
        session: &Session,
        ctx: &mut ConnectionContext,
        room_rx: &mut Option<FrameReceiver>,
        request: ClientMessage,
    ) -> Option<ServerMessage> {
        let outcome = match request {
            ClientMessage::JoinPresentation {
                document_id,
                nickname,
            } => match session.join(ctx, document_id, &nickname).await {
                Ok(joined) => {
                    *room_rx = Some(joined.receiver);
                    return Some(ServerMessage::PresentationData(joined.snapshot));
                }
                Err(e) => {
                    if ctx.document().is_none() {
                        *room_rx = None;
                    }
                    Err(e)
                }
            },
            ClientMessage::UpdateUserRole {
                target_connection_id,
                new_role,
            } => session.update_role(ctx, target_connection_id, new_role).await,
            ClientMessage::UpdateThumbnail { thumbnail } => {
                log::debug!(
                    "Thumbnail from {} for {:?} ({} bytes)",
                    ctx.id(),
                    ctx.document(),
                    thumbnail.len()
                );
                Ok(())
            }
            other => match other.into_mutation() {
                Some(mutation) => session.mutate(ctx, mutation).await.map(|_| ()),
                None => Ok(()),
            },
        };

        match outcome {
            Ok(()) => None,
            Err(SessionError::NotFound(id)) => {
                log::debug!("Connection {} asked for unknown presentation {id}", ctx.id());
                Some(ServerMessage::error("Presentation not found"))
            }
            Err(e) if e.is_internal() => {
                log::error!("Request from {} failed: {e}", ctx.id());
                Some(ServerMessage::error("Internal server error"))
            }
            Err(e) => {
                log::debug!("Ignoring request from {}: {e}", ctx.id());
                None
            }
        }
    }

    pub async fn stats(&self) -> ServerStats {
        let mut stats = self.stats.read().await.clone();
        stats.active_rooms = self.session.rooms().room_count().await;
        stats
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}
