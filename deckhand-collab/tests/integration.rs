//! Integration tests for end-to-end WebSocket sessions.
//!
//! These tests start a real server and connect raw WebSocket clients
//! speaking the JSON event protocol.

use deckhand_collab::{
    ClientMessage, CollabServer, ConnectionContext, ConnectionId, Document, ElementDraft,
    MemoryStore, Role, ServerConfig, ServerMessage, Session, SessionRegistry, UserList,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a server on free ports; return its WebSocket url and session handle.
async fn start_test_server() -> (String, Session) {
    start_server_with(Arc::new(MemoryStore::new())).await
}

async fn start_server_with(store: Arc<MemoryStore>) -> (String, Session) {
    let ws_port = free_port().await;
    let http_port = free_port().await;
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{ws_port}"),
        http_addr: format!("127.0.0.1:{http_port}"),
        broadcast_capacity: 64,
        ..ServerConfig::default()
    };
    let server = CollabServer::with_store(config, store);
    let session = server.session().clone();
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    // Give server time to bind
    tokio::time::sleep(Duration::from_millis(50)).await;
    (format!("ws://127.0.0.1:{ws_port}"), session)
}

async fn connect(url: &str) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

async fn send(client: &mut Client, msg: ClientMessage) {
    client
        .send(Message::text(msg.encode().unwrap()))
        .await
        .unwrap();
}

/// Read server messages until one satisfies `pred`.
async fn recv_until(
    client: &mut Client,
    mut pred: impl FnMut(&ServerMessage) -> bool,
) -> ServerMessage {
    loop {
        let frame = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for server message")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = frame {
            let msg = ServerMessage::decode(text.as_str()).unwrap();
            if pred(&msg) {
                return msg;
            }
        }
    }
}

async fn recv_snapshot(client: &mut Client, mut pred: impl FnMut(&Document) -> bool) -> Document {
    match recv_until(client, |m| matches!(m, ServerMessage::PresentationData(d) if pred(d))).await {
        ServerMessage::PresentationData(doc) => doc,
        _ => unreachable!(),
    }
}

async fn recv_user_list(client: &mut Client, mut pred: impl FnMut(&UserList) -> bool) -> UserList {
    match recv_until(client, |m| matches!(m, ServerMessage::UpdateUserList(l) if pred(l))).await {
        ServerMessage::UpdateUserList(list) => list,
        _ => unreachable!(),
    }
}

fn find(list: &UserList, nickname: &str) -> ConnectionId {
    list.iter()
        .find(|(_, entry)| entry.nickname == nickname)
        .map(|(id, _)| *id)
        .unwrap()
}

fn join(document_id: Uuid, nickname: &str) -> ClientMessage {
    ClientMessage::JoinPresentation {
        document_id,
        nickname: nickname.into(),
    }
}

#[tokio::test]
async fn test_server_accepts_connections() {
    let (url, _) = start_test_server().await;
    let result = tokio_tungstenite::connect_async(&url).await;
    assert!(result.is_ok(), "Should connect to server");
}

#[tokio::test]
async fn test_join_unknown_presentation() {
    let (url, _) = start_test_server().await;
    let mut client = connect(&url).await;

    send(&mut client, join(Uuid::new_v4(), "Alice")).await;
    let msg = recv_until(&mut client, |_| true).await;
    assert_eq!(msg, ServerMessage::error("Presentation not found"));
}

#[tokio::test]
async fn test_first_joiner_becomes_creator() {
    let (url, session) = start_test_server().await;
    let id = session.registry().create("Demo").await.unwrap();
    let mut client = connect(&url).await;

    send(&mut client, join(id, "Alice")).await;
    let doc = recv_snapshot(&mut client, |_| true).await;
    assert_eq!(doc.id, id);
    assert_eq!(doc.name, "Demo");
    let me = doc.creator.expect("joiner is creator");

    let list = recv_user_list(&mut client, |_| true).await;
    assert_eq!(list[&me].nickname, "Alice");
    assert_eq!(list[&me].role, Role::Creator);
}

#[tokio::test]
async fn test_garbage_frame_is_dropped() {
    let (url, session) = start_test_server().await;
    let id = session.registry().create("Demo").await.unwrap();
    let mut client = connect(&url).await;

    client.send(Message::text("not json".to_string())).await.unwrap();
    client
        .send(Message::text(r#"{"event":"no-such-event"}"#.to_string()))
        .await
        .unwrap();

    // Connection survives and still serves requests.
    send(&mut client, join(id, "Alice")).await;
    let doc = recv_snapshot(&mut client, |_| true).await;
    assert_eq!(doc.id, id);
}

#[tokio::test]
async fn test_end_to_end_session() {
    let (url, session) = start_test_server().await;
    let id = session.registry().create("Demo").await.unwrap();

    // A joins an empty deck and becomes creator.
    let mut a = connect(&url).await;
    send(&mut a, join(id, "Alice")).await;
    let doc = recv_snapshot(&mut a, |_| true).await;
    let a_id = doc.creator.unwrap();

    // A adds a slide.
    send(&mut a, ClientMessage::AddSlide).await;
    let doc = recv_snapshot(&mut a, |d| d.slides.len() == 2).await;
    let first_slide = doc.slides[0].id;

    // B joins as viewer.
    let mut b = connect(&url).await;
    send(&mut b, join(id, "Bob")).await;
    let doc = recv_snapshot(&mut b, |_| true).await;
    assert_eq!(doc.slides.len(), 2);
    let list = recv_user_list(&mut a, |l| l.len() == 2).await;
    let b_id = find(&list, "Bob");
    assert_eq!(list[&b_id].role, Role::Viewer);
    assert_eq!(list[&a_id].role, Role::Creator);

    // B's add-slide is silently rejected.
    send(&mut b, ClientMessage::AddSlide).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.registry().resolve(id).await.unwrap().slides.len(), 2);

    // A promotes B to editor.
    send(
        &mut a,
        ClientMessage::UpdateUserRole {
            target_connection_id: b_id,
            new_role: Role::Editor,
        },
    )
    .await;
    recv_user_list(&mut b, |l| l.get(&b_id).map(|e| e.role) == Some(Role::Editor)).await;

    // B adds a text element to slide 1; both see it.
    send(
        &mut b,
        ClientMessage::UpdateElement {
            slide_id: first_slide,
            element: ElementDraft::text("Hello", 10.0, 20.0),
        },
    )
    .await;
    let doc = recv_snapshot(&mut b, |d| d.slides[0].elements.len() == 1).await;
    assert_eq!(doc.slides[0].elements[0].content, "Hello");
    recv_snapshot(&mut a, |d| d.slides[0].elements.len() == 1).await;

    // A disconnects; B inherits the deck.
    a.close(None).await.unwrap();
    let list = recv_user_list(&mut b, |l| l.len() == 1).await;
    assert_eq!(list[&b_id].role, Role::Creator);

    let stored = session.registry().resolve(id).await.unwrap();
    assert_eq!(stored.creator, Some(b_id));
    assert_eq!(stored.creator_count(), 1);
    assert_eq!(stored.slides.len(), 2);
    assert_eq!(stored.slides[0].elements.len(), 1);
}

#[tokio::test]
async fn test_editor_edits_and_removes_element() {
    let (url, session) = start_test_server().await;
    let id = session.registry().create("Demo").await.unwrap();

    let mut a = connect(&url).await;
    send(&mut a, join(id, "Alice")).await;
    let doc = recv_snapshot(&mut a, |_| true).await;
    let slide_id = doc.slides[0].id;

    send(
        &mut a,
        ClientMessage::UpdateElement {
            slide_id,
            element: ElementDraft::text("draft", 1.0, 2.0),
        },
    )
    .await;
    let doc = recv_snapshot(&mut a, |d| d.slides[0].elements.len() == 1).await;
    let element_id = doc.slides[0].elements[0].id;

    send(
        &mut a,
        ClientMessage::UpdateElement {
            slide_id,
            element: ElementDraft::replacing(element_id, "final", 5.0, 6.0),
        },
    )
    .await;
    let doc = recv_snapshot(&mut a, |d| {
        d.slides[0].elements.first().map(|e| e.content.as_str()) == Some("final")
    })
    .await;
    assert_eq!(doc.slides[0].elements.len(), 1);
    assert_eq!(doc.slides[0].elements[0].x, 5.0);

    send(
        &mut a,
        ClientMessage::RemoveShape {
            slide_id,
            element_id,
        },
    )
    .await;
    recv_snapshot(&mut a, |d| d.slides[0].elements.is_empty()).await;
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let (url, session) = start_test_server().await;
    let first = session.registry().create("First").await.unwrap();
    let second = session.registry().create("Second").await.unwrap();

    let mut a = connect(&url).await;
    send(&mut a, join(first, "Alice")).await;
    recv_snapshot(&mut a, |_| true).await;
    recv_user_list(&mut a, |_| true).await;

    let mut b = connect(&url).await;
    send(&mut b, join(second, "Bob")).await;
    recv_snapshot(&mut b, |_| true).await;
    send(&mut b, ClientMessage::AddSlide).await;
    recv_snapshot(&mut b, |d| d.slides.len() == 2).await;

    let nothing = timeout(Duration::from_millis(150), a.next()).await;
    assert!(nothing.is_err(), "Room of First should not see Second's traffic");
}

#[tokio::test]
async fn test_last_disconnect_clears_creator() {
    let (url, session) = start_test_server().await;
    let id = session.registry().create("Demo").await.unwrap();

    let mut a = connect(&url).await;
    send(&mut a, join(id, "Alice")).await;
    recv_snapshot(&mut a, |_| true).await;
    drop(a);

    let mut cleared = false;
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        let doc = session.registry().resolve(id).await.unwrap();
        if doc.members.is_empty() {
            assert!(doc.creator.is_none());
            cleared = true;
            break;
        }
    }
    assert!(cleared, "membership should be cleared after disconnect");
    assert_eq!(session.rooms().room_count().await, 0);

    // Next joiner takes over as creator.
    let mut b = connect(&url).await;
    send(&mut b, join(id, "Bob")).await;
    let doc = recv_snapshot(&mut b, |_| true).await;
    assert!(doc.creator.is_some());
}

#[tokio::test]
async fn test_startup_clears_membership_from_previous_run() {
    // Membership left behind by a previous process on the same store.
    let store = Arc::new(MemoryStore::new());
    let previous = Session::new(SessionRegistry::new(store.clone()), 16);
    let id = previous.registry().create("Demo").await.unwrap();
    let mut ghost = ConnectionContext::new();
    previous.join(&mut ghost, id, "Ghost").await.unwrap();
    drop(previous);

    let (url, session) = start_server_with(store).await;
    let doc = session.registry().resolve(id).await.unwrap();
    assert!(doc.members.is_empty());
    assert!(doc.creator.is_none());

    let mut a = connect(&url).await;
    send(&mut a, join(id, "Alice")).await;
    let doc = recv_snapshot(&mut a, |_| true).await;
    let me = doc.creator.expect("joiner is creator");
    assert_eq!(doc.members.len(), 1);

    send(&mut a, ClientMessage::AddSlide).await;
    recv_snapshot(&mut a, |d| d.slides.len() == 2).await;
    assert_eq!(session.registry().resolve(id).await.unwrap().creator, Some(me));
}
