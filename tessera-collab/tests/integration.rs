//! Integration tests for end-to-end WebSocket collaboration.
//!
//! These tests start a real relay on a free port and connect a real
//! provider, verifying the full sync pipeline over the network.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tessera_collab::{Message, Provider, ProviderConfig, SessionConfig, StaticToken, Status};
use tessera_core::{DocumentStore, Element};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

type RelaySocket = WebSocketStream<TcpStream>;

/// Accept WebSocket connections on a free port, handing each one to the
/// test together with its request URI.
async fn start_relay() -> (u16, mpsc::UnboundedReceiver<(String, RelaySocket)>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut uri = String::new();
                let capture = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    uri = req.uri().to_string();
                    Ok(resp)
                };
                if let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, capture).await {
                    let _ = tx.send((uri, ws));
                }
            });
        }
    });
    (port, rx)
}

async fn next_socket(rx: &mut mpsc::UnboundedReceiver<(String, RelaySocket)>) -> (String, RelaySocket) {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Client should connect within timeout")
        .expect("Relay should stay up")
}

async fn recv_message(ws: &mut RelaySocket) -> Message {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Frame within timeout")
            .expect("Socket open")
            .expect("Valid frame");
        if let WsMessage::Text(text) = frame {
            return Message::decode(text.as_str()).expect("Decodable frame");
        }
    }
}

async fn send_message(ws: &mut RelaySocket, msg: &Message) {
    ws.send(WsMessage::Text(msg.encode().unwrap().into())).await.unwrap();
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "Timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn tree(ids: &[&str]) -> Vec<Element> {
    ids.iter().map(|id| Element::with_id(*id, "Frame")).collect()
}

fn provider(port: u16, store: Arc<DocumentStore>) -> Provider {
    let session = SessionConfig::new(format!("ws://127.0.0.1:{port}"), "proj-1")
        .with_project_id("p-1")
        .with_reconnect_delay(Duration::from_millis(100));
    Provider::with_websocket(
        ProviderConfig::new(session, "me"),
        store,
        Arc::new(StaticToken::new("secret")),
    )
}

#[tokio::test]
async fn test_provider_joins_room_and_syncs() {
    let (port, mut sockets) = start_relay().await;
    let store = Arc::new(DocumentStore::new());
    let provider = provider(port, store.clone());

    provider.connect();
    let (uri, mut ws) = next_socket(&mut sockets).await;
    assert_eq!(uri, "/ws/proj-1?token=secret&projectId=p-1");
    assert_eq!(recv_message(&mut ws).await, Message::sync_request());

    send_message(&mut ws, &Message::Sync { elements: tree(&["a", "b"]) }).await;
    wait_until("baseline", || store.elements() == tree(&["a", "b"])).await;
    assert!(provider.is_synced());
    assert_eq!(provider.status(), Some(Status::Connected));
}

#[tokio::test]
async fn test_room_update_then_local_child() {
    let (port, mut sockets) = start_relay().await;
    let store = Arc::new(DocumentStore::new());
    let provider = provider(port, store.clone());

    provider.connect();
    let (_, mut ws) = next_socket(&mut sockets).await;
    assert_eq!(recv_message(&mut ws).await, Message::sync_request());

    // The relay answers with an update instead of a baseline
    let frame = Element::with_id("1", "Frame");
    send_message(&mut ws, &Message::update(vec![frame.clone()])).await;
    wait_until("remote frame", || store.elements() == vec![frame.clone()]).await;

    store.add_element(Element::with_id("2", "Text").with_parent("1"));
    match recv_message(&mut ws).await {
        Message::Update { elements } => {
            let ids = tessera_core::element::collect_ids(&elements);
            assert!(ids.contains(&"1".to_string()));
            assert!(ids.contains(&"2".to_string()));
        }
        other => panic!("Expected update, got {other:?}"),
    }

    // The sync timeout still marks the session synced
    wait_until("sync timeout", || provider.is_synced()).await;
}

#[tokio::test]
async fn test_local_and_remote_edits_flow() {
    let (port, mut sockets) = start_relay().await;
    let store = Arc::new(DocumentStore::new());
    let provider = provider(port, store.clone());

    provider.connect();
    let (_, mut ws) = next_socket(&mut sockets).await;
    recv_message(&mut ws).await;
    send_message(&mut ws, &Message::Sync { elements: tree(&["a"]) }).await;
    wait_until("baseline", || store.elements() == tree(&["a"])).await;

    // Local edit goes out as a full-tree update
    store.add_element(Element::with_id("b", "Rect"));
    match recv_message(&mut ws).await {
        Message::Update { elements } => assert_eq!(elements, store.elements()),
        other => panic!("Expected update, got {other:?}"),
    }

    // Another client's update lands in the store and is not echoed
    send_message(&mut ws, &Message::update(tree(&["a", "remote"]))).await;
    wait_until("remote update", || store.elements() == tree(&["a", "remote"])).await;
    assert!(
        timeout(Duration::from_millis(200), ws.next()).await.is_err(),
        "Remote update must not be echoed"
    );
}

#[tokio::test]
async fn test_reconnect_after_relay_drop() {
    let (port, mut sockets) = start_relay().await;
    let store = Arc::new(DocumentStore::new());
    let provider = provider(port, store.clone());

    provider.connect();
    let (_, mut first) = next_socket(&mut sockets).await;
    recv_message(&mut first).await;
    send_message(&mut first, &Message::Sync { elements: tree(&["a", "b"]) }).await;
    wait_until("first baseline", || store.elements() == tree(&["a", "b"])).await;

    first.close(None).await.unwrap();
    drop(first);
    wait_until("disconnect", || !provider.is_connected()).await;

    let (_, mut second) = next_socket(&mut sockets).await;
    assert_eq!(recv_message(&mut second).await, Message::sync_request());
    send_message(&mut second, &Message::Sync { elements: tree(&["a", "b", "c"]) }).await;
    wait_until("second baseline", || store.elements() == tree(&["a", "b", "c"])).await;
    assert!(provider.is_synced());
}

#[tokio::test]
async fn test_destroy_closes_socket() {
    let (port, mut sockets) = start_relay().await;
    let provider = provider(port, Arc::new(DocumentStore::new()));

    provider.connect();
    let (_, mut ws) = next_socket(&mut sockets).await;
    recv_message(&mut ws).await;

    provider.destroy();
    timeout(Duration::from_secs(5), provider.session().closed())
        .await
        .expect("Session task should exit");

    // The relay sees a close frame or the end of the stream
    loop {
        match timeout(Duration::from_secs(5), ws.next()).await.expect("Close within timeout") {
            Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => continue,
        }
    }

    // No reconnect follows
    assert!(timeout(Duration::from_millis(300), sockets.recv()).await.is_err());
}
