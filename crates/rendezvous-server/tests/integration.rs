//! End-to-end tests against a server bound to an ephemeral port.

use futures_util::{SinkExt, StreamExt};
use rendezvous_core::Hub;
use rendezvous_server::{serve, AppState, Config};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start(config: Config) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = Hub::spawn(config.hub_config());
    tokio::spawn(serve(listener, Arc::new(AppState::new(config, hub))));
    addr
}

async fn start_default() -> SocketAddr {
    start(Config::default()).await
}

/// Connect and consume the `init` greeting, returning the assigned id.
async fn connect(addr: SocketAddr) -> (Client, String) {
    let (mut client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    let init = next(&mut client).await;
    assert_eq!(init["type"], "init");
    let id = init["data"]["clientId"].as_str().unwrap().to_string();
    (client, id)
}

async fn send(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

async fn client_text(client: &mut Client, text: &str) {
    client.send(Message::Text(text.to_string())).await.unwrap();
}

async fn next(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out")
            .expect("stream ended")
            .unwrap();
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Binary(data) => return serde_json::from_slice(&data).unwrap(),
            _ => continue,
        }
    }
}

/// Assert nothing arrives within a short window.
async fn assert_silent(client: &mut Client) {
    let res = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
    assert!(res.is_err(), "unexpected message: {:?}", res);
}

async fn join(client: &mut Client, room: &str, username: &str) -> Value {
    send(
        client,
        json!({ "type": "join", "data": { "room": room, "username": username } }),
    )
    .await;
    next(client).await
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_init_assigns_distinct_ids() {
    let addr = start_default().await;
    let (_a, a) = connect(addr).await;
    let (_b, b) = connect(addr).await;
    assert!(!a.is_empty());
    assert_ne!(a, b);
}

#[tokio::test]
async fn test_join_empty_room() {
    let addr = start_default().await;
    let (mut alice, _) = connect(addr).await;

    let joined = join(&mut alice, "R", "Alice").await;
    assert_eq!(joined["type"], "room-joined");
    assert_eq!(joined["data"], json!({ "room": "R", "peers": [] }));
}

#[tokio::test]
async fn test_second_member_sees_first() {
    let addr = start_default().await;
    let (mut alice, alice_id) = connect(addr).await;
    join(&mut alice, "R", "Alice").await;

    let (mut bob, bob_id) = connect(addr).await;
    let joined = join(&mut bob, "R", "Bob").await;
    assert_eq!(
        joined["data"],
        json!({ "room": "R", "peers": [{ "id": alice_id, "username": "Alice" }] })
    );

    let new_peer = next(&mut alice).await;
    assert_eq!(new_peer["type"], "new-peer");
    assert_eq!(new_peer["sender"], bob_id.as_str());
    assert_eq!(new_peer["data"], json!({ "id": bob_id, "username": "Bob" }));
}

#[tokio::test]
async fn test_top_level_join_fields_and_default_username() {
    let addr = start_default().await;
    let (mut alice, alice_id) = connect(addr).await;
    send(&mut alice, json!({ "type": "join", "room": "R" })).await;
    assert_eq!(next(&mut alice).await["type"], "room-joined");

    let (mut bob, _) = connect(addr).await;
    let joined = join(&mut bob, "R", "Bob").await;
    assert_eq!(
        joined["data"]["peers"],
        json!([{ "id": alice_id, "username": "Anonymous" }])
    );
}

#[tokio::test]
async fn test_disconnect_notifies_and_prunes_room() {
    let addr = start_default().await;
    let (mut alice, alice_id) = connect(addr).await;
    join(&mut alice, "R", "Alice").await;
    let (mut bob, bob_id) = connect(addr).await;
    join(&mut bob, "R", "Bob").await;
    next(&mut alice).await;

    alice.close(None).await.unwrap();
    let left = next(&mut bob).await;
    assert_eq!(left["type"], "peer-left");
    assert_eq!(left["sender"], alice_id.as_str());

    // A newcomer only sees Bob
    let (mut carol, _) = connect(addr).await;
    let joined = join(&mut carol, "R", "Carol").await;
    assert_eq!(
        joined["data"]["peers"],
        json!([{ "id": bob_id, "username": "Bob" }])
    );

    carol.close(None).await.unwrap();
    next(&mut bob).await;
    bob.close(None).await.unwrap();

    // Last member gone, room deleted
    tokio::time::sleep(Duration::from_millis(100)).await;
    let health = http_get(addr, "/health").await;
    assert!(health.contains("\"rooms\":0"), "{}", health);
}

#[tokio::test]
async fn test_directed_offer_reaches_only_recipient() {
    let addr = start_default().await;
    let (mut alice, alice_id) = connect(addr).await;
    join(&mut alice, "R", "Alice").await;
    let (mut bob, bob_id) = connect(addr).await;
    join(&mut bob, "R", "Bob").await;
    next(&mut alice).await;
    let (mut carol, _) = connect(addr).await;
    join(&mut carol, "R", "Carol").await;
    next(&mut alice).await;
    next(&mut bob).await;

    let payload = json!({ "type": "offer", "sdp": "v=0\r\n" });
    send(
        &mut alice,
        json!({ "type": "offer", "sender": "forged", "recipient": bob_id, "data": payload }),
    )
    .await;

    let offer = next(&mut bob).await;
    assert_eq!(offer["type"], "offer");
    assert_eq!(offer["sender"], alice_id.as_str());
    assert_eq!(offer["data"], payload);

    assert_silent(&mut carol).await;
    assert_silent(&mut alice).await;
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_room_broadcast_skips_sender() {
    let addr = start_default().await;
    let (mut alice, alice_id) = connect(addr).await;
    join(&mut alice, "R", "Alice").await;
    let (mut bob, _) = connect(addr).await;
    join(&mut bob, "R", "Bob").await;
    next(&mut alice).await;

    let candidate = json!({ "candidate": "candidate:1 1 UDP 1 10.0.0.1 9 typ host" });
    send(
        &mut alice,
        json!({ "type": "ice-candidate", "room": "R", "data": candidate }),
    )
    .await;

    let received = next(&mut bob).await;
    assert_eq!(received["type"], "ice-candidate");
    assert_eq!(received["sender"], alice_id.as_str());
    assert_eq!(received["data"], candidate);
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn test_malformed_input_keeps_session_open() {
    let addr = start_default().await;
    let (mut alice, _) = connect(addr).await;

    client_text(&mut alice, "not json").await;
    send(&mut alice, json!({ "type": "chat", "data": "hi" })).await;
    send(&mut alice, json!({ "type": "join" })).await;

    let joined = join(&mut alice, "R", "Alice").await;
    assert_eq!(joined["type"], "room-joined");
}

#[tokio::test]
async fn test_binary_frames_are_accepted() {
    let addr = start_default().await;
    let (mut alice, _) = connect(addr).await;

    // Invalid UTF-8 is dropped without closing the session
    alice
        .send(Message::Binary(vec![0xff, 0xfe, 0x00, 0x7b]))
        .await
        .unwrap();

    let join = json!({ "type": "join", "data": { "room": "R", "username": "Alice" } });
    alice
        .send(Message::Binary(join.to_string().into_bytes()))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), alice.next())
        .await
        .expect("timed out")
        .expect("stream ended")
        .unwrap();
    let Message::Text(text) = reply else {
        panic!("Expected a text frame, got {:?}", reply);
    };
    let joined: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(joined["type"], "room-joined");
    assert_eq!(joined["data"], json!({ "room": "R", "peers": [] }));
}

#[tokio::test]
async fn test_leave_closes_connection() {
    let addr = start_default().await;
    let (mut alice, _) = connect(addr).await;
    join(&mut alice, "R", "Alice").await;

    send(&mut alice, json!({ "type": "leave" })).await;
    let end = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match alice.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(end.is_ok());
}

#[tokio::test]
async fn test_connection_cap() {
    let mut config = Config::default();
    config.limits.max_connections = 1;
    let addr = start(config).await;

    let (_alice, _) = connect(addr).await;
    let err = connect_async(format!("ws://{}/ws", addr)).await.unwrap_err();
    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 503),
        other => panic!("Expected HTTP error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_banner_and_health() {
    let addr = start_default().await;

    let banner = http_get(addr, "/").await;
    assert!(banner.starts_with("HTTP/1.1 200"));
    assert!(banner.ends_with("WebRTC Signaling Server"));

    let (mut alice, _) = connect(addr).await;
    join(&mut alice, "R", "Alice").await;

    let health = http_get(addr, "/health").await;
    assert!(health.starts_with("HTTP/1.1 200"));
    let body = health.split("\r\n\r\n").nth(1).unwrap();
    let body: Value = serde_json::from_str(body).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 1);
    assert_eq!(body["rooms"], 1);
}
