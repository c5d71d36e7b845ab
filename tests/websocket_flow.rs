//! End-to-end `/ws` protocol coverage: a real bound listener, a real
//! `tokio-tungstenite` client, real JSON frames.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use okey101_server::build_router;
use okey101_server::config::Timing;
use okey101_server::registry::Registry;

async fn spawn_server() -> String {
    let registry = Registry::new(Timing::default());
    let router = build_router(registry);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{addr}/ws")
}

async fn recv_json(
    stream: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Value {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream closed unexpectedly")
            .unwrap()
        {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn hello_then_room_create_yields_snapshot() {
    let url = spawn_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    ws.send(Message::Text(
        json!({"t": "HELLO", "p": {"userId": "alice"}}).to_string(),
    ))
    .await
    .unwrap();
    let hello_ok = recv_json(&mut ws).await;
    assert_eq!(hello_ok["t"], "HELLO_OK");

    // HELLO subscribes the connection to the lobby feed and pushes the
    // current room list immediately.
    let rooms_list = recv_json(&mut ws).await;
    assert_eq!(rooms_list["t"], "ROOMS_LIST");

    ws.send(Message::Text(
        json!({"t": "ROOM_CREATE", "p": {"userId": "alice"}}).to_string(),
    ))
    .await
    .unwrap();
    let created = recv_json(&mut ws).await;
    assert_eq!(created["t"], "ROOM_CREATED");
    let room_id = created["p"]["roomId"].as_str().unwrap().to_string();
    assert!(!room_id.is_empty());

    let snapshot = recv_json(&mut ws).await;
    assert_eq!(snapshot["t"], "ROOM_SNAPSHOT");
    assert_eq!(snapshot["p"]["roomId"], room_id);
    assert_eq!(snapshot["p"]["state"], "LOBBY");
    assert_eq!(snapshot["p"]["players"]["1"]["userId"], "alice");
}

#[tokio::test]
async fn room_join_fills_second_seat() {
    let url = spawn_server().await;

    let (mut owner, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    owner
        .send(Message::Text(
            json!({"t": "ROOM_CREATE", "p": {"userId": "owner"}}).to_string(),
        ))
        .await
        .unwrap();
    let created = recv_json(&mut owner).await;
    let room_id = created["p"]["roomId"].as_str().unwrap().to_string();
    let _owner_snapshot = recv_json(&mut owner).await;

    let (mut joiner, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    joiner
        .send(Message::Text(
            json!({"t": "ROOM_JOIN", "p": {"userId": "bob", "roomId": room_id}}).to_string(),
        ))
        .await
        .unwrap();
    let joined = recv_json(&mut joiner).await;
    assert_eq!(joined["t"], "ROOM_JOINED");
    let joiner_snapshot = recv_json(&mut joiner).await;
    assert_eq!(joiner_snapshot["p"]["players"]["2"]["userId"], "bob");

    // The owner's connection also gets a refreshed snapshot once bob joins.
    let owner_refresh = recv_json(&mut owner).await;
    assert_eq!(owner_refresh["t"], "ROOM_SNAPSHOT");
    assert_eq!(owner_refresh["p"]["players"]["2"]["userId"], "bob");
}

#[tokio::test]
async fn unknown_message_type_yields_error_frame() {
    let url = spawn_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    ws.send(Message::Text(json!({"t": "NOT_A_REAL_TYPE"}).to_string()))
        .await
        .unwrap();
    let err = recv_json(&mut ws).await;
    assert_eq!(err["t"], "ERROR");
    assert_eq!(err["p"]["code"], "UNKNOWN_TYPE");
}

#[tokio::test]
async fn room_join_missing_room_is_not_found() {
    let url = spawn_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    ws.send(Message::Text(
        json!({"t": "ROOM_JOIN", "p": {"userId": "alice", "roomId": "NOPE"}}).to_string(),
    ))
    .await
    .unwrap();
    let err = recv_json(&mut ws).await;
    assert_eq!(err["t"], "ERROR");
    assert_eq!(err["p"]["code"], "ROOM_NOT_FOUND");
}
