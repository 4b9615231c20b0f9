//! Integration tests for the shared API socket and the matchmaking queue.

mod common;

use std::time::Duration;

use client::matchmaking::Matchmaker;
use client::mux::WsMux;
use client::ClientError;
use common::{SocketStub, RECV_TIMEOUT};
use serde_json::json;
use tokio::sync::mpsc;

async fn connect(server: &SocketStub, heartbeat_secs: u64) -> WsMux {
    let config = client::config::Config {
        heartbeat_secs,
        ..common::config(&server.base_url)
    };
    WsMux::connect(&config, "csrf-1")
        .await
        .expect("Failed to connect API socket")
}

#[tokio::test]
async fn test_join_queue_resolves_with_room_id() {
    let mut server = SocketStub::spawn("/api/ws").await;
    let mux = connect(&server, 60).await;
    let matchmaker = Matchmaker::new(mux.clone());

    let ticket = matchmaker.join_queue("alice-id").expect("join_queue failed");
    let join = server.recv_kind("joinQueue").await;
    assert_eq!(join["data"], json!({ "id": "alice-id" }));

    server.push(json!({ "type": "matchFound", "data": { "roomId": "room-9" } }));
    let room = tokio::time::timeout(RECV_TIMEOUT, ticket.match_found())
        .await
        .expect("Timed out waiting for a match")
        .expect("Match was not found");
    assert_eq!(room, "room-9");

    mux.close();
}

#[tokio::test]
async fn test_leave_queue_cancels_ticket() {
    let mut server = SocketStub::spawn("/api/ws").await;
    let mux = connect(&server, 60).await;
    let matchmaker = Matchmaker::new(mux);

    let ticket = matchmaker.join_queue("alice-id").expect("join_queue failed");
    assert!(matchmaker.leave_queue());
    server.recv_kind("leaveQueue").await;

    let result = tokio::time::timeout(RECV_TIMEOUT, ticket.match_found())
        .await
        .expect("Ticket did not resolve");
    assert!(matches!(result, Err(ClientError::Closed)));
}

#[tokio::test]
async fn test_heartbeat_pings_keep_the_socket_alive() {
    let mut server = SocketStub::spawn("/api/ws").await;
    let _mux = connect(&server, 1).await;

    let ping = server.recv_kind("ping").await;
    assert_eq!(ping["data"], json!({}));
}

#[tokio::test]
async fn test_subscribers_are_routed_by_type_and_replaced() {
    let server = SocketStub::spawn("/api/ws").await;
    let mux = connect(&server, 60).await;

    let (first_tx, mut first_rx) = mpsc::unbounded_channel();
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();
    mux.subscribe("notice", move |msg| {
        let _ = first_tx.send(msg.data.clone());
    });
    mux.subscribe("notice", move |msg| {
        let _ = second_tx.send(msg.data.clone());
    });

    server.push(json!({ "type": "other", "data": {} }));
    server.push(json!({ "type": "notice", "data": { "n": 1 } }));
    server.push(json!({ "type": "notice", "data": { "n": 2 } }));

    for n in [1, 2] {
        let data = tokio::time::timeout(RECV_TIMEOUT, second_rx.recv())
            .await
            .expect("Timed out waiting for a notice")
            .expect("Subscriber dropped");
        assert_eq!(data, json!({ "n": n }));
    }
    // the replaced subscriber was dropped with its sender
    assert!(first_rx.recv().await.is_none());
}

#[tokio::test]
async fn test_callback_can_unsubscribe_itself() {
    let server = SocketStub::spawn("/api/ws").await;
    let mux = connect(&server, 60).await;

    let (hits_tx, mut hits_rx) = mpsc::unbounded_channel();
    let handle = mux.clone();
    mux.subscribe("matchFound", move |msg| {
        handle.unsubscribe("matchFound");
        let _ = hits_tx.send(msg.data.clone());
    });
    let done = mux.subscribe_once("done");

    server.push(json!({ "type": "matchFound", "data": { "roomId": "room-1" } }));
    server.push(json!({ "type": "matchFound", "data": { "roomId": "room-2" } }));
    server.push(json!({ "type": "done", "data": {} }));
    tokio::time::timeout(RECV_TIMEOUT, done)
        .await
        .expect("Timed out waiting for the last frame")
        .expect("Socket closed early");

    assert_eq!(hits_rx.recv().await, Some(json!({ "roomId": "room-1" })));
    // the callback was dropped after the first frame
    assert_eq!(hits_rx.recv().await, None);
}

#[tokio::test]
async fn test_send_fails_once_closed() {
    let server = SocketStub::spawn("/api/ws").await;
    let mux = connect(&server, 60).await;
    assert!(mux.is_open());

    mux.close();
    let closed = async {
        while mux.is_open() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(RECV_TIMEOUT, closed)
        .await
        .expect("Socket did not close");
    assert!(!mux.send("joinQueue", &json!({ "id": "alice-id" })));
    drop(server);
}
