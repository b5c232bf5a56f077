//! End-to-end relay scenarios over real WebSocket connections.
mod common;

use std::net::SocketAddr;
use std::time::Duration;

use camwatch_common::{ExternalId, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("Failed to connect");
    ws
}

async fn send(ws: &mut Client, frame: Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

/// Next server event, or `None` when nothing arrives in time
async fn next_event(ws: &mut Client, wait_ms: u64) -> Option<ServerEvent> {
    loop {
        let message = timeout(Duration::from_millis(wait_ms), ws.next()).await.ok()??.ok()?;
        if let Message::Text(text) = message {
            return Some(serde_json::from_str(text.as_str()).unwrap());
        }
    }
}

/// Wait for a roster update listing exactly `expected`
async fn expect_roster(ws: &mut Client, expected: &[&str]) {
    loop {
        match next_event(ws, 2000).await {
            Some(ServerEvent::GetUsers(entries)) => {
                let ids: Vec<ExternalId> = entries.into_iter().map(|e| e.user_id).collect();
                let wanted: Vec<ExternalId> = expected.iter().map(|s| ExternalId::from(*s)).collect();
                if ids == wanted {
                    return;
                }
            },
            Some(_) => {},
            None => panic!("no roster {expected:?} received"),
        }
    }
}

/// Wait for a roster update that includes `user`
async fn expect_listed(ws: &mut Client, user: &str) {
    loop {
        match next_event(ws, 2000).await {
            Some(ServerEvent::GetUsers(entries)) if entries.iter().any(|e| e.user_id.as_str() == user) => return,
            Some(_) => {},
            None => panic!("{user} never appeared in the roster"),
        }
    }
}

/// Skip roster updates and return the next other event
async fn next_non_roster(ws: &mut Client, wait_ms: u64) -> Option<ServerEvent> {
    loop {
        match next_event(ws, wait_ms).await? {
            ServerEvent::GetUsers(_) => {},
            other => return Some(other),
        }
    }
}

#[tokio::test]
async fn test_presence_and_direct_messages() {
    let (state, _temp_dir) = common::default_state();
    let addr = common::spawn_server(state.clone()).await;

    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    send(&mut alice, json!({"event": "add-new-user", "data": "u1"})).await;
    expect_roster(&mut alice, &["u1"]).await;
    send(&mut bob, json!({"event": "add-new-user", "data": 2})).await;
    expect_roster(&mut alice, &["u1", "2"]).await;
    expect_roster(&mut bob, &["u1", "2"]).await;

    send(
        &mut bob,
        json!({"event": "send-message", "data": {"receiverId": "u1", "text": "hi", "senderId": "2"}}),
    )
    .await;
    let Some(ServerEvent::ReceiveMessage(msg)) = next_non_roster(&mut alice, 2000).await else {
        panic!("expected receive-message");
    };
    assert_eq!(msg.body["text"], "hi");

    // leaving updates everybody's roster
    alice.close(None).await.unwrap();
    expect_roster(&mut bob, &["2"]).await;
    assert_eq!(state.registry.full_roster(), vec![ExternalId::from("2")]);
}

#[tokio::test]
async fn test_comment_room_fan_out() {
    let (state, _temp_dir) = common::default_state();
    let addr = common::spawn_server(state).await;

    let mut poster = connect(addr).await;
    let mut reader = connect(addr).await;
    let mut elsewhere = connect(addr).await;

    // frames of one connection are handled in order, so seeing every user in
    // the roster means every room join before it has landed too
    for (ws, room, user) in [(&mut poster, "c1", "p"), (&mut reader, "c1", "r"), (&mut elsewhere, "c9", "e")] {
        send(ws, json!({"event": "add-new-comment", "data": room})).await;
        send(ws, json!({"event": "add-new-user", "data": user})).await;
        expect_listed(ws, user).await;
    }

    send(
        &mut poster,
        json!({
            "event": "send-comment",
            "data": {"datas": {"course_id": "c1", "commenttable_id": 7, "comment": "first!"}, "user": {"name": "ann"}}
        }),
    )
    .await;

    let Some(ServerEvent::ReceiveComment(posted)) = next_non_roster(&mut reader, 2000).await else {
        panic!("expected receive-comment");
    };
    assert_eq!(posted.datas.comment, "first!");
    assert_eq!(posted.datas.user, json!({"name": "ann"}));
    assert_eq!(posted.received_comments.len(), 1);

    send(
        &mut poster,
        json!({"event": "update-comment", "data": {"course_id": "c1", "commenttable_id": 7, "comment": "edited", "type": "course"}}),
    )
    .await;
    let Some(ServerEvent::UpdateRespondComment(edited)) = next_non_roster(&mut reader, 2000).await else {
        panic!("expected update-respond-comment");
    };
    assert_eq!(edited.comments[0].comment, "edited");

    assert!(next_non_roster(&mut elsewhere, 200).await.is_none());
    assert!(next_non_roster(&mut poster, 200).await.is_none());
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let (state, _temp_dir) = common::default_state();
    let addr = common::spawn_server(state).await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("{not json".to_string().into())).await.unwrap();
    let Some(ServerEvent::Error { code, .. }) = next_event(&mut ws, 2000).await else {
        panic!("expected error event");
    };
    assert_eq!(code, "MALFORMED_MESSAGE");

    send(&mut ws, json!({"event": "add-new-user", "data": "still-here"})).await;
    expect_roster(&mut ws, &["still-here"]).await;
}
