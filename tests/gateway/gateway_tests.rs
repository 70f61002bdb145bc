//! Gateway protocol tests over a live server

use std::collections::BTreeSet;
use std::time::Duration;

use chat_gateway::domain::Event;
use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::common::{RunningApp, TestApp};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(server: &RunningApp) -> Client {
    let (ws, _) = connect_async(server.gateway_url()).await.unwrap();
    ws
}

/// Next JSON frame; panics on close or timeout
async fn next_frame(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .unwrap();
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

/// Close code the server ends the session with
async fn close_code(ws: &mut Client) -> u16 {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("close in time")
            .expect("stream open")
            .unwrap();
        match msg {
            Message::Close(Some(frame)) => return frame.code.into(),
            Message::Close(None) => panic!("close frame without a code"),
            _ => continue,
        }
    }
}

async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Connect, consume HELLO and identify
async fn identified(app: &TestApp, server: &RunningApp, user_id: i64) -> Client {
    let token = app.issue_token(user_id, &["identify"]).await;
    let mut ws = connect(server).await;
    assert_eq!(next_frame(&mut ws).await["op"], 8);

    send_json(&mut ws, json!({"op": 2, "d": {"token": token}})).await;
    app.wait_online(user_id).await;
    ws
}

fn payload(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[tokio::test]
async fn test_hello_then_heartbeat_ack() {
    let app = TestApp::new();
    let server = app.spawn().await;
    let mut ws = connect(&server).await;

    let hello = next_frame(&mut ws).await;
    assert_eq!(hello, json!({"op": 8, "d": {"heartbeat_interval": 30000}}));

    send_json(&mut ws, json!({"op": 1, "d": null})).await;
    assert_eq!(next_frame(&mut ws).await, json!({"op": 9}));

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_user_is_invalidated() {
    let app = TestApp::new();
    let server = app.spawn().await;

    // Well-formed token for a user the store has never heard of
    let token = app
        .state
        .tokens
        .issue(42, b"whatever", 1, BTreeSet::new(), false)
        .await
        .unwrap()
        .to_string();

    let mut ws = connect(&server).await;
    next_frame(&mut ws).await;
    send_json(&mut ws, json!({"op": 2, "d": {"token": token}})).await;

    assert_eq!(next_frame(&mut ws).await, json!({"op": 7}));
    assert_eq!(close_code(&mut ws).await, 4004);
    assert!(!app.state.bus().is_user_online(42));

    server.shutdown().await;
}

#[tokio::test]
async fn test_protocol_violations_close_with_their_codes() {
    let app = TestApp::new();
    let server = app.spawn().await;

    let mut ws = connect(&server).await;
    next_frame(&mut ws).await;
    ws.send(Message::text("{not json")).await.unwrap();
    assert_eq!(close_code(&mut ws).await, 4002);

    let mut ws = connect(&server).await;
    next_frame(&mut ws).await;
    send_json(&mut ws, json!({"op": 42})).await;
    assert_eq!(close_code(&mut ws).await, 4001);

    server.shutdown().await;
}

#[tokio::test]
async fn test_local_event_reaches_channel_members_only() {
    let app = TestApp::new();
    app.add_user(1, vec![10]);
    app.add_user(2, vec![20]);
    let server = app.spawn().await;

    let mut member = identified(&app, &server, 1).await;
    let mut outsider = identified(&app, &server, 2).await;

    let event = Event::message_create(payload(json!({"channel_id": "10", "content": "hi"}))).unwrap();
    let delivered = app.state.bus().emit(event).await.unwrap();
    assert_eq!(delivered, 1);

    assert_eq!(
        next_frame(&mut member).await,
        json!({"op": 0, "t": "MESSAGE_CREATE", "d": {"channel_id": "10", "content": "hi"}})
    );

    // A global event proves the outsider's queue held nothing before it
    app.state
        .bus()
        .emit(Event::global("PING", Map::new()))
        .await
        .unwrap();
    assert_eq!(next_frame(&mut outsider).await["t"], "PING");

    server.shutdown().await;
}

#[tokio::test]
async fn test_user_update_reaches_contacts_and_self() {
    let app = TestApp::new();
    app.add_user(1, vec![10]);
    app.add_user(2, vec![10]);
    app.add_user(3, vec![30]);
    let server = app.spawn().await;

    let mut subject = identified(&app, &server, 1).await;
    let mut contact = identified(&app, &server, 2).await;
    let _stranger = identified(&app, &server, 3).await;

    let event = Event::user_update(payload(json!({"id": 1, "username": "renamed"}))).unwrap();
    let delivered = app.state.bus().emit(event).await.unwrap();
    assert_eq!(delivered, 2);

    assert_eq!(next_frame(&mut subject).await["t"], "USER_UPDATE");
    assert_eq!(next_frame(&mut contact).await["d"]["username"], "renamed");

    server.shutdown().await;
}

#[tokio::test]
async fn test_second_identify_is_rejected() {
    let app = TestApp::new();
    app.add_user(5, vec![]);
    let server = app.spawn().await;

    let mut ws = identified(&app, &server, 5).await;
    let token = app.issue_token(5, &[]).await;
    send_json(&mut ws, json!({"op": 2, "d": {"token": token}})).await;

    assert_eq!(close_code(&mut ws).await, 4003);

    server.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_removes_listener() {
    let app = TestApp::new();
    app.add_user(9, vec![90]);
    let server = app.spawn().await;

    let mut ws = identified(&app, &server, 9).await;
    ws.close(None).await.unwrap();

    let bus = app.state.bus().clone();
    tokio::time::timeout(Duration::from_secs(5), async move {
        while bus.is_user_online(9) || bus.connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("listener removed");
    assert_eq!(app.state.bus().channel_count(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_sockets_normally() {
    let app = TestApp::new();
    app.add_user(3, vec![]);
    let server = app.spawn().await;

    let mut anonymous = connect(&server).await;
    next_frame(&mut anonymous).await;
    let mut listener = identified(&app, &server, 3).await;

    server.shutdown().await;

    assert_eq!(close_code(&mut anonymous).await, 1000);
    assert_eq!(close_code(&mut listener).await, 1000);
}
