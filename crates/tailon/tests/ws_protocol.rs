//! The command protocol over a real WebSocket connection

mod common;

use async_net::TcpStream;
use async_tungstenite::WebSocketStream;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::io::Write;
use std::time::Duration;
use tungstenite::Message;

async fn connect(addr: &str, path: &str) -> WebSocketStream<TcpStream> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (ws, _) = async_tungstenite::client_async(format!("ws://{addr}{path}"), stream)
        .await
        .unwrap();
    ws
}

async fn send(ws: &mut WebSocketStream<TcpStream>, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

async fn recv(ws: &mut WebSocketStream<TcpStream>) -> Value {
    let next = smol::future::or(async { ws.next().await }, async {
        smol::Timer::after(Duration::from_secs(5)).await;
        None
    })
    .await;

    match next {
        Some(Ok(Message::Text(text))) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

async fn recv_until<F: Fn(&Value) -> bool>(ws: &mut WebSocketStream<TcpStream>, pred: F) -> Value {
    loop {
        let frame = recv(ws).await;
        if pred(&frame) {
            return frame;
        }
    }
}

#[smol_potat::test]
async fn test_list_then_tail_then_grep() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    std::fs::write(&log, "alpha\nbeta\n").unwrap();
    let path = log.to_str().unwrap().to_string();

    let addr = common::start_server("/logs/", true, vec![format!("group=apps,{path}")]).await;
    let mut ws = connect(&addr, "/logs/ws").await;

    send(&mut ws, json!(["list"])).await;
    let listing = recv(&mut ws).await;
    assert_eq!(listing["apps"][0]["path"], path.as_str());
    assert_eq!(listing["apps"][0]["exists"], true);
    assert_eq!(listing["apps"][0]["size"], 11);

    let entry = listing["apps"][0].clone();
    send(&mut ws, json!({"command": "tail", "script": null, "entry": entry, "nlines": 1})).await;
    assert_eq!(recv(&mut ws).await, json!(["ok", "tail", path]));
    assert_eq!(recv(&mut ws).await, json!(["o", "beta"]));

    let mut file = std::fs::OpenOptions::new().append(true).open(&log).unwrap();
    writeln!(file, "gamma").unwrap();
    recv_until(&mut ws, |f| *f == json!(["o", "gamma"])).await;

    send(&mut ws, json!({"command": "grep", "script": "^d", "entry": {"path": path}, "nlines": 0})).await;
    recv_until(&mut ws, |f| *f == json!(["ok", "grep", path])).await;

    writeln!(file, "epsilon").unwrap();
    writeln!(file, "delta").unwrap();
    recv_until(&mut ws, |f| f[0] == "o" && f[1] == "delta").await;

    ws.close(None).await.unwrap();
}

#[smol_potat::test]
async fn test_errors_do_not_close_the_connection() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    std::fs::write(&log, "x\n").unwrap();
    let path = log.to_str().unwrap().to_string();

    let addr = common::start_server("/", true, vec![path.clone()]).await;
    let mut ws = connect(&addr, "/ws").await;

    ws.send(Message::text("{not json")).await.unwrap();
    let frame = recv(&mut ws).await;
    assert_eq!(frame[0], "error");
    assert_eq!(frame[1], "protocol");

    send(&mut ws, json!({"command": "frobnicate"})).await;
    assert_eq!(recv(&mut ws).await[1], "protocol");

    send(&mut ws, json!({"command": "tail", "entry": {"path": "/etc/passwd"}, "nlines": 1})).await;
    let frame = recv(&mut ws).await;
    assert_eq!(frame[1], "validation");

    send(&mut ws, json!({"command": "grep", "script": "(", "entry": {"path": path}, "nlines": 1})).await;
    assert_eq!(recv(&mut ws).await[1], "validation");

    send(&mut ws, json!("list")).await;
    assert!(recv(&mut ws).await.is_object());
}

#[smol_potat::test]
async fn test_envelope_frames_are_unwrapped() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("app.log");
    std::fs::write(&log, "one\n").unwrap();
    let path = log.to_str().unwrap().to_string();

    let addr = common::start_server("/", true, vec![path.clone()]).await;
    let mut ws = connect(&addr, "/ws/000/abcdefgh/websocket").await;

    let tail = json!({"command": "tail", "entry": {"path": path}, "nlines": 5}).to_string();
    send(&mut ws, json!([json!({"command": "list"}).to_string(), tail])).await;

    assert!(recv(&mut ws).await.is_object());
    assert_eq!(recv(&mut ws).await, json!(["ok", "tail", path]));
    assert_eq!(recv(&mut ws).await, json!(["o", "one"]));
}
