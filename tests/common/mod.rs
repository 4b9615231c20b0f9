//! Local stand-ins for the external services, served by axum on an
//! ephemeral port.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use client::config::Config;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// How long a test waits for a frame before failing.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve `app` on 127.0.0.1 and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });
    format!("http://{addr}")
}

/// Config pointing every service at `base_url`, with a slow heartbeat so
/// pings do not interleave with scripted frames.
pub fn config(base_url: &str) -> Config {
    Config {
        heartbeat_secs: 60,
        http_timeout_secs: 5,
        ..Config::for_base_url(base_url)
    }
}

type Pending = Arc<Mutex<Option<(mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>)>>>;

/// A WebSocket endpoint accepting one connection. Frames the client sends
/// come out of `recv`; frames passed to `push` go to the client. Dropping the
/// stub closes the socket.
pub struct SocketStub {
    pub base_url: String,
    received: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

impl SocketStub {
    pub async fn spawn(path: &str) -> Self {
        let (to_test, received) = mpsc::unbounded_channel();
        let (outgoing, from_test) = mpsc::unbounded_channel();
        let pending: Pending = Arc::new(Mutex::new(Some((to_test, from_test))));

        let app = Router::new().route(path, get(socket)).with_state(pending);
        let base_url = serve(app).await;
        Self {
            base_url,
            received,
            outgoing,
        }
    }

    /// Next text frame from the client, parsed as JSON.
    pub async fn recv(&mut self) -> Value {
        let text = tokio::time::timeout(RECV_TIMEOUT, self.received.recv())
            .await
            .expect("Timed out waiting for a client frame")
            .expect("Socket closed before a frame arrived");
        serde_json::from_str(&text).expect("Client sent invalid JSON")
    }

    /// Next frame whose `type` is `kind`, skipping others.
    pub async fn recv_kind(&mut self, kind: &str) -> Value {
        loop {
            let frame = self.recv().await;
            if frame["type"] == kind {
                return frame;
            }
        }
    }

    pub fn push(&self, frame: Value) {
        self.outgoing
            .send(frame.to_string())
            .expect("Socket task has stopped");
    }
}

async fn socket(ws: WebSocketUpgrade, State(pending): State<Pending>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let taken = pending.lock().expect("Poisoned stub").take();
        let Some((to_test, from_test)) = taken else {
            return;
        };
        relay(socket, to_test, from_test).await;
    })
}

async fn relay(
    socket: WebSocket,
    to_test: mpsc::UnboundedSender<String>,
    mut from_test: mpsc::UnboundedReceiver<String>,
) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = to_test.send(text.as_str().to_string());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            out = from_test.recv() => match out {
                Some(text) => {
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}

/// `{type, data}` frame with `data` as a JSON-encoded string, the way the
/// game server sends it.
pub fn game_frame(kind: &str, data: Value) -> Value {
    serde_json::json!({ "type": kind, "data": data.to_string() })
}

/// Decode the string `data` of a game socket frame.
pub fn frame_data(frame: &Value) -> Value {
    let text = frame["data"].as_str().expect("data is not a string");
    serde_json::from_str(text).expect("data is not JSON")
}
