//! Shared API socket with per-type subscribers.
//!
//! One connection carries every exchange with the API server. Inbound
//! messages are routed by their `type` to at most one subscriber each; a new
//! subscription for a type replaces the old one. A `ping` is sent on a fixed
//! interval to keep the connection alive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ClientError;
use crate::protocol::{MuxMessage, PING};

type Callback = Box<dyn FnMut(&MuxMessage) + Send>;

enum Subscriber {
    Callback(Callback),
    Once(oneshot::Sender<MuxMessage>),
}

#[derive(Default)]
struct Registry {
    table: HashMap<String, Subscriber>,
    /// Bumped on every subscribe or unsubscribe of a type.
    generations: HashMap<String, u64>,
}

impl Registry {
    fn generation(&self, kind: &str) -> u64 {
        self.generations.get(kind).copied().unwrap_or(0)
    }

    fn touch(&mut self, kind: &str) {
        *self.generations.entry(kind.to_string()).or_default() += 1;
    }
}

type Subscribers = Arc<Mutex<Registry>>;

enum Outgoing {
    Text(String),
    Close,
}

/// Handle to the shared socket. Cheap to clone; the connection closes when
/// the last handle is dropped or [`WsMux::close`] is called.
#[derive(Clone)]
pub struct WsMux {
    outbound: mpsc::UnboundedSender<Outgoing>,
    subscribers: Subscribers,
    open: Arc<AtomicBool>,
}

impl WsMux {
    pub async fn connect(config: &Config, csrf_token: &str) -> Result<Self, ClientError> {
        let url = config.api_socket_url(csrf_token)?;
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        info!("Connected to API socket");
        Ok(Self::start(ws, config.heartbeat()))
    }

    pub fn start<S>(ws: WebSocketStream<S>, heartbeat: Duration) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let subscribers: Subscribers = Arc::new(Mutex::new(Registry::default()));
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(run(
            ws,
            heartbeat,
            outbound_rx,
            Arc::clone(&subscribers),
            Arc::clone(&open),
        ));

        Self {
            outbound,
            subscribers,
            open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Send `{type, data}`. Returns false when the socket is not open.
    pub fn send<T: Serialize>(&self, kind: &str, data: &T) -> bool {
        if !self.is_open() {
            debug!(kind, "Socket closed, dropping message");
            return false;
        }
        let text = match MuxMessage::new(kind, data).and_then(|m| m.encode()) {
            Ok(text) => text,
            Err(e) => {
                warn!(kind, "Failed to encode message: {e}");
                return false;
            }
        };
        self.outbound.send(Outgoing::Text(text)).is_ok()
    }

    /// Route every message of type `kind` to `callback`, replacing any
    /// previous subscriber.
    pub fn subscribe<F>(&self, kind: &str, callback: F)
    where
        F: FnMut(&MuxMessage) + Send + 'static,
    {
        self.insert(kind, Subscriber::Callback(Box::new(callback)));
    }

    /// Receive the next message of type `kind`, then unsubscribe.
    pub fn subscribe_once(&self, kind: &str) -> oneshot::Receiver<MuxMessage> {
        let (tx, rx) = oneshot::channel();
        self.insert(kind, Subscriber::Once(tx));
        rx
    }

    pub fn unsubscribe(&self, kind: &str) {
        if let Ok(mut registry) = self.subscribers.lock() {
            registry.table.remove(kind);
            registry.touch(kind);
        }
    }

    pub fn close(&self) {
        let _ = self.outbound.send(Outgoing::Close);
    }

    fn insert(&self, kind: &str, subscriber: Subscriber) {
        if let Ok(mut registry) = self.subscribers.lock() {
            registry.touch(kind);
            if registry.table.insert(kind.to_string(), subscriber).is_some() {
                debug!(kind, "Replaced existing subscriber");
            }
        }
    }
}

fn dispatch(subscribers: &Subscribers, message: MuxMessage) {
    // the table is unlocked while a callback runs so it may resubscribe or
    // unsubscribe; the callback goes back only if neither happened
    let (subscriber, generation) = match subscribers.lock() {
        Ok(mut registry) => (registry.table.remove(&message.kind), registry.generation(&message.kind)),
        Err(_) => return,
    };
    match subscriber {
        Some(Subscriber::Callback(mut callback)) => {
            callback(&message);
            if let Ok(mut registry) = subscribers.lock() {
                if registry.generation(&message.kind) == generation {
                    registry
                        .table
                        .insert(message.kind.clone(), Subscriber::Callback(callback));
                }
            }
        }
        Some(Subscriber::Once(tx)) => {
            let _ = tx.send(message);
        }
        None => debug!(kind = %message.kind, "No subscriber for message"),
    }
}

async fn run<S>(
    ws: WebSocketStream<S>,
    heartbeat: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outgoing>,
    subscribers: Subscribers,
    open: Arc<AtomicBool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    let ping = serde_json::json!({ "type": PING, "data": {} }).to_string();

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match MuxMessage::decode(text.as_str()) {
                    Ok(message) => dispatch(&subscribers, message),
                    Err(e) => warn!("Ignoring API socket message: {e}"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "API socket closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("API socket error: {e}");
                    break;
                }
                None => break,
            },
            outgoing = outbound.recv() => match outgoing {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!("API socket send failed: {e}");
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = sink.send(Message::Text(ping.clone().into())).await {
                    warn!("Heartbeat failed: {e}");
                    break;
                }
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    // pending one-shot subscribers observe the closed channel
    if let Ok(mut registry) = subscribers.lock() {
        registry.table.clear();
    }
    info!("API socket task finished");
}
