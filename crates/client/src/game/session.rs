//! Socket driver for a live game.
//!
//! One task owns the WebSocket and the [`GameController`]. The rest of the
//! program talks to it through [`GameSession`]: commands go in over an mpsc
//! channel, events come out over another, and the latest view of the game is
//! published on a watch channel.

use chess_core::board::BoardState;
use chess_core::navigator::{MoveRow, Navigator, PageChange};
use chess_core::selection::Selection;
use futures::{SinkExt, StreamExt};
use shakmaty::Square;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use super::{GameController, Players, SessionEvent, SessionState};
use crate::config::Config;
use crate::error::ClientError;
use crate::protocol::{GameStatus, InboundMessage, OutboundMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    First,
    Prev,
    Next,
    Last,
    To(usize),
}

impl Step {
    fn apply(self, navigator: &mut Navigator) -> Option<PageChange> {
        match self {
            Step::First => navigator.first(),
            Step::Prev => navigator.prev(),
            Step::Next => navigator.next(),
            Step::Last => navigator.last(),
            Step::To(index) => navigator.go_to(index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    PlaySan(String),
    Click(Square),
    Navigate(Step),
    Flip,
    Resign,
    DismissEnd,
    Close,
}

/// Everything a front end needs to draw the game page.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub board: BoardState,
    pub selection: Selection,
    pub rows: Vec<MoveRow>,
    pub current_page: usize,
    pub state: SessionState,
    pub status: GameStatus,
    pub players: Players,
    pub disconnected: bool,
}

impl Snapshot {
    pub fn of(controller: &GameController) -> Self {
        Self {
            board: controller.board_state(),
            selection: controller.selection().clone(),
            rows: controller.navigator().move_rows(),
            current_page: controller.navigator().current_index(),
            state: controller.state().clone(),
            status: controller.status(),
            players: controller.players().clone(),
            disconnected: controller.is_disconnected(),
        }
    }
}

pub struct GameSession {
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    snapshot: watch::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl GameSession {
    /// Open the game socket for `room_id` and start the session task.
    pub async fn connect(
        config: &Config,
        csrf_token: &str,
        room_id: &str,
        client_id: &str,
    ) -> Result<Self, ClientError> {
        let url = config.game_socket_url(csrf_token)?;
        info!(room_id, "Connecting to game server");
        let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        Ok(Self::start(ws, GameController::new(room_id, client_id)))
    }

    pub fn start<S>(ws: WebSocketStream<S>, controller: GameController) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::of(&controller));

        let task = tokio::spawn(run(ws, controller, command_rx, event_tx, snapshot_tx));

        Self {
            commands: command_tx,
            events: event_rx,
            snapshot: snapshot_rx,
            task,
        }
    }

    /// Queue a command. Returns false once the session has ended.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn play_san(&self, notation: &str) -> bool {
        self.send(Command::PlaySan(notation.to_string()))
    }

    pub fn navigate(&self, step: Step) -> bool {
        self.send(Command::Navigate(step))
    }

    pub fn resign(&self) -> bool {
        self.send(Command::Resign)
    }

    /// Next event, or None once the session task has finished.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that is notified every time a new snapshot is published.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Close the socket and wait for the session task to finish.
    pub async fn close(self) {
        let _ = self.commands.send(Command::Close);
        if let Err(e) = self.task.await {
            warn!("Game session task failed: {e}");
        }
    }
}

async fn run<S>(
    ws: WebSocketStream<S>,
    mut controller: GameController,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    snapshot: watch::Sender<Snapshot>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    // events raised in one iteration go out after the snapshot is published
    let mut outbox: Vec<SessionEvent> = Vec::new();

    if let Err(e) = send_msg(&mut sink, &controller.on_open()).await {
        let event = controller.on_close(None, e.to_string());
        let _ = snapshot.send(Snapshot::of(&controller));
        let _ = events.send(event);
        return;
    }

    loop {
        let mut finished = false;
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match InboundMessage::decode(text.as_str()) {
                    Ok(message) => {
                        let reaction = controller.handle(message);
                        for reply in &reaction.replies {
                            if let Err(e) = send_msg(&mut sink, reply).await {
                                warn!(kind = reply.kind(), "Failed to send reply: {e}");
                            }
                        }
                        outbox.extend(reaction.events);
                    }
                    Err(e) => warn!("Ignoring game server message: {e}"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                        .unwrap_or((None, String::new()));
                    outbox.push(controller.on_close(code, reason));
                    finished = true;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    outbox.push(controller.on_close(None, e.to_string()));
                    finished = true;
                }
                None => {
                    outbox.push(controller.on_close(None, "connection ended".to_string()));
                    finished = true;
                }
            },
            command = commands.recv() => match command {
                None | Some(Command::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    outbox.push(controller.on_close(Some(1000), "closed by client".to_string()));
                    finished = true;
                }
                Some(command) => {
                    if let Err(e) = apply(&mut controller, &mut sink, command, &mut outbox).await {
                        debug!("Command rejected: {e}");
                        outbox.push(SessionEvent::Rejected { reason: e.to_string() });
                    }
                }
            },
        }

        let _ = snapshot.send(Snapshot::of(&controller));
        for event in outbox.drain(..) {
            let _ = events.send(event);
        }
        if finished {
            break;
        }
    }
}

async fn apply<K>(
    controller: &mut GameController,
    sink: &mut K,
    command: Command,
    outbox: &mut Vec<SessionEvent>,
) -> Result<(), ClientError>
where
    K: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    match command {
        Command::PlaySan(notation) => {
            let (message, change) = controller.play_san(&notation)?;
            send_move(controller, sink, &message).await?;
            outbox.push(SessionEvent::PageChanged(change));
        }
        Command::Click(square) => {
            if let Some((message, change)) = controller.click(square)? {
                send_move(controller, sink, &message).await?;
                outbox.push(SessionEvent::PageChanged(change));
            }
        }
        Command::Navigate(step) => {
            if let Some(change) = controller.navigate(|nav| step.apply(nav)) {
                outbox.push(SessionEvent::PageChanged(change));
            }
        }
        Command::Flip => {
            controller.navigator_mut().flip_perspective();
        }
        Command::Resign => {
            let message = controller.resign()?;
            send_msg(sink, &message).await?;
        }
        Command::DismissEnd => controller.dismiss_end(),
        Command::Close => {}
    }
    Ok(())
}

/// Send a local move, taking it back if it never left.
async fn send_move<K>(
    controller: &mut GameController,
    sink: &mut K,
    message: &OutboundMessage,
) -> Result<(), ClientError>
where
    K: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    if let Err(e) = send_msg(sink, message).await {
        controller.take_back();
        return Err(e);
    }
    Ok(())
}

async fn send_msg<K>(sink: &mut K, message: &OutboundMessage) -> Result<(), ClientError>
where
    K: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let json = message.encode()?;
    sink.send(Message::Text(json.into())).await?;
    Ok(())
}
