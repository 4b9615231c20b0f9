//! Live game controller.
//!
//! [`GameController`] is the socket-free core of a game page: it turns
//! inbound server messages into navigator updates, outbound replies and
//! [`SessionEvent`]s. [`session::GameSession`] drives it over a real socket.

pub mod session;

use chess_core::board::BoardState;
use chess_core::navigator::{DisplayMode, Navigator, PageChange, SoundCue};
use chess_core::selection::{destination, AllowedMoves, Selection};
use shakmaty::{san::SanPlus, Color, Move, Position, Square};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::protocol::{GameStatus, InboundMessage, InitData, MoveData, OutboundMessage, Outcome, WelcomeData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seat {
    Spectating,
    Playing(Color),
}

impl Seat {
    pub fn color(self) -> Option<Color> {
        match self {
            Seat::Spectating => None,
            Seat::Playing(color) => Some(color),
        }
    }

    /// Seat of `client_id` in a room.
    pub fn of(client_id: &str, welcome: &WelcomeData) -> Self {
        if client_id.is_empty() {
            Seat::Spectating
        } else if welcome.player1_id == client_id {
            Seat::Playing(Color::White)
        } else if welcome.player2_id == client_id {
            Seat::Playing(Color::Black)
        } else {
            Seat::Spectating
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Welcomed(Seat),
    Ended { seat: Seat, outcome: Option<Outcome> },
}

/// What the end-of-game dialog shows to this client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndResult {
    Draw,
    Won,
    Lost,
    /// A spectator sees which color won.
    Watched(Color),
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Players {
    pub white_id: String,
    pub white_username: String,
    pub black_id: String,
    pub black_username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Welcomed { seat: Seat, players: Players },
    /// The displayed page changed; carries the sound cue, if any.
    PageChanged(PageChange),
    GameStarted,
    GameEnded { result: EndResult },
    /// The server closed the room.
    Quit { reason: String },
    /// A local command could not be carried out.
    Rejected { reason: String },
    Disconnected { code: Option<u16>, reason: String },
}

impl SessionEvent {
    /// Sound to play for this event: the move cue of a page change, or the
    /// end-of-game chime.
    pub fn cue(&self) -> Option<SoundCue> {
        match self {
            SessionEvent::PageChanged(change) => change.cue,
            SessionEvent::GameEnded { .. } => Some(SoundCue::GameEnd),
            _ => None,
        }
    }
}

/// Replies to send and events to surface after handling one message.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reaction {
    pub replies: Vec<OutboundMessage>,
    pub events: Vec<SessionEvent>,
}

#[derive(Debug)]
pub struct GameController {
    room_id: String,
    client_id: String,
    state: SessionState,
    status: GameStatus,
    players: Players,
    navigator: Navigator,
    selection: Selection,
    disconnected: bool,
}

impl GameController {
    pub fn new(room_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            client_id: client_id.into(),
            state: SessionState::Connecting,
            status: GameStatus::Waiting,
            players: Players::default(),
            navigator: Navigator::new(DisplayMode::Spectating, None),
            selection: Selection::default(),
            disconnected: false,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn players(&self) -> &Players {
        &self.players
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut Navigator {
        &mut self.navigator
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected
    }

    pub fn seat(&self) -> Seat {
        match &self.state {
            SessionState::Connecting => Seat::Spectating,
            SessionState::Welcomed(seat) => *seat,
            SessionState::Ended { seat, .. } => *seat,
        }
    }

    /// First message on a freshly opened socket.
    pub fn on_open(&self) -> OutboundMessage {
        OutboundMessage::Init(InitData {
            room_id: self.room_id.clone(),
        })
    }

    /// Moves are accepted only from a seated player in an ongoing game.
    pub fn allowed_moves(&self) -> AllowedMoves {
        match (&self.state, self.status) {
            (SessionState::Welcomed(Seat::Playing(_)), GameStatus::Ongoing) => {
                self.navigator.allowed_moves()
            }
            _ => AllowedMoves::None,
        }
    }

    pub fn board_state(&self) -> BoardState {
        let mut state = self.navigator.board_state();
        state.allowed = self.allowed_moves();
        state
    }

    pub fn handle(&mut self, message: InboundMessage) -> Reaction {
        let mut reaction = Reaction::default();

        match message {
            InboundMessage::Welcome(welcome) => self.on_welcome(welcome, &mut reaction),
            InboundMessage::PlayerMoved(data) => {
                match self
                    .navigator
                    .push_remote(&data.move_s1, &data.move_s2, &data.move_notation)
                {
                    Ok(change) => reaction.events.push(SessionEvent::PageChanged(change)),
                    Err(e) => warn!(
                        room_id = %self.room_id,
                        from = %data.move_s1,
                        notation = %data.move_notation,
                        "Dropping remote move: {e}"
                    ),
                }
            }
            InboundMessage::GameStarted => {
                info!(room_id = %self.room_id, "Game started");
                self.status = GameStatus::Ongoing;
                reaction.events.push(SessionEvent::GameStarted);
            }
            InboundMessage::GameEnded(data) => {
                let outcome = Outcome::from_winner_id(&data.winner_id);
                self.end(outcome, &mut reaction);
            }
            InboundMessage::Ping => reaction.replies.push(OutboundMessage::Ping),
            InboundMessage::Quit(reason) => {
                info!(room_id = %self.room_id, reason = %reason, "Room closed by server");
                self.status = GameStatus::Ended;
                reaction.events.push(SessionEvent::Quit { reason });
            }
        }

        self.reconcile_selection();
        reaction
    }

    fn on_welcome(&mut self, welcome: WelcomeData, reaction: &mut Reaction) {
        let seat = Seat::of(&self.client_id, &welcome);
        let mode = match seat {
            Seat::Playing(_) => DisplayMode::Playing,
            Seat::Spectating => DisplayMode::Spectating,
        };
        self.navigator.set_seat(mode, seat.color());

        match self.navigator.load_pgn(&welcome.game_pgn) {
            Ok(change) => reaction.events.push(SessionEvent::PageChanged(PageChange {
                cue: None,
                ..change
            })),
            Err(e) => warn!(room_id = %welcome.room_id, "Could not replay game PGN: {e}"),
        }

        if self.navigator.last_page().fen != welcome.game_fen && !welcome.game_fen.is_empty() {
            debug!(expected = %welcome.game_fen, "Replayed position differs from server FEN");
        }

        self.players = Players {
            white_id: welcome.player1_id.clone(),
            white_username: welcome.player1_username.clone(),
            black_id: welcome.player2_id.clone(),
            black_username: welcome.player2_username.clone(),
        };
        self.status = welcome.game_status;
        self.state = SessionState::Welcomed(seat);

        info!(room_id = %welcome.room_id, ?seat, status = ?self.status, "Welcomed to room");
        reaction.events.push(SessionEvent::Welcomed {
            seat,
            players: self.players.clone(),
        });

        if welcome.game_status == GameStatus::Ended {
            self.end(Outcome::from_winner_id(&welcome.winner_id), reaction);
        }
    }

    fn end(&mut self, outcome: Option<Outcome>, reaction: &mut Reaction) {
        let seat = self.seat();
        self.status = GameStatus::Ended;
        let result = self.end_result(seat, outcome.as_ref());
        info!(room_id = %self.room_id, ?result, "Game ended");
        self.state = SessionState::Ended { seat, outcome };
        reaction.events.push(SessionEvent::GameEnded { result });
    }

    fn end_result(&self, seat: Seat, outcome: Option<&Outcome>) -> EndResult {
        match (outcome, seat) {
            (None, _) => EndResult::Unknown,
            (Some(Outcome::Draw), _) => EndResult::Draw,
            (Some(Outcome::Winner(id)), Seat::Playing(_)) if *id == self.client_id => EndResult::Won,
            (Some(Outcome::Winner(_)), Seat::Playing(_)) => EndResult::Lost,
            (Some(Outcome::Winner(id)), Seat::Spectating) if *id == self.players.white_id => {
                EndResult::Watched(Color::White)
            }
            (Some(Outcome::Winner(id)), Seat::Spectating) if *id == self.players.black_id => {
                EndResult::Watched(Color::Black)
            }
            (Some(Outcome::Winner(_)), Seat::Spectating) => EndResult::Unknown,
        }
    }

    /// Close the end-of-game dialog and keep reviewing the game.
    pub fn dismiss_end(&mut self) {
        if let SessionState::Ended { .. } = self.state {
            self.state = SessionState::Welcomed(Seat::Spectating);
            self.navigator.set_seat(DisplayMode::Spectating, None);
            self.selection.clear();
        }
    }

    /// Play a local move and produce the message announcing it.
    pub fn play(&mut self, mv: Move) -> Result<(OutboundMessage, PageChange), ClientError> {
        let AllowedMoves::Only(color) = self.allowed_moves() else {
            return Err(ClientError::Protocol("Moves are not allowed right now".into()));
        };
        if self.navigator.head().turn() != color {
            return Err(ClientError::Protocol("Not your turn".into()));
        }

        let from = mv.from().map(|sq| sq.to_string()).unwrap_or_default();
        let to = destination(&mv).to_string();
        let change = self.navigator.push_move(mv)?;
        let san = self
            .navigator
            .current_page()
            .record
            .as_ref()
            .map(|r| r.san.clone())
            .unwrap_or_default();
        self.selection.clear();

        debug!(room_id = %self.room_id, %from, %to, %san, "Local move");
        Ok((
            OutboundMessage::PlayerMoved(MoveData {
                move_s1: from,
                move_s2: to,
                move_notation: san,
            }),
            change,
        ))
    }

    /// Undo a local move the server never received.
    pub fn take_back(&mut self) {
        if let Some(record) = self.navigator.pop_move() {
            debug!(room_id = %self.room_id, san = %record.san, "Took back local move");
        }
        self.reconcile_selection();
    }

    /// Play a move typed in SAN.
    pub fn play_san(&mut self, notation: &str) -> Result<(OutboundMessage, PageChange), ClientError> {
        let san: SanPlus = notation
            .trim()
            .parse()
            .map_err(|_| chess_core::ChessError::InvalidSan(notation.to_string()))?;
        let mv = san
            .san
            .to_move(self.navigator.head())
            .map_err(|_| chess_core::ChessError::IllegalMove(notation.to_string()))?;
        self.play(mv)
    }

    /// Board click. Returns the outbound message when the click completed a
    /// move.
    pub fn click(&mut self, square: Square) -> Result<Option<(OutboundMessage, PageChange)>, ClientError> {
        let allowed = self.allowed_moves();
        let position = self.navigator.current_page().position.clone();
        match self.selection.click_square(&position, allowed, square) {
            Some(mv) => self.play(mv).map(Some),
            None => Ok(None),
        }
    }

    pub fn click_background(&mut self) {
        self.selection.click_background();
    }

    /// Move the displayed page, keeping the selection consistent.
    pub fn navigate(&mut self, step: impl FnOnce(&mut Navigator) -> Option<PageChange>) -> Option<PageChange> {
        let change = step(&mut self.navigator);
        self.reconcile_selection();
        change
    }

    fn reconcile_selection(&mut self) {
        let allowed = self.allowed_moves();
        let position = &self.navigator.current_page().position;
        self.selection.reconcile(position, allowed);
    }

    pub fn resign(&mut self) -> Result<OutboundMessage, ClientError> {
        match (&self.state, self.status) {
            (SessionState::Welcomed(Seat::Playing(_)), GameStatus::Ongoing) => Ok(OutboundMessage::Resign),
            _ => Err(ClientError::Protocol("Only a player in an ongoing game can resign".into())),
        }
    }

    pub fn on_close(&mut self, code: Option<u16>, reason: String) -> SessionEvent {
        self.disconnected = true;
        self.selection.clear();
        warn!(room_id = %self.room_id, ?code, reason = %reason, "Game socket closed");
        SessionEvent::Disconnected { code, reason }
    }
}
