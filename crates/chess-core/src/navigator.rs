//! Game-page navigator.
//!
//! A game is shown as a list of pages: page 0 is the start position and
//! page *i* is the position after the *i*-th half-move. Pages are only ever
//! appended (or replaced wholesale when a PGN is loaded); navigating just
//! moves the cursor.

use serde::Serialize;
use shakmaty::{
    fen::Fen,
    san::{San, SanPlus},
    Chess, Color, EnPassantMode, Move, Position, Role, Square,
};
use tracing::debug;

use crate::board::BoardState;
use crate::error::ChessError;
use crate::pgn;
use crate::selection::{destination, AllowedMoves};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    Playing,
    Spectating,
}

/// Sound notifications emitted while stepping through a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SoundCue {
    Move,
    Capture,
    GameEnd,
}

impl SoundCue {
    pub fn asset(self) -> &'static str {
        match self {
            SoundCue::Move => "/sounds/Move.mp3",
            SoundCue::Capture => "/sounds/Capture.mp3",
            SoundCue::GameEnd => "/sounds/GameEnd.mp3",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub mv: Move,
    pub from: Square,
    pub to: Square,
    /// SAN with check/mate suffix, e.g. `Qh4#`.
    pub san: String,
    pub color: Color,
    pub role: Role,
    pub capture: bool,
    pub promotion: Option<Role>,
    pub check: bool,
    pub mate: bool,
}

impl MoveRecord {
    /// Describe `mv`, played from `before` and resulting in `after`.
    fn new(before: &Chess, mv: &Move, after: &Chess) -> Self {
        let mate = after.is_checkmate();
        let check = after.is_check();
        let mut san = San::from_move(before, mv.clone()).to_string();
        if mate {
            san.push('#');
        } else if check {
            san.push('+');
        }

        Self {
            from: mv.from().unwrap_or_else(|| mv.to()),
            to: destination(mv),
            san,
            color: before.turn(),
            role: mv.role(),
            capture: mv.is_capture(),
            promotion: mv.promotion(),
            check,
            mate,
            mv: mv.clone(),
        }
    }

    pub fn cue(&self) -> SoundCue {
        if self.capture {
            SoundCue::Capture
        } else {
            SoundCue::Move
        }
    }
}

#[derive(Debug, Clone)]
pub struct GamePage {
    /// Move that produced this page; None for the start position.
    pub record: Option<MoveRecord>,
    pub position: Chess,
    pub fen: String,
}

impl GamePage {
    fn initial() -> Self {
        let position = Chess::default();
        Self {
            fen: fen_of(&position),
            position,
            record: None,
        }
    }

    fn after(previous: &Chess, mv: Move) -> Self {
        let mut position = previous.clone();
        position.play_unchecked(mv.clone());
        let record = MoveRecord::new(previous, &mv, &position);
        Self {
            fen: fen_of(&position),
            position,
            record: Some(record),
        }
    }

    pub fn last_move(&self) -> Option<(Square, Square)> {
        self.record.as_ref().map(|r| (r.from, r.to))
    }
}

/// Result of moving the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageChange {
    pub index: usize,
    pub cue: Option<SoundCue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveCell {
    pub page: usize,
    pub san: String,
}

/// One numbered line of the move list: white's move and black's reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRow {
    pub number: usize,
    pub white: MoveCell,
    pub black: Option<MoveCell>,
}

#[derive(Debug, Clone)]
pub struct Navigator {
    pages: Vec<GamePage>,
    current: usize,
    mode: DisplayMode,
    player_color: Option<Color>,
    perspective: Color,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(DisplayMode::Spectating, None)
    }
}

impl Navigator {
    pub fn new(mode: DisplayMode, player_color: Option<Color>) -> Self {
        Self {
            pages: vec![GamePage::initial()],
            current: 0,
            mode,
            player_color,
            perspective: player_color.unwrap_or(Color::White),
        }
    }

    /// Change who is sitting at the board. The perspective follows the
    /// player's color.
    pub fn set_seat(&mut self, mode: DisplayMode, player_color: Option<Color>) {
        self.mode = mode;
        self.player_color = player_color;
        if let Some(color) = player_color {
            self.perspective = color;
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn player_color(&self) -> Option<Color> {
        self.player_color
    }

    pub fn perspective(&self) -> Color {
        self.perspective
    }

    pub fn set_perspective(&mut self, perspective: Color) {
        self.perspective = perspective;
    }

    pub fn flip_perspective(&mut self) -> Color {
        self.perspective = !self.perspective;
        self.perspective
    }

    pub fn pages(&self) -> &[GamePage] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_page(&self) -> &GamePage {
        &self.pages[self.current]
    }

    pub fn last_page(&self) -> &GamePage {
        // pages always holds at least the start position
        &self.pages[self.pages.len() - 1]
    }

    pub fn is_at_last(&self) -> bool {
        self.current + 1 == self.pages.len()
    }

    /// Position new moves are played from.
    pub fn head(&self) -> &Chess {
        &self.last_page().position
    }

    /// Replace all pages with the mainline of `pgn` and show the last one.
    /// On error nothing changes.
    pub fn load_pgn(&mut self, pgn_text: &str) -> Result<PageChange, ChessError> {
        let mut pages = vec![GamePage::initial()];

        for token in pgn::extract_moves(pgn_text) {
            let san: SanPlus = token
                .parse()
                .map_err(|_| ChessError::InvalidSan(token.clone()))?;
            let previous = &pages[pages.len() - 1].position;
            let mv = san
                .san
                .to_move(previous)
                .map_err(|_| ChessError::IllegalMove(token.clone()))?;
            let page = GamePage::after(previous, mv);
            pages.push(page);
        }

        debug!(moves = pages.len() - 1, "Loaded PGN");
        self.pages = pages;
        self.current = 0;
        let last = self.pages.len() - 1;
        Ok(self.jump(last))
    }

    /// Append a move played on the head position and show it.
    pub fn push_move(&mut self, mv: Move) -> Result<PageChange, ChessError> {
        let head = self.head();
        if !head.legal_moves().contains(&mv) {
            return Err(ChessError::IllegalMove(format!("{mv:?}")));
        }
        let page = GamePage::after(head, mv);
        self.pages.push(page);
        let last = self.pages.len() - 1;
        Ok(self.jump(last))
    }

    /// Drop the last move, keeping the cursor in range. The start position
    /// is never removed.
    pub fn pop_move(&mut self) -> Option<MoveRecord> {
        if self.pages.len() == 1 {
            return None;
        }
        let page = self.pages.pop()?;
        self.current = self.current.min(self.pages.len() - 1);
        page.record
    }

    /// Append a move described by its origin, destination and SAN, as sent
    /// by the game server. `to` may be empty.
    pub fn push_remote(&mut self, from: &str, to: &str, notation: &str) -> Result<PageChange, ChessError> {
        let mv = self.resolve(from, to, notation)?;
        self.push_move(mv)
    }

    /// Find the legal move from `from` on the head position whose SAN is
    /// `notation`.
    pub fn resolve(&self, from: &str, to: &str, notation: &str) -> Result<Move, ChessError> {
        let origin: Square = from
            .parse()
            .map_err(|_| ChessError::InvalidSquare(from.to_string()))?;
        let wanted = normalize_san(notation);
        let head = self.head();

        let mv = head
            .legal_moves()
            .into_iter()
            .filter(|m| m.from() == Some(origin))
            .find(|m| San::from_move(head, m.clone()).to_string() == wanted)
            .ok_or_else(|| ChessError::UnmatchedMove {
                from: from.to_string(),
                notation: notation.to_string(),
            })?;

        if !to.is_empty() {
            let expected: Square = to
                .parse()
                .map_err(|_| ChessError::InvalidSquare(to.to_string()))?;
            if destination(&mv) != expected {
                return Err(ChessError::DestinationMismatch {
                    notation: notation.to_string(),
                    expected: to.to_string(),
                });
            }
        }

        Ok(mv)
    }

    /// Move the cursor to page `index`. Out of range is a no-op.
    pub fn go_to(&mut self, index: usize) -> Option<PageChange> {
        if index >= self.pages.len() {
            return None;
        }
        Some(self.jump(index))
    }

    pub fn next(&mut self) -> Option<PageChange> {
        self.go_to(self.current + 1)
    }

    pub fn prev(&mut self) -> Option<PageChange> {
        self.current.checked_sub(1).and_then(|i| self.go_to(i))
    }

    pub fn first(&mut self) -> Option<PageChange> {
        self.go_to(0)
    }

    pub fn last(&mut self) -> Option<PageChange> {
        self.go_to(self.pages.len() - 1)
    }

    fn jump(&mut self, index: usize) -> PageChange {
        let cue = if index > self.current {
            self.pages[index].record.as_ref().map(MoveRecord::cue)
        } else {
            None
        };
        self.current = index;
        PageChange { index, cue }
    }

    /// Only the last page of a game being played accepts moves, and only
    /// from the player's own side.
    pub fn allowed_moves(&self) -> AllowedMoves {
        match (self.mode, self.player_color) {
            (DisplayMode::Playing, Some(color)) if self.is_at_last() => AllowedMoves::Only(color),
            _ => AllowedMoves::None,
        }
    }

    pub fn board_state(&self) -> BoardState {
        let page = self.current_page();
        BoardState {
            position: page.position.clone(),
            fen: page.fen.clone(),
            perspective: self.perspective,
            allowed: self.allowed_moves(),
            last_move: page.last_move(),
        }
    }

    /// Move list grouped in numbered white/black pairs.
    pub fn move_rows(&self) -> Vec<MoveRow> {
        let mut rows: Vec<MoveRow> = Vec::new();
        for (page, p) in self.pages.iter().enumerate().skip(1) {
            let Some(record) = &p.record else { continue };
            let cell = MoveCell {
                page,
                san: record.san.clone(),
            };
            if page % 2 == 1 {
                rows.push(MoveRow {
                    number: rows.len() + 1,
                    white: cell,
                    black: None,
                });
            } else if let Some(row) = rows.last_mut() {
                row.black = Some(cell);
            }
        }
        rows
    }

    /// Mainline movetext, e.g. `1. e4 e5 2. Nf3`.
    pub fn movetext(&self) -> String {
        self.move_rows()
            .iter()
            .map(|row| match &row.black {
                Some(black) => format!("{}. {} {}", row.number, row.white.san, black.san),
                None => format!("{}. {}", row.number, row.white.san),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub fn fen_of(position: &Chess) -> String {
    Fen::from_position(position, EnPassantMode::Legal).to_string()
}

/// Strip check/mate suffixes and annotation glyphs, normalize `0-0`.
fn normalize_san(notation: &str) -> String {
    let trimmed = notation
        .trim()
        .trim_end_matches(|c| matches!(c, '+' | '#' | '!' | '?'));
    if trimmed.starts_with('0') {
        trimmed.replace('0', "O")
    } else {
        trimmed.to_string()
    }
}
