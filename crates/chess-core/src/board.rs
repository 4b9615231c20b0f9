//! Board layout: turns a position snapshot into placed pieces, square
//! overlays and coordinate labels for a given perspective and style.
//!
//! Grid cells are `(column, row)` with `(0, 0)` in the top-left corner as
//! seen by the viewer. From white's side `column = file` and
//! `row = 7 - rank`; from black's side both axes are mirrored.

use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Color, File, Piece, Position, Rank, Role, Square};

use crate::selection::{AllowedMoves, Selection};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardStyle {
    /// Side length of one square, in pixels.
    pub square_size: u32,
    pub piece_theme: String,
    pub background: String,
    pub label_squares: bool,
}

impl Default for BoardStyle {
    fn default() -> Self {
        Self {
            square_size: 50,
            piece_theme: "merida".to_string(),
            background: "maple".to_string(),
            label_squares: true,
        }
    }
}

impl BoardStyle {
    pub fn background_image(&self) -> String {
        format!("/board_bg/{}.jpg", self.background)
    }

    pub fn piece_image(&self, piece: Piece) -> String {
        format!(
            "/pieces/{}/{}{}.svg",
            self.piece_theme,
            piece.color.char(),
            piece.role.upper_char()
        )
    }
}

/// Everything the renderer needs to know about the displayed page.
#[derive(Debug, Clone)]
pub struct BoardState {
    pub position: Chess,
    pub fen: String,
    pub perspective: Color,
    pub allowed: AllowedMoves,
    pub last_move: Option<(Square, Square)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedPiece {
    pub square: Square,
    pub piece: Piece,
    pub column: u8,
    pub row: u8,
    pub x: u32,
    pub y: u32,
    pub image: String,
    pub grabbable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    LastMove,
    Check,
    Selected,
    QuietTarget,
    CaptureTarget,
    Promotion { role: Role, capture: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub square: Square,
    pub kind: OverlayKind,
    pub x: u32,
    pub y: u32,
    /// Piece drawn on top of the overlay (promotion choices).
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    /// Position in square units.
    pub x: f32,
    pub y: f32,
    pub text: char,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardLayout {
    /// Width and height of the whole board, in pixels.
    pub size: u32,
    pub background: String,
    pub pieces: Vec<PlacedPiece>,
    pub overlays: Vec<Overlay>,
    pub labels: Vec<Label>,
}

impl BoardLayout {
    pub fn piece_at_cell(&self, column: u8, row: u8) -> Option<&PlacedPiece> {
        self.pieces.iter().find(|p| p.column == column && p.row == row)
    }
}

/// Grid cell of a square for the given perspective.
pub fn cell(square: Square, perspective: Color) -> (u8, u8) {
    let column = square.file() as u8;
    let row = 7 - square.rank() as u8;
    match perspective {
        Color::White => (column, row),
        Color::Black => (7 - column, 7 - row),
    }
}

/// Inverse of [`cell`]. Returns None outside the 8x8 grid.
pub fn square_at(column: u8, row: u8, perspective: Color) -> Option<Square> {
    if column > 7 || row > 7 {
        return None;
    }
    let (file, rank) = match perspective {
        Color::White => (column, 7 - row),
        Color::Black => (7 - column, row),
    };
    Some(Square::from_coords(
        File::new(u32::from(file)),
        Rank::new(u32::from(rank)),
    ))
}

/// Pixel offset of a square's top-left corner.
pub fn offset(square: Square, perspective: Color, style: &BoardStyle) -> (u32, u32) {
    let (column, row) = cell(square, perspective);
    (
        style.square_size * u32::from(column),
        style.square_size * u32::from(row),
    )
}

fn overlay(square: Square, kind: OverlayKind, perspective: Color, style: &BoardStyle) -> Overlay {
    let (x, y) = offset(square, perspective, style);
    Overlay {
        square,
        kind,
        x,
        y,
        image: None,
    }
}

/// Lay out a board. Pure function of its inputs.
pub fn render(state: &BoardState, selection: &Selection, style: &BoardStyle) -> BoardLayout {
    let perspective = state.perspective;
    let board = state.position.board();

    let pieces = (0..64)
        .map(Square::new)
        .filter_map(|square| board.piece_at(square).map(|piece| (square, piece)))
        .map(|(square, piece)| {
            let (column, row) = cell(square, perspective);
            let (x, y) = offset(square, perspective, style);
            PlacedPiece {
                square,
                piece,
                column,
                row,
                x,
                y,
                image: style.piece_image(piece),
                grabbable: state.allowed.permits(piece.color),
            }
        })
        .collect();

    let mut overlays = Vec::new();

    if let Some((from, to)) = state.last_move {
        overlays.push(overlay(from, OverlayKind::LastMove, perspective, style));
        overlays.push(overlay(to, OverlayKind::LastMove, perspective, style));
    }

    if state.position.is_check() {
        if let Some(king) = board.king_of(state.position.turn()) {
            overlays.push(overlay(king, OverlayKind::Check, perspective, style));
        }
    }

    if let Some(highlight) = selection.highlight() {
        overlays.push(overlay(highlight.square, OverlayKind::Selected, perspective, style));

        for target in selection.targets(&state.position) {
            let kind = match target.promotion {
                Some(role) => OverlayKind::Promotion {
                    role,
                    capture: target.capture,
                },
                None if target.capture => OverlayKind::CaptureTarget,
                None => OverlayKind::QuietTarget,
            };
            let mut o = overlay(target.cell, kind, perspective, style);
            o.image = target.promotion.map(|role| {
                style.piece_image(Piece {
                    color: highlight.piece.color,
                    role,
                })
            });
            overlays.push(o);
        }
    }

    BoardLayout {
        size: style.square_size * 8,
        background: style.background_image(),
        pieces,
        overlays,
        labels: if style.label_squares { labels(perspective) } else { Vec::new() },
    }
}

/// File letters along the bottom edge, rank digits along the right edge.
pub fn labels(perspective: Color) -> Vec<Label> {
    let mut labels = Vec::with_capacity(16);
    for (i, text) in ('a'..='h').enumerate() {
        let x = i as f32;
        labels.push(Label {
            x: if perspective == Color::White { x } else { 7.0 - x },
            y: 7.7,
            text,
        });
    }
    for (i, text) in ('1'..='8').enumerate() {
        let y = i as f32;
        labels.push(Label {
            x: 7.85,
            y: if perspective == Color::Black { y } else { 7.0 - y },
            text,
        });
    }
    labels
}

/// Plain-text board for terminals. White pieces are upper case.
pub fn render_text(state: &BoardState, selection: &Selection) -> String {
    let targets: Vec<Square> = selection
        .targets(&state.position)
        .into_iter()
        .map(|t| t.cell)
        .collect();
    let selected = selection.highlight().map(|h| h.square);
    let board = state.position.board();

    let mut out = String::new();
    for row in 0..8u8 {
        let Some(first) = square_at(0, row, state.perspective) else { continue };
        out.push_str(&format!("{} ", first.rank().char()));
        for column in 0..8u8 {
            let Some(square) = square_at(column, row, state.perspective) else { continue };
            let symbol = match board.piece_at(square) {
                Some(piece) => piece.char(),
                None => '.',
            };
            let (open, close) = if selected == Some(square) {
                ('[', ']')
            } else if targets.contains(&square) {
                ('(', ')')
            } else if state.last_move.is_some_and(|(a, b)| a == square || b == square) {
                ('<', '>')
            } else {
                (' ', ' ')
            };
            out.push(open);
            out.push(symbol);
            out.push(close);
        }
        out.push('\n');
    }
    out.push_str("  ");
    for column in 0..8u8 {
        if let Some(square) = square_at(column, 7, state.perspective) {
            out.push(' ');
            out.push(square.file().char());
            out.push(' ');
        }
    }
    out.push('\n');
    out
}
