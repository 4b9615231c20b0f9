//! Piece selection on an interactive board.
//!
//! A board is either idle or has one selected piece. Destinations are never
//! stored: they are derived from whatever position is current when asked,
//! and [`Selection::reconcile`] drops a selection whose piece is gone.

use shakmaty::{Chess, Color, File, Move, Piece, Position, Role, Square};

/// Which side may pick up pieces on a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllowedMoves {
    #[default]
    None,
    Only(Color),
}

impl AllowedMoves {
    pub fn permits(self, color: Color) -> bool {
        match self {
            AllowedMoves::None => false,
            AllowedMoves::Only(c) => c == color,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Highlight {
    pub square: Square,
    pub piece: Piece,
}

/// One clickable destination of the selected piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTarget {
    pub mv: Move,
    /// Square where the target is drawn and hit-tested. Differs from the
    /// destination for promotion choices, which are stacked along the file.
    pub cell: Square,
    pub capture: bool,
    pub promotion: Option<Role>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    highlight: Option<Highlight>,
}

impl Selection {
    pub fn highlight(&self) -> Option<&Highlight> {
        self.highlight.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.highlight.is_none()
    }

    pub fn clear(&mut self) {
        self.highlight = None;
    }

    /// Click on an occupied square. Selecting the already selected piece, or
    /// a piece whose side may not move, leaves the board idle.
    pub fn click_piece(&mut self, position: &Chess, allowed: AllowedMoves, square: Square) {
        let Some(piece) = position.board().piece_at(square) else {
            self.highlight = None;
            return;
        };

        if !allowed.permits(piece.color) {
            self.highlight = None;
            return;
        }

        let candidate = Highlight { square, piece };
        self.highlight = if self.highlight == Some(candidate) {
            None
        } else {
            Some(candidate)
        };
    }

    pub fn click_background(&mut self) {
        self.highlight = None;
    }

    /// Click on a square. Returns the move to play when the square is one of
    /// the selected piece's targets; otherwise updates the selection.
    pub fn click_square(
        &mut self,
        position: &Chess,
        allowed: AllowedMoves,
        square: Square,
    ) -> Option<Move> {
        // targets are drawn above pieces, so they win the hit test
        if let Some(target) = self
            .targets(position)
            .into_iter()
            .find(|t| t.cell == square)
        {
            self.highlight = None;
            return Some(target.mv);
        }

        if position.board().piece_at(square).is_some() {
            self.click_piece(position, allowed, square);
        } else {
            self.highlight = None;
        }
        None
    }

    /// Destinations of the selected piece in `position`.
    pub fn targets(&self, position: &Chess) -> Vec<MoveTarget> {
        let Some(highlight) = self.highlight else {
            return Vec::new();
        };

        position
            .legal_moves()
            .into_iter()
            .filter(|mv| mv.from() == Some(highlight.square))
            .map(|mv| MoveTarget {
                cell: target_cell(&mv, highlight.piece.color),
                capture: mv.is_capture(),
                promotion: mv.promotion(),
                mv,
            })
            .collect()
    }

    /// Bring the selection in line with a new position: drop it when the
    /// square no longer holds the recorded piece or its side may not move.
    pub fn reconcile(&mut self, position: &Chess, allowed: AllowedMoves) {
        let Some(highlight) = self.highlight else {
            return;
        };

        let still_there = position.board().piece_at(highlight.square) == Some(highlight.piece);
        if !still_there || !allowed.permits(highlight.piece.color) {
            self.highlight = None;
        }
    }
}

/// Slot of each promotion choice, counted from the promotion square
/// towards the promoting side.
pub fn promotion_slot(role: Role) -> u32 {
    match role {
        Role::Queen => 0,
        Role::Bishop => 1,
        Role::Knight => 2,
        Role::Rook => 3,
        _ => 0,
    }
}

/// Square a move is drawn on and resolved from.
pub fn target_cell(mv: &Move, mover: Color) -> Square {
    let to = destination(mv);
    let Some(role) = mv.promotion() else {
        return to;
    };

    let slot = promotion_slot(role);
    let rank = to.rank() as u32;
    let rank = match mover {
        Color::White => rank.saturating_sub(slot),
        Color::Black => (rank + slot).min(7),
    };
    Square::from_coords(to.file(), shakmaty::Rank::new(rank))
}

/// Where the moving piece lands. For castling this is the king's square,
/// not the rook's.
pub fn destination(mv: &Move) -> Square {
    match mv {
        Move::Castle { king, rook } => {
            let file = if rook.file() > king.file() { File::G } else { File::C };
            Square::from_coords(file, king.rank())
        }
        _ => mv.to(),
    }
}
