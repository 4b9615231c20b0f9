use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChessError {
    #[error("Invalid SAN '{0}'")]
    InvalidSan(String),

    #[error("Illegal move '{0}'")]
    IllegalMove(String),

    #[error("Invalid square '{0}'")]
    InvalidSquare(String),

    #[error("No legal move from {from} matches '{notation}'")]
    UnmatchedMove { from: String, notation: String },

    #[error("Move '{notation}' does not land on {expected}")]
    DestinationMismatch { notation: String, expected: String },
}
