pub use shakmaty;

pub mod board;
pub mod error;
pub mod game_data;
pub mod navigator;
pub mod pgn;
pub mod selection;

pub use error::ChessError;
