pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod game;
pub mod matchmaking;
pub mod mux;
pub mod profile;
pub mod protocol;
pub mod storage;

pub use error::ClientError;
