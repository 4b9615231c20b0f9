//! Xadrez REST API: finished games, the saved-game library and user stats.

use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::HttpContext;
use crate::config::Config;
use crate::error::ClientError;

/// Most games one `POST /api/savedgame` accepts.
pub const MAX_SAVED_BATCH: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: String,
    #[serde(default)]
    pub white_id: String,
    #[serde(default)]
    pub black_id: String,
    #[serde(default)]
    pub pgn: String,
    #[serde(default)]
    pub status: String,
    /// `"white"`, `"black"` or `"draw"`.
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub result_reason: String,
    #[serde(default)]
    pub last_fen: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub white_username: String,
    #[serde(default)]
    pub black_username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedGame {
    #[serde(alias = "ID")]
    pub game_id: String,
    #[serde(alias = "UserID", default)]
    pub user_id: String,
    #[serde(alias = "Name", default)]
    pub name: String,
    #[serde(alias = "PGN", default)]
    pub pgn: String,
    #[serde(alias = "LastFEN", default)]
    pub last_fen: String,
    #[serde(alias = "CreatedAt")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSavedGame {
    #[serde(rename = "PGN")]
    pub pgn: String,
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub draws: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub games_played: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    #[serde(alias = "Username")]
    pub username: String,
    #[serde(alias = "CreatedAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(alias = "Stats", default)]
    pub stats: Stats,
}

pub struct ApiClient {
    http: HttpContext,
    config: Config,
    csrf_token: Option<String>,
}

impl ApiClient {
    pub fn new(http: HttpContext, config: Config, csrf_token: Option<String>) -> Self {
        Self {
            http,
            config,
            csrf_token,
        }
    }

    fn with_csrf(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.csrf_token {
            Some(token) => request.header("X-CSRF-Token", token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let resp = self.with_csrf(request).send().await?;
        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// Games played by `user_id`, newest first as the server returns them.
    pub async fn games_of(&self, user_id: &str) -> Result<Vec<Game>, ClientError> {
        let request = self
            .http
            .client()
            .get(self.config.api_url("game"))
            .query(&[("user", user_id)]);
        let games: Option<Vec<Game>> = self.send(request).await?;
        Ok(games.unwrap_or_default())
    }

    pub async fn game(&self, game_id: &str) -> Result<Game, ClientError> {
        let url = self.config.api_url(&format!("game/{game_id}"));
        self.send(self.http.client().get(url)).await
    }

    pub async fn saved_games(&self) -> Result<Vec<SavedGame>, ClientError> {
        let request = self.http.client().get(self.config.api_url("savedgame"));
        let games: Option<Vec<SavedGame>> = self.send(request).await?;
        Ok(games.unwrap_or_default())
    }

    pub async fn saved_game(&self, game_id: &str) -> Result<SavedGame, ClientError> {
        let url = self.config.api_url(&format!("savedgame/{game_id}"));
        self.send(self.http.client().get(url)).await
    }

    /// Save one or more games (at most [`MAX_SAVED_BATCH`]). Answers with
    /// the refreshed library.
    pub async fn create_saved_games(&self, games: &[NewSavedGame]) -> Result<Vec<SavedGame>, ClientError> {
        if games.is_empty() || games.len() > MAX_SAVED_BATCH {
            return Err(ClientError::Protocol(format!(
                "Between 1 and {MAX_SAVED_BATCH} games can be saved at once, got {}",
                games.len()
            )));
        }
        debug!(count = games.len(), "Saving games");
        let request = self.http.client().post(self.config.api_url("savedgame"));
        let request = match games {
            [single] => request.json(single),
            many => request.json(many),
        };
        let refreshed: Option<Vec<SavedGame>> = self.send(request).await?;
        Ok(refreshed.unwrap_or_default())
    }

    pub async fn update_saved_game(
        &self,
        game_id: &str,
        game: &NewSavedGame,
    ) -> Result<Vec<SavedGame>, ClientError> {
        let url = self.config.api_url(&format!("savedgame/{game_id}"));
        let refreshed: Option<Vec<SavedGame>> = self.send(self.http.client().put(url).json(game)).await?;
        Ok(refreshed.unwrap_or_default())
    }

    pub async fn delete_saved_game(&self, game_id: &str) -> Result<Vec<SavedGame>, ClientError> {
        let url = self.config.api_url(&format!("savedgame/{game_id}"));
        let refreshed: Option<Vec<SavedGame>> = self.send(self.http.client().delete(url)).await?;
        Ok(refreshed.unwrap_or_default())
    }

    pub async fn user_stats(&self, user_id: &str) -> Result<UserStats, ClientError> {
        let url = self.config.api_url(&format!("userstats/{user_id}"));
        self.send(self.http.client().get(url)).await
    }
}
