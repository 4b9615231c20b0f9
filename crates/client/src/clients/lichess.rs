use chess_core::pgn::parse_pgn;
use reqwest::Url;
use serde_json::Value;

use super::api::NewSavedGame;
use super::HttpContext;
use crate::error::ClientError;

pub const MIN_IMPORT: usize = 1;
pub const MAX_IMPORT: usize = 20;
pub const DEFAULT_IMPORT: usize = 5;

pub struct LichessClient {
    http: HttpContext,
    base_url: String,
}

impl LichessClient {
    pub fn new(http: HttpContext, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Fetch the latest games of a Lichess user, ready to be saved.
    /// `max_games` is clamped to 1..=20.
    pub async fn fetch_user_games(
        &self,
        username: &str,
        max_games: usize,
    ) -> Result<Vec<NewSavedGame>, ClientError> {
        let url = self.games_url(username)?;
        let max = max_games.clamp(MIN_IMPORT, MAX_IMPORT);

        let params = [
            ("max", max.to_string()),
            ("pgnInJson", "true".to_string()),
            ("lastFen", "true".to_string()),
        ];

        let resp = self
            .http
            .client()
            .get(url)
            .query(&params)
            .header("Accept", "application/x-ndjson")
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::Status {
                status: 404,
                message: format!("Lichess user {username} not found"),
            });
        }

        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }

        let text = resp.text().await?;
        let games = parse_ndjson(&text);
        tracing::info!(username, count = games.len(), "Fetched Lichess games");
        Ok(games)
    }

    /// `{base}/api/games/user/{username}` with the name as one path segment.
    fn games_url(&self, username: &str) -> Result<Url, ClientError> {
        let invalid = || ClientError::InvalidUrl(self.base_url.clone());
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["api", "games", "user", username]);
        Ok(url)
    }
}

/// One saved game per ndjson line that carries a PGN. Bad lines are skipped.
pub fn parse_ndjson(text: &str) -> Vec<NewSavedGame> {
    let mut results = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(line) {
            Ok(game_data) => {
                let Some(pgn) = game_data.get("pgn").and_then(|v| v.as_str()) else {
                    continue;
                };
                if pgn.is_empty() {
                    continue;
                }
                results.push(NewSavedGame {
                    pgn: pgn.to_string(),
                    name: game_name(&game_data, pgn),
                });
            }
            Err(e) => {
                tracing::warn!("Failed to parse Lichess game JSON: {e}");
            }
        }
    }

    results
}

/// "white vs black" from the player objects, or from the PGN headers when
/// the JSON has no names.
fn game_name(game: &Value, pgn: &str) -> String {
    let side = |color: &str| {
        let player = &game["players"][color];
        player["user"]["name"]
            .as_str()
            .or_else(|| player["aiLevel"].as_u64().map(|_| "Stockfish"))
            .map(str::to_string)
    };
    match (side("white"), side("black")) {
        (Some(white), Some(black)) => format!("{white} vs {black}"),
        _ => parse_pgn(pgn)
            .map(|record| record.metadata.title())
            .unwrap_or_else(|| "Lichess game".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_is_one_path_segment() {
        let client = LichessClient::new(
            HttpContext::new(&crate::config::Config::default()).unwrap(),
            "https://lichess.org/",
        );
        let url = client.games_url("a/b c").unwrap();
        assert_eq!(url.as_str(), "https://lichess.org/api/games/user/a%2Fb%20c");
    }

    #[test]
    fn test_ndjson_lines_become_named_games() {
        let text = concat!(
            r#"{"id":"a1","players":{"white":{"user":{"name":"alice"}},"black":{"user":{"name":"bob"}}},"pgn":"1. e4 e5 *"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"id":"a2","players":{"white":{"aiLevel":3},"black":{"user":{"name":"alice"}}},"pgn":"1. d4 *"}"#,
            "\n",
            "\n",
            r#"{"id":"a3","players":{},"pgn":""}"#,
            "\n",
            r#"{"id":"a4","players":{},"pgn":"[White \"carol\"]\n[Black \"dave\"]\n\n1. c4 *"}"#,
        );
        let games = parse_ndjson(text);
        assert_eq!(games.len(), 3);
        assert_eq!(games[0].name, "alice vs bob");
        assert_eq!(games[0].pgn, "1. e4 e5 *");
        assert_eq!(games[1].name, "Stockfish vs alice");
        assert_eq!(games[2].name, "carol vs dave");
    }
}
