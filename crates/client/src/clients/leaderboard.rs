use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::HttpContext;
use crate::error::ClientError;

/// One row of the FIDE top-active list, normalized for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Player {
    pub rank: u32,
    pub name: String,
    pub fide_id: String,
    pub country: String,
    pub rating: String,
}

#[derive(Debug, Deserialize)]
struct RawPlayer {
    #[serde(default)]
    rank: u32,
    #[serde(default)]
    name: String,
    fide_id: Option<Value>,
    country: Option<String>,
    rating: Option<Value>,
}

impl From<RawPlayer> for Player {
    fn from(raw: RawPlayer) -> Self {
        Player {
            rank: raw.rank,
            name: raw.name,
            fide_id: raw.fide_id.as_ref().map(scalar).unwrap_or_else(|| "-".to_string()),
            country: raw.country.unwrap_or_else(|| "UN".to_string()),
            rating: raw.rating.as_ref().map(scalar).unwrap_or_default(),
        }
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

pub struct LeaderboardClient {
    http: HttpContext,
    url: String,
}

impl LeaderboardClient {
    pub fn new(http: HttpContext, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Top 100 active players.
    pub async fn top_players(&self) -> Result<Vec<Player>, ClientError> {
        let resp = self
            .http
            .client()
            .get(&self.url)
            .query(&[("limit", "100"), ("history", "false")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }
        let players = parse_players(&resp.text().await?)?;
        debug!(count = players.len(), "Fetched leaderboard");
        Ok(players)
    }
}

pub fn parse_players(body: &str) -> Result<Vec<Player>, ClientError> {
    let raw: Vec<RawPlayer> = serde_json::from_str(body)?;
    Ok(raw.into_iter().map(Player::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_get_placeholders() {
        let body = r#"[
            {"rank":1,"name":"Carlsen, Magnus","fide_id":1503014,"country":"NOR","rating":2831},
            {"rank":2,"name":"Nobody","fide_id":null,"country":null,"rating":2700}
        ]"#;
        let players = parse_players(body).unwrap();
        assert_eq!(players[0].fide_id, "1503014");
        assert_eq!(players[0].rating, "2831");
        assert_eq!(players[1].fide_id, "-");
        assert_eq!(players[1].country, "UN");
    }
}
