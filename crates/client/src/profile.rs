//! Match history and statistics derived from the REST resources, as shown
//! on the dashboard and profile pages.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clients::api::{ApiClient, Game, Stats, UserStats};
use crate::error::ClientError;

const IN_PROGRESS: &str = "in_progress";
const DRAW: &str = "draw";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PastMatch {
    pub game_id: String,
    pub white: String,
    pub white_id: String,
    pub black: String,
    pub black_id: String,
    /// Username of the winner, or `"draw"`.
    pub winner: String,
    pub date: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub last_fen: String,
}

impl PastMatch {
    pub fn from_game(game: &Game) -> Self {
        let winner = match game.result.as_str() {
            DRAW => DRAW.to_string(),
            "white" => game.white_username.clone(),
            "black" => game.black_username.clone(),
            _ => String::new(),
        };
        let duration_secs = match (game.started_at, game.ended_at) {
            (Some(start), Some(end)) => {
                let ms = (end - start).num_milliseconds();
                (ms as f64 / 1000.0).ceil() as i64
            }
            _ => 0,
        };
        PastMatch {
            game_id: game.game_id.clone(),
            white: game.white_username.clone(),
            white_id: game.white_id.clone(),
            black: game.black_username.clone(),
            black_id: game.black_id.clone(),
            winner,
            date: game.started_at,
            duration_secs,
            last_fen: game.last_fen.clone(),
        }
    }

    pub fn is_draw(&self) -> bool {
        self.winner == DRAW
    }

    /// Player id of the winner, if the game had one.
    pub fn winner_id(&self) -> Option<&str> {
        if self.is_draw() || self.winner.is_empty() {
            None
        } else if self.winner == self.white {
            Some(&self.white_id)
        } else {
            Some(&self.black_id)
        }
    }
}

/// Finished games only, in server order.
pub fn past_matches(games: &[Game]) -> Vec<PastMatch> {
    games
        .iter()
        .filter(|g| g.status != IN_PROGRESS)
        .map(PastMatch::from_game)
        .collect()
}

/// `"1 hour, 2 minutes, 5 seconds"`, leaving out zero parts.
pub fn describe_duration(total_secs: i64) -> String {
    let total = total_secs.max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    let part = |n: i64, unit: &str| -> Option<String> {
        (n != 0).then(|| format!("{n} {unit}{}", if n == 1 { "" } else { "s" }))
    };

    [part(hours, "hour"), part(minutes, "minute"), part(seconds, "second")]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Percentages {
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
}

impl Percentages {
    pub fn of(stats: &Stats) -> Self {
        let pct = |n: u32| {
            if stats.games_played == 0 {
                0
            } else {
                (f64::from(n) * 100.0 / f64::from(stats.games_played)).round() as u32
            }
        };
        Percentages {
            wins: pct(stats.wins),
            draws: pct(stats.draws),
            losses: pct(stats.losses),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub username: String,
    pub member_since: String,
    pub stats: Stats,
    pub percentages: Percentages,
    pub matches: Vec<PastMatch>,
}

impl Profile {
    pub fn build(user: UserStats, games: &[Game]) -> Self {
        let member_since = user
            .created_at
            .map(|d| d.format("%B %d, %Y").to_string())
            .unwrap_or_default();
        Profile {
            percentages: Percentages::of(&user.stats),
            username: user.username,
            member_since,
            stats: user.stats,
            matches: past_matches(games),
        }
    }

    pub async fn load(api: &ApiClient, user_id: &str) -> Result<Self, ClientError> {
        let user = api.user_stats(user_id).await?;
        let games = api.games_of(user_id).await?;
        Ok(Profile::build(user, &games))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(id: &str, status: &str, result: &str) -> Game {
        Game {
            game_id: id.into(),
            white_id: "w1".into(),
            black_id: "b1".into(),
            pgn: String::new(),
            status: status.into(),
            result: result.into(),
            result_reason: String::new(),
            last_fen: String::new(),
            started_at: "2025-01-01T10:00:00Z".parse().ok(),
            ended_at: "2025-01-01T10:03:20.400Z".parse().ok(),
            white_username: "alice".into(),
            black_username: "bob".into(),
        }
    }

    #[test]
    fn test_past_matches_skip_running_games() {
        let games = vec![
            game("g1", "finished", "black"),
            game("g2", IN_PROGRESS, ""),
            game("g3", "finished", DRAW),
        ];
        let matches = past_matches(&games);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].winner, "bob");
        assert_eq!(matches[0].winner_id(), Some("b1"));
        assert_eq!(matches[0].duration_secs, 201);
        assert!(matches[1].is_draw());
        assert_eq!(matches[1].winner_id(), None);
    }

    #[test]
    fn test_describe_duration() {
        assert_eq!(describe_duration(201), "3 minutes, 21 seconds");
        assert_eq!(describe_duration(3600), "1 hour");
        assert_eq!(describe_duration(3661), "1 hour, 1 minute, 1 second");
        assert_eq!(describe_duration(0), "");
    }

    #[test]
    fn test_percentages_round_and_handle_no_games() {
        let stats = Stats {
            wins: 1,
            draws: 1,
            losses: 1,
            games_played: 3,
            last_updated: None,
        };
        assert_eq!(
            Percentages::of(&stats),
            Percentages {
                wins: 33,
                draws: 33,
                losses: 33
            }
        );
        assert_eq!(Percentages::of(&Stats::default()).wins, 0);
    }
}
