use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::error::ClientError;

#[derive(Clone, Debug)]
pub struct Config {
    /// Origin serving `/loginapi`, `/api` and `/gameserver`.
    pub base_url: String,
    pub leaderboard_url: String,
    pub lichess_url: String,
    /// JSON file holding the persisted client state.
    pub state_file: PathBuf,
    pub heartbeat_secs: u64,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            leaderboard_url: "https://api.chesstools.org/fide/top_active/".to_string(),
            lichess_url: "https://lichess.org".to_string(),
            state_file: PathBuf::from(".xadrez/state.json"),
            heartbeat_secs: 15,
            http_timeout_secs: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env::var("XADREZ_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            leaderboard_url: env::var("XADREZ_LEADERBOARD_URL").unwrap_or(defaults.leaderboard_url),
            lichess_url: env::var("XADREZ_LICHESS_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.lichess_url),
            state_file: env::var("XADREZ_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_file),
            heartbeat_secs: env::var("XADREZ_HEARTBEAT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.heartbeat_secs),
            http_timeout_secs: env::var("XADREZ_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
        }
    }

    /// Config pointing every service at one origin, as the local stubs do.
    pub fn for_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            leaderboard_url: format!("{base_url}/fide/top_active/"),
            lichess_url: base_url.clone(),
            base_url,
            ..Self::default()
        }
    }

    pub fn login_url(&self, path: &str) -> String {
        format!("{}/loginapi/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Base URL with the scheme swapped for its WebSocket counterpart.
    pub fn ws_base_url(&self) -> String {
        if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        }
    }

    pub fn game_socket_url(&self, csrf_token: &str) -> Result<Url, ClientError> {
        self.socket_url("gameserver/ws", csrf_token)
    }

    pub fn api_socket_url(&self, csrf_token: &str) -> Result<Url, ClientError> {
        self.socket_url("api/ws", csrf_token)
    }

    fn socket_url(&self, path: &str, csrf_token: &str) -> Result<Url, ClientError> {
        let raw = format!("{}/{path}", self.ws_base_url());
        let mut url = Url::parse(&raw).map_err(|e| ClientError::InvalidUrl(format!("{raw}: {e}")))?;
        url.query_pairs_mut().append_pair("csrfToken", csrf_token);
        Ok(url)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_urls_follow_scheme() {
        let config = Config::for_base_url("http://localhost:8080/");
        assert_eq!(
            config.game_socket_url("tok").unwrap().as_str(),
            "ws://localhost:8080/gameserver/ws?csrfToken=tok"
        );

        let config = Config::for_base_url("https://xadrez.example");
        assert_eq!(
            config.api_socket_url("t").unwrap().as_str(),
            "wss://xadrez.example/api/ws?csrfToken=t"
        );
        assert_eq!(config.login_url("/login"), "https://xadrez.example/loginapi/login");
        assert_eq!(config.api_url("savedgame"), "https://xadrez.example/api/savedgame");
    }

    #[test]
    fn test_csrf_token_is_encoded() {
        let config = Config::for_base_url("http://localhost:8080");
        let url = config.api_socket_url("a+b/c=d&e").unwrap();
        assert_eq!(url.query(), Some("csrfToken=a%2Bb%2Fc%3Dd%26e"));
        let (_, token) = url.query_pairs().next().unwrap();
        assert_eq!(token, "a+b/c=d&e");
    }
}
