pub mod api;
pub mod leaderboard;
pub mod lichess;

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Url};

use crate::config::Config;
use crate::error::ClientError;

/// HTTP client shared by every service client, with one cookie jar so the
/// session cookie set at login rides along on API calls.
#[derive(Clone)]
pub struct HttpContext {
    client: Client,
    jar: Arc<Jar>,
    origin: Option<Url>,
}

impl HttpContext {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent("Xadrez/1.0")
            .timeout(config.http_timeout())
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        Ok(Self {
            client,
            jar,
            origin: Url::parse(&config.base_url).ok(),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Cookie header value the jar holds for the service origin.
    pub fn session_cookie(&self) -> Option<String> {
        let origin = self.origin.as_ref()?;
        let header = self.jar.cookies(origin)?;
        header.to_str().ok().map(str::to_string)
    }

    /// Put back cookies saved by [`HttpContext::session_cookie`].
    pub fn restore_session_cookie(&self, cookies: &str) {
        let Some(origin) = &self.origin else { return };
        for cookie in cookies.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            self.jar.add_cookie_str(cookie, origin);
        }
    }
}
