//! Login session: the HTTP calls against `/loginapi` and the persisted
//! session state built from their answers.

pub mod forms;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::clients::HttpContext;
use crate::config::Config;
use crate::error::ClientError;
use crate::storage::{self, LocalStorage};

use forms::{ConfirmForm, LoginForm, RegisterForm};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub client_id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
    pub csrf_token: String,
}

/// `{"data": ...}` wrapper used by every `/loginapi` answer.
#[derive(Debug, Deserialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingRegistration {
    verification_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest<'a> {
    verification_code: &'a str,
    verification_token: &'a str,
}

pub struct AuthClient {
    http: HttpContext,
    config: Config,
}

impl AuthClient {
    pub fn new(http: HttpContext, config: Config) -> Self {
        Self { http, config }
    }

    pub async fn login(&self, form: &LoginForm) -> Result<Session, ClientError> {
        form.validate()?;
        let resp = self
            .http
            .client()
            .post(self.config.login_url("login"))
            .form(form)
            .send()
            .await?;
        let session = read_data::<Session>(resp).await?;
        info!(username = %session.username, "Logged in");
        Ok(session)
    }

    /// Start a registration. Returns the verification token that has to be
    /// confirmed with the emailed code.
    pub async fn register(&self, form: &RegisterForm) -> Result<String, ClientError> {
        form.check()?;
        let resp = self
            .http
            .client()
            .post(self.config.login_url("register"))
            .form(form)
            .send()
            .await?;
        let pending = read_data::<PendingRegistration>(resp).await?;
        info!(username = %form.username, "Registration pending confirmation");
        Ok(pending.verification_token)
    }

    pub async fn confirm_registration(&self, form: &ConfirmForm) -> Result<Session, ClientError> {
        form.validate()?;
        let resp = self
            .http
            .client()
            .post(self.config.login_url("confirm-registration"))
            .form(&ConfirmRequest {
                verification_code: form.code.trim(),
                verification_token: &form.token,
            })
            .send()
            .await?;
        read_data::<Session>(resp).await
    }

    /// Ask the auth service whether the stored session is still valid.
    pub async fn validate_session(&self, csrf_token: &str) -> Result<bool, ClientError> {
        let resp = self
            .http
            .client()
            .post(self.config.login_url("validate-session"))
            .header("X-CSRF-Token", csrf_token)
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let resp = self
            .http
            .client()
            .post(self.config.login_url("logout"))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClientError::from_response(resp).await);
        }
        Ok(())
    }
}

async fn read_data<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    if !resp.status().is_success() {
        return Err(ClientError::from_response(resp).await);
    }
    let body: DataResponse<T> = resp.json().await?;
    Ok(body.data)
}

/// Session state shared by every page, backed by the local store.
pub struct AuthContext {
    storage: LocalStorage,
}

impl AuthContext {
    pub fn new(storage: LocalStorage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut LocalStorage {
        &mut self.storage
    }

    /// The stored session, if every part of it is present.
    pub fn session(&self) -> Option<Session> {
        let client_id = self.storage.get(storage::CLIENT_ID)?;
        let username = self.storage.get(storage::USERNAME)?;
        let csrf_token = self.storage.get(storage::CSRF_TOKEN)?;
        Some(Session {
            client_id: client_id.to_string(),
            username: username.to_string(),
            email: self.storage.get(storage::EMAIL).unwrap_or_default().to_string(),
            csrf_token: csrf_token.to_string(),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    pub fn require_session(&self) -> Result<Session, ClientError> {
        self.session().ok_or(ClientError::Unauthorized)
    }

    pub fn pending_verification(&self) -> Option<&str> {
        self.storage.get(storage::VERIFICATION_TOKEN)
    }

    fn store_session(&mut self, session: &Session, http: &HttpContext) -> Result<(), ClientError> {
        self.storage.set(storage::CLIENT_ID, session.client_id.as_str())?;
        self.storage.set(storage::USERNAME, session.username.as_str())?;
        self.storage.set(storage::EMAIL, session.email.as_str())?;
        self.storage.set(storage::CSRF_TOKEN, session.csrf_token.as_str())?;
        self.storage.remove(storage::VERIFICATION_TOKEN)?;
        if let Some(cookie) = http.session_cookie() {
            self.storage.set(storage::SESSION_COOKIE, cookie)?;
        }
        Ok(())
    }

    pub async fn login(&mut self, client: &AuthClient, form: &LoginForm) -> Result<Session, ClientError> {
        let session = client.login(form).await?;
        self.store_session(&session, &client.http)?;
        Ok(session)
    }

    pub async fn register(&mut self, client: &AuthClient, form: &RegisterForm) -> Result<(), ClientError> {
        let token = client.register(form).await?;
        self.storage.set(storage::VERIFICATION_TOKEN, token)?;
        self.storage.set(storage::USERNAME, form.username.as_str())?;
        Ok(())
    }

    pub async fn confirm(&mut self, client: &AuthClient, code: &str) -> Result<Session, ClientError> {
        let form = ConfirmForm {
            code: code.to_string(),
            token: self.pending_verification().unwrap_or_default().to_string(),
        };
        let session = client.confirm_registration(&form).await?;
        self.store_session(&session, &client.http)?;
        info!(username = %session.username, "Registration confirmed");
        Ok(session)
    }

    /// Check the stored session with the server; an invalid session is
    /// cleared and reported as [`ClientError::Unauthorized`].
    pub async fn ensure_valid(&mut self, client: &AuthClient) -> Result<Session, ClientError> {
        let session = self.require_session()?;
        if client.validate_session(&session.csrf_token).await? {
            return Ok(session);
        }
        warn!(username = %session.username, "Session rejected, logging out");
        self.forget()?;
        Err(ClientError::Unauthorized)
    }

    pub async fn logout(&mut self, client: &AuthClient) -> Result<(), ClientError> {
        if let Err(e) = client.logout().await {
            warn!("Server logout failed: {e}");
        }
        self.forget()
    }

    /// Drop the local session without talking to the server.
    pub fn forget(&mut self) -> Result<(), ClientError> {
        self.storage.clear_session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_needs_id_name_and_token() {
        let mut auth = AuthContext::new(LocalStorage::in_memory());
        assert!(!auth.is_authenticated());

        auth.storage_mut().set(storage::CLIENT_ID, "c1").unwrap();
        auth.storage_mut().set(storage::USERNAME, "magnus").unwrap();
        assert!(auth.session().is_none());

        auth.storage_mut().set(storage::CSRF_TOKEN, "tok").unwrap();
        let session = auth.session().unwrap();
        assert_eq!(session.client_id, "c1");
        assert_eq!(session.email, "");

        auth.forget().unwrap();
        assert!(matches!(auth.require_session(), Err(ClientError::Unauthorized)));
    }

    #[test]
    fn test_session_payload_uses_camel_case() {
        let body = r#"{"type":"result","data":{"clientId":"c1","username":"m","email":"m@x.io","csrfToken":"t","serverResponse":"User logged in"}}"#;
        let parsed: DataResponse<Session> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.csrf_token, "t");
    }
}
