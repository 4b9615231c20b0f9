//! Persisted key/value client state, stored as a flat JSON object.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ClientError;

pub const CLIENT_ID: &str = "clientId";
pub const USERNAME: &str = "username";
pub const EMAIL: &str = "email";
pub const CSRF_TOKEN: &str = "csrf_token";
pub const VERIFICATION_TOKEN: &str = "verificationToken";
/// Session cookie issued by the auth service, replayed on the next run.
pub const SESSION_COOKIE: &str = "session_cookie";
pub const BACKGROUND: &str = "background";
pub const PIECE: &str = "piece";

/// Keys that belong to a login session and are wiped on logout.
pub const SESSION_KEYS: [&str; 6] = [
    CLIENT_ID,
    USERNAME,
    EMAIL,
    CSRF_TOKEN,
    VERIFICATION_TOKEN,
    SESSION_COOKIE,
];

#[derive(Debug, Clone, Default)]
pub struct LocalStorage {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl LocalStorage {
    /// Load the store from `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(text) if !text.trim().is_empty() => serde_json::from_str(&text)?,
            Ok(_) => BTreeMap::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), keys = values.len(), "Opened local storage");
        Ok(Self {
            path: Some(path),
            values,
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<(), ClientError> {
        self.values.insert(key.to_string(), value.into());
        self.flush()
    }

    pub fn remove(&mut self, key: &str) -> Result<(), ClientError> {
        if self.values.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    /// Drop every session key, keeping preferences.
    pub fn clear_session(&mut self) -> Result<(), ClientError> {
        for key in SESSION_KEYS {
            self.values.remove(key);
        }
        self.flush()
    }

    fn flush(&self) -> Result<(), ClientError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(&self.values)?)?;
        Ok(())
    }
}
