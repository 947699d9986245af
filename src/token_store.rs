use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

pub const AVATAR_COUNT: u8 = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("avatar id must be between 1 and 5, got {0}")]
    InvalidAvatar(u8),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    auth_token: Option<String>,
    #[serde(default)]
    selected_avatar: Option<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    persisted: PersistedState,
    session_token: Option<String>,
}

/// Client-side state: auth token (session or persistent) and avatar choice.
///
/// Session values live only as long as the process; persistent values are
/// written to a JSON state file.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl LocalStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let persisted = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => return Err(e.into()),
        };
        debug!("💾 Opened local state at {}", path.display());
        Ok(Self {
            path,
            inner: Mutex::new(Inner { persisted, session_token: None }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &PersistedState) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(state)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    /// Persistent token wins over the session token.
    pub fn auth_token(&self) -> Option<String> {
        let inner = self.lock();
        inner
            .persisted
            .auth_token
            .clone()
            .or_else(|| inner.session_token.clone())
    }

    pub fn set_auth_token(&self, token: &str, remember: bool) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if remember {
            inner.persisted.auth_token = Some(token.to_string());
            self.persist(&inner.persisted)?;
        } else {
            inner.session_token = Some(token.to_string());
        }
        info!("🔑 Auth token stored ({})", if remember { "persistent" } else { "session" });
        Ok(())
    }

    pub fn clear_auth_token(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.session_token = None;
        if inner.persisted.auth_token.take().is_some() {
            self.persist(&inner.persisted)?;
        }
        info!("🔑 Auth token cleared");
        Ok(())
    }

    pub fn selected_avatar(&self) -> Option<u8> {
        self.lock().persisted.selected_avatar
    }

    #[allow(dead_code)]
    pub fn set_selected_avatar(&self, avatar: u8) -> Result<(), StoreError> {
        if !(1..=AVATAR_COUNT).contains(&avatar) {
            return Err(StoreError::InvalidAvatar(avatar));
        }
        let mut inner = self.lock();
        inner.persisted.selected_avatar = Some(avatar);
        self.persist(&inner.persisted)
    }

    /// Stored avatar, or a random one when the user never picked
    pub fn avatar_or_random(&self) -> u8 {
        self.selected_avatar()
            .unwrap_or_else(|| rand::thread_rng().gen_range(1..=AVATAR_COUNT))
    }
}
