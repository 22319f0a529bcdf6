//! Session types and the authentication provider seam

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::Result;

/// Email/password pair for sign-up and sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCredentials {
    pub email: String,
    pub password: String,
}

/// The authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// A signed-in session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: AuthUser,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    #[must_use]
    pub const fn user_id(&self) -> Uuid {
        self.user.id
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Read a persisted session; a missing or unreadable file means signed out
    #[must_use]
    pub fn load(path: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<Self>(&raw) {
            Ok(session) if !session.is_expired(Utc::now()) => Some(session),
            Ok(_) => {
                tracing::info!(path = %path.display(), "Stored session expired");
                None
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                None
            },
        }
    }

    /// Persist the session for the next run
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn clear(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create an account; `None` when the backend requires email confirmation first
    async fn sign_up(&self, credentials: &AuthCredentials, full_name: &str) -> Result<Option<Session>>;

    async fn sign_in(&self, credentials: &AuthCredentials) -> Result<Session>;

    async fn sign_out(&self) -> Result<()>;

    /// Change the signed-in user's password
    async fn update_password(&self, new_password: &str) -> Result<()>;

    fn current_session(&self) -> Option<Session>;

    /// Adopt a previously persisted session without a round trip
    fn restore_session(&self, session: Session);

    /// Forget the local session after the backend stopped accepting it
    fn drop_session(&self);

    /// Receiver that observes every session change
    fn watch_session(&self) -> watch::Receiver<Option<Session>>;
}
