//! Sign-up, sign-in, sign-out and session persistence

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::{AuthCredentials, AuthProvider, Session};
use crate::error::{Result, ZestyError};
use crate::metrics::MetricsCollector;
use crate::models::Profile;
use crate::repository::ProfileRepository;
use crate::validation::InputValidator;

/// Everything that decides whether the app is past the login screen
#[derive(Clone)]
pub struct SessionGate {
    auth: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileRepository>,
    session_file: Option<PathBuf>,
    metrics: MetricsCollector,
}

impl SessionGate {
    pub fn new(auth: Arc<dyn AuthProvider>, profiles: Arc<dyn ProfileRepository>, session_file: Option<PathBuf>) -> Self {
        Self { auth, profiles, session_file, metrics: MetricsCollector::default() }
    }

    #[must_use]
    pub fn current(&self) -> Option<Session> {
        self.auth.current_session()
    }

    /// Signed-in user id, or `Unauthenticated`
    pub fn user_id(&self) -> Result<Uuid> {
        self.current().map(|s| s.user_id()).ok_or(ZestyError::Unauthenticated)
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        self.auth.watch_session()
    }

    /// Adopt the persisted session, if one is present and unexpired
    pub fn restore(&self) -> Option<Session> {
        let session = Session::load(self.session_file.as_deref()?)?;
        info!(user_id = %session.user_id(), "Restored session");
        self.auth.restore_session(session.clone());
        Some(session)
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        if let Err(e) = InputValidator::validate_credentials(email, password) {
            self.metrics.record_validation_failure("sign_in");
            return Err(e);
        }
        let session = self
            .auth
            .sign_in(&AuthCredentials { email: email.trim().to_string(), password: password.to_string() })
            .await?;
        info!(user_id = %session.user_id(), "Signed in");
        self.persist(&session);
        Ok(session)
    }

    /// Create an account and its profile. `None` when the backend wants the
    /// address confirmed before the first sign-in.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, full_name: &str, email: &str, password: &str) -> Result<Option<Session>> {
        let checked = InputValidator::validate_display_name(full_name)
            .and_then(|()| InputValidator::validate_credentials(email, password))
            .and_then(|()| InputValidator::validate_new_password(password, password));
        if let Err(e) = checked {
            self.metrics.record_validation_failure("sign_up");
            return Err(e);
        }

        let full_name = InputValidator::sanitize_text(full_name);
        let credentials = AuthCredentials { email: email.trim().to_string(), password: password.to_string() };
        let Some(session) = self.auth.sign_up(&credentials, &full_name).await? else {
            info!("Sign-up pending email confirmation");
            return Ok(None);
        };

        let mut profile = Profile::new(session.user_id(), full_name);
        profile.email = session.user.email.clone();
        self.profiles.upsert_profile(&profile).await?;
        info!(user_id = %session.user_id(), "Signed up");
        self.persist(&session);
        Ok(Some(session))
    }

    pub async fn sign_out(&self) -> Result<()> {
        let result = self.auth.sign_out().await;
        if let Some(path) = &self.session_file {
            Session::clear(path)?;
        }
        result?;
        info!("Signed out");
        Ok(())
    }

    /// The backend rejected the session: forget it locally and on disk
    pub fn expire(&self) {
        self.auth.drop_session();
        if let Some(path) = &self.session_file {
            if let Err(e) = Session::clear(path) {
                warn!(path = %path.display(), error = %e, "Could not remove session file");
            }
        }
        info!("Session expired");
    }

    fn persist(&self, session: &Session) {
        let Some(path) = &self.session_file else { return };
        if let Err(e) = session.save(path) {
            warn!(path = %path.display(), error = %e, "Could not persist session");
        }
    }
}
