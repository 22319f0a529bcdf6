//! Account settings: profile, password and preferences

use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::AuthProvider;
use crate::error::{Result, ZestyError};
use crate::metrics::MetricsCollector;
use crate::models::{Preferences, Profile, ProfileUpdate};
use crate::repository::ProfileRepository;
use crate::validation::InputValidator;

#[derive(Clone)]
pub struct AccountService {
    profiles: Arc<dyn ProfileRepository>,
    auth: Arc<dyn AuthProvider>,
    metrics: MetricsCollector,
}

impl AccountService {
    pub fn new(profiles: Arc<dyn ProfileRepository>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { profiles, auth, metrics: MetricsCollector::default() }
    }

    fn me(&self) -> Result<(Uuid, Option<String>)> {
        let session = self.auth.current_session().ok_or(ZestyError::Unauthenticated)?;
        Ok((session.user_id(), session.user.email))
    }

    /// The signed-in user's profile, with the email taken from the session
    pub async fn profile(&self) -> Result<Profile> {
        let (id, email) = self.me()?;
        let mut profile = self
            .profiles
            .get_profile(id)
            .await?
            .ok_or_else(|| ZestyError::NotFound(format!("profile {id}")))?;
        if email.is_some() {
            profile.email = email;
        }
        Ok(profile)
    }

    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile> {
        if let Err(e) = Self::check(update) {
            self.metrics.record_validation_failure("profile");
            return Err(e);
        }
        let mut profile = self.profile().await?;
        profile.full_name = InputValidator::sanitize_text(&update.full_name);
        profile.role = clean(update.role.as_deref());
        profile.department = clean(update.department.as_deref());
        profile.phone = clean(update.phone.as_deref());
        let saved = self.profiles.upsert_profile(&profile).await?;
        info!(profile_id = %saved.id, "Profile updated");
        Ok(saved)
    }

    fn check(update: &ProfileUpdate) -> Result<()> {
        InputValidator::validate_display_name(&update.full_name)?;
        if let Some(phone) = clean(update.phone.as_deref()) {
            InputValidator::validate_phone(&phone)?;
        }
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn change_password(&self, password: &str, confirmation: &str) -> Result<()> {
        if let Err(e) = InputValidator::validate_new_password(password, confirmation) {
            self.metrics.record_validation_failure("password");
            return Err(e);
        }
        self.me()?;
        self.auth.update_password(password).await?;
        info!("Password changed");
        Ok(())
    }

    pub async fn update_preferences(&self, preferences: Preferences) -> Result<Preferences> {
        let mut profile = self.profile().await?;
        profile.preferences = preferences;
        let saved = self.profiles.upsert_profile(&profile).await?;
        info!(profile_id = %saved.id, "Preferences saved");
        Ok(saved.preferences)
    }
}

fn clean(field: Option<&str>) -> Option<String> {
    field.map(InputValidator::sanitize_text).filter(|f| !f.is_empty())
}
