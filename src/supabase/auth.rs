//! GoTrue authentication

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use super::SupabaseBackend;
use crate::auth::{AuthCredentials, AuthProvider, AuthUser, Session};
use crate::error::{Result, ZestyError};

/// Token grant as returned by `/token` and, when no confirmation is required, `/signup`
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl TokenResponse {
    #[must_use]
    pub fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| self.expires_in.map(|secs| now + Duration::seconds(secs)));
        Session {
            user: self.user,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// `/signup` answers with a token grant or, pending confirmation, a bare user
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(TokenResponse),
    Pending(AuthUser),
}

#[async_trait]
impl AuthProvider for SupabaseBackend {
    async fn sign_up(&self, credentials: &AuthCredentials, full_name: &str) -> Result<Option<Session>> {
        let body = json!({
            "email": credentials.email,
            "password": credentials.password,
            "data": { "full_name": full_name },
        });
        let request = self
            .client
            .request(Method::POST, self.client.endpoint("auth/v1/signup")?)
            .json(&body);
        match self.client.send_json::<SignUpResponse>("sign_up", request).await? {
            SignUpResponse::Session(token) => {
                let session = token.into_session(Utc::now());
                self.client.session.send_replace(Some(session.clone()));
                Ok(Some(session))
            },
            SignUpResponse::Pending(user) => {
                info!(user_id = %user.id, "Sign-up awaiting email confirmation");
                Ok(None)
            },
        }
    }

    async fn sign_in(&self, credentials: &AuthCredentials) -> Result<Session> {
        let mut url = self.client.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");
        let request = self
            .client
            .request(Method::POST, url)
            .json(&json!({ "email": credentials.email, "password": credentials.password }));
        let token: TokenResponse = self.client.send_json("sign_in", request).await?;
        let session = token.into_session(Utc::now());
        self.client.session.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.client.access_token().is_none() {
            return Ok(());
        }
        let request = self.client.request(Method::POST, self.client.endpoint("auth/v1/logout")?);
        let result = self.client.send_empty("sign_out", request).await;
        self.client.session.send_replace(None);
        if let Err(e) = &result {
            warn!(error = %e, "Remote sign-out failed, local session cleared");
        }
        result
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        if self.client.access_token().is_none() {
            return Err(ZestyError::Unauthenticated);
        }
        let request = self
            .client
            .request(Method::PUT, self.client.endpoint("auth/v1/user")?)
            .json(&json!({ "password": new_password }));
        self.client.send_empty("update_password", request).await
    }

    fn current_session(&self) -> Option<Session> {
        self.client.session.borrow().clone()
    }

    fn restore_session(&self, session: Session) {
        self.client.session.send_replace(Some(session));
    }

    fn drop_session(&self) {
        self.client.session.send_replace(None);
    }

    fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.client.session.subscribe()
    }
}
