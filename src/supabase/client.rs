//! HTTP plumbing shared by the row, auth and storage endpoints

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};
use url::Url;

use crate::auth::Session;
use crate::config::BackendConfig;
use crate::error::{Result, ZestyError};
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;

/// Authenticated HTTP client for one project
pub struct SupabaseClient {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
    timeout: Duration,
    pub(crate) session: watch::Sender<Option<Session>>,
    metrics: MetricsCollector,
}

impl SupabaseClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| ZestyError::InvalidConfig(format!("backend.url {}: {e}", config.url)))?;
        if !base.path().ends_with('/') {
            // join() replaces the last segment otherwise
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        if config.anon_key.trim().is_empty() {
            return Err(ZestyError::InvalidConfig("backend.anon_key is not set".to_string()));
        }
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("zesty-ops/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let (session, _) = watch::channel(None);
        Ok(Self {
            http,
            base,
            anon_key: config.anon_key.clone(),
            timeout,
            session,
            metrics: MetricsCollector::default(),
        })
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn access_token(&self) -> Option<String> {
        self.session.borrow().as_ref().map(|s| s.access_token.clone())
    }

    /// `{base}/{path}`; `path` has no leading slash
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ZestyError::InvalidConfig(format!("bad endpoint {path}: {e}")))
    }

    pub fn rest_url(&self, table: &str) -> Result<Url> {
        self.endpoint(&format!("rest/v1/{table}"))
    }

    /// WebSocket endpoint of the change feed
    pub fn realtime_url(&self) -> Result<Url> {
        let mut url = self.endpoint("realtime/v1/websocket")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| ZestyError::InvalidConfig(format!("cannot derive websocket url from {}", self.base)))?;
        url.query_pairs_mut().append_pair("apikey", &self.anon_key).append_pair("vsn", "1.0.0");
        Ok(url)
    }

    /// Request carrying the project key and the user's bearer token, falling
    /// back to the anon key when signed out
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self.access_token().unwrap_or_else(|| self.anon_key.clone());
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    /// Send, time, and decode a JSON response
    pub async fn send_json<T: DeserializeOwned>(&self, operation: &'static str, request: RequestBuilder) -> Result<T> {
        let response = self.execute(operation, request).await?;
        let body = response.bytes().await.map_err(|e| self.transport(e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send and discard the body
    pub async fn send_empty(&self, operation: &'static str, request: RequestBuilder) -> Result<()> {
        self.execute(operation, request).await.map(|_| ())
    }

    async fn execute(&self, operation: &'static str, request: RequestBuilder) -> Result<Response> {
        let timer = OperationTimer::new(operation);
        let outcome = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => Err(Self::backend_error(response).await),
            Err(e) => Err(self.transport(e)),
        };
        let elapsed = timer.finish(outcome.is_ok());
        self.metrics.record_backend_call(operation, elapsed, outcome.is_ok());
        if let Err(e) = &outcome {
            debug!(operation, error = %e, "Backend call failed");
            if matches!(e, ZestyError::Unauthenticated) && self.session.send_replace(None).is_some() {
                warn!(operation, "Access token rejected, session cleared");
            }
        }
        outcome
    }

    fn transport(&self, e: reqwest::Error) -> ZestyError {
        if e.is_timeout() {
            ZestyError::Timeout(self.timeout)
        } else {
            ZestyError::Http(e)
        }
    }

    async fn backend_error(response: Response) -> ZestyError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        status_error(status, &body)
    }
}

/// Error for a non-success response. A 401 means the bearer token is no
/// longer accepted.
pub fn status_error(status: StatusCode, body: &str) -> ZestyError {
    let message = error_message(status, body);
    if status == StatusCode::UNAUTHORIZED {
        debug!(%message, "Unauthorized response");
        return ZestyError::Unauthenticated;
    }
    ZestyError::Backend { status: status.as_u16(), message }
}

/// Pull the human-readable message out of a PostgREST/GoTrue/Storage error body
pub fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| json.get(key).and_then(serde_json::Value::as_str).map(str::to_string))
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> BackendConfig {
        BackendConfig {
            url: url.to_string(),
            anon_key: "anon".to_string(),
            request_timeout_secs: 5,
            realtime_timeout_secs: 5,
            storage_bucket: "incident-images".to_string(),
        }
    }

    #[test]
    fn endpoints_hang_off_the_project_url() {
        let client = SupabaseClient::new(&config("https://abc.supabase.co/")).unwrap();
        assert_eq!(client.rest_url("incidents").unwrap().as_str(), "https://abc.supabase.co/rest/v1/incidents");
        assert_eq!(
            client.realtime_url().unwrap().as_str(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let local = SupabaseClient::new(&config("http://localhost:54321")).unwrap();
        assert!(local.realtime_url().unwrap().as_str().starts_with("ws://localhost:54321/"));
    }

    #[test]
    fn base_path_is_kept_without_trailing_slash() {
        let proxied = SupabaseClient::new(&config("https://gateway.zoo.org/supabase")).unwrap();
        assert_eq!(
            proxied.rest_url("incidents").unwrap().as_str(),
            "https://gateway.zoo.org/supabase/rest/v1/incidents"
        );
        assert!(proxied
            .realtime_url()
            .unwrap()
            .as_str()
            .starts_with("wss://gateway.zoo.org/supabase/realtime/v1/websocket?"));
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let mut cfg = config("https://abc.supabase.co");
        cfg.anon_key = " ".to_string();
        assert!(matches!(SupabaseClient::new(&cfg), Err(ZestyError::InvalidConfig(_))));
    }

    #[test]
    fn unauthorized_responses_mean_signed_out() {
        let err = status_error(StatusCode::UNAUTHORIZED, r#"{"message":"JWT expired"}"#);
        assert!(matches!(err, ZestyError::Unauthenticated));
        let err = status_error(StatusCode::FORBIDDEN, r#"{"message":"new row violates row-level security policy"}"#);
        assert!(matches!(err, ZestyError::Backend { status: 403, .. }));
    }

    #[test]
    fn error_bodies_are_mined_for_messages() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(error_message(StatusCode::CONFLICT, r#"{"code":"23505","message":"duplicate key"}"#), "duplicate key");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
    }
}
