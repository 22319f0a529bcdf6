//! Error types for the zesty-ops client.
//!
//! This module provides custom error types using `thiserror`. Errors fall into
//! three groups: validation failures caught before any network call, backend
//! call failures, and missing authentication.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the zesty-ops client.
#[derive(Error, Debug)]
pub enum ZestyError {
    /// A form was submitted with missing or malformed fields
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The operation needs a signed-in session
    #[error("Not signed in")]
    Unauthenticated,

    /// A row that was expected to exist was not returned
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resolve attempted on an incident that is already terminal
    #[error("Incident {0} is already resolved")]
    AlreadyResolved(Uuid),

    /// The backend answered with a non-success status
    #[error("Backend error {status}: {message}")]
    Backend {
        /// HTTP status code
        status: u16,
        /// Message extracted from the response body
        message: String,
    },

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A request or fetch did not complete in time
    #[error("Timed out after {}s", .0.as_secs_f32())]
    Timeout(Duration),

    /// Change-feed connection or protocol failure
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Object storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `ZestyError`
pub type Result<T> = std::result::Result<T, ZestyError>;

impl ZestyError {
    /// True for errors raised by client-side validation.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True when the session is gone or was rejected by the backend.
    #[must_use]
    pub const fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Backend { status: 401, .. })
    }

    /// True when repeating the same call could plausibly succeed.
    ///
    /// Nothing in the client retries automatically; callers use this to word
    /// the notice shown to the user.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Realtime(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Backend { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Text for a transient user-facing notice.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Unauthenticated => "Please sign in to continue".to_string(),
            Self::AlreadyResolved(_) => "This incident is already resolved".to_string(),
            Self::Backend { status: 401, .. } => "Your session has expired. Please sign in again".to_string(),
            Self::Backend { status: 403, .. } => {
                "You do not have permission to do that".to_string()
            },
            other if other.is_retryable() => {
                format!("{other}. Please try again.")
            },
            other => other.to_string(),
        }
    }
}

impl From<anyhow::Error> for ZestyError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ZestyError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Realtime(err.to_string())
    }
}
