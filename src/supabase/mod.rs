//! Hosted backend: PostgREST rows, GoTrue auth, Storage objects and the
//! Realtime change feed of one Supabase project

mod auth;
mod client;
mod realtime;
mod rest;
mod storage;

pub use auth::{SignUpResponse, TokenResponse};
pub use client::{error_message, SupabaseClient};
pub use realtime::{topic, PhoenixFrame, HEARTBEAT_INTERVAL};
pub use rest::incident_params;

use std::sync::Arc;
use std::time::Duration;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::repository::Backend;

/// Every backend trait implemented against one project
pub struct SupabaseBackend {
    client: SupabaseClient,
    realtime_timeout: Duration,
}

impl SupabaseBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            client: SupabaseClient::new(config)?,
            realtime_timeout: Duration::from_secs(config.realtime_timeout_secs),
        })
    }

    #[must_use]
    pub const fn client(&self) -> &SupabaseClient {
        &self.client
    }

    /// Wire this project into every backend seam
    #[must_use]
    pub fn into_backend(self) -> Backend {
        Backend::from_shared(Arc::new(self))
    }
}
