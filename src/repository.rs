//! Backend read/write surface
//!
//! Each trait is one collection of the managed backend. Every call is a single
//! round trip touching a single table; nothing here spans rows transactionally.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use crate::auth::AuthProvider;
use crate::error::Result;
use crate::models::{Incident, IncidentQuery, IncidentStatus, Message, NewIncident, NewMessage, Profile, Shift};
use crate::realtime::ChangeFeed;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    /// List incidents newest first, filtered and capped by `query`
    async fn list_incidents(&self, query: &IncidentQuery) -> Result<Vec<Incident>>;

    async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>>;

    /// Insert one incident and return the stored row
    async fn insert_incident(&self, incident: &NewIncident) -> Result<Incident>;

    /// Set the status column of one incident and return the updated row
    async fn update_incident_status(&self, id: Uuid, status: &IncidentStatus) -> Result<Incident>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>>;

    async fn list_profiles(&self) -> Result<Vec<Profile>>;

    /// Insert or replace the profile keyed by its id
    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Every message where `user` is sender or receiver, oldest first
    async fn list_messages_for(&self, user: Uuid) -> Result<Vec<Message>>;

    async fn insert_message(&self, message: &NewMessage) -> Result<Message>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ShiftRepository: Send + Sync {
    /// Shifts for one profile between two dates inclusive, by date
    async fn list_shifts(&self, profile: Uuid, from: NaiveDate, to: NaiveDate) -> Result<Vec<Shift>>;
}

/// Object to store in a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUpload {
    pub bucket: String,
    pub path: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store the object and return its public reference
    async fn upload_object(&self, upload: &ObjectUpload) -> Result<String>;
}

/// Every backend collaborator the client needs, behind trait objects
#[derive(Clone)]
pub struct Backend {
    pub incidents: Arc<dyn IncidentRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub shifts: Arc<dyn ShiftRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub auth: Arc<dyn AuthProvider>,
    pub changes: Arc<dyn ChangeFeed>,
}

impl Backend {
    /// Wire every collaborator to one implementation
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: IncidentRepository
            + ProfileRepository
            + MessageRepository
            + ShiftRepository
            + ObjectStorage
            + AuthProvider
            + ChangeFeed
            + 'static,
    {
        Self {
            incidents: backend.clone(),
            profiles: backend.clone(),
            messages: backend.clone(),
            shifts: backend.clone(),
            storage: backend.clone(),
            auth: backend.clone(),
            changes: backend,
        }
    }
}
