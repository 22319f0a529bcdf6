//! In-process backend
//!
//! Implements every backend trait over shared in-memory tables, including the
//! change feed. Used by the test-suite and by `zesty --offline`. Several
//! handles can share one store via [`InMemoryBackend::connect`], each with its
//! own session, like two browser sessions against one project.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::auth::{AuthCredentials, AuthProvider, AuthUser, Session};
use crate::error::{Result, ZestyError};
use crate::models::{
    Category, Incident, IncidentQuery, IncidentStatus, Message, NewIncident, NewMessage, Priority, Profile, Shift,
    Table,
};
use crate::realtime::{ChangeEvent, ChangeFeed, ChangeKind, Subscription, SUBSCRIPTION_BUFFER};
use crate::repository::{
    IncidentRepository, MessageRepository, ObjectStorage, ObjectUpload, ProfileRepository, ShiftRepository,
};

/// Operations that can be made to fail on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    ListIncidents,
    InsertIncident,
    UpdateIncident,
    UploadObject,
    ListProfiles,
    UpsertProfile,
    ListMessages,
    InsertMessage,
    Subscribe,
    SignIn,
}

struct UserRecord {
    id: Uuid,
    password: String,
}

#[derive(Default)]
struct Tables {
    incidents: Vec<Incident>,
    profiles: BTreeMap<Uuid, Profile>,
    messages: Vec<Message>,
    shifts: Vec<Shift>,
    objects: HashMap<String, Vec<u8>>,
    users: HashMap<String, UserRecord>,
}

#[derive(Default)]
struct Shared {
    tables: Mutex<Tables>,
    subscribers: Mutex<HashMap<u64, (Table, mpsc::Sender<ChangeEvent>)>>,
    next_subscriber: AtomicU64,
    faults: Mutex<HashSet<Fault>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl Shared {
    fn enter(&self, operation: &'static str, fault: Option<Fault>) -> Result<()> {
        *self.calls.lock().entry(operation).or_insert(0) += 1;
        if fault.is_some_and(|f| self.faults.lock().contains(&f)) {
            return Err(ZestyError::Backend {
                status: 503,
                message: format!("injected failure in {operation}"),
            });
        }
        Ok(())
    }

    fn publish(&self, table: Table, kind: ChangeKind, record_id: Uuid) {
        let event = ChangeEvent { table, kind, record_id: Some(record_id.to_string()) };
        self.subscribers.lock().retain(|_, (t, tx)| {
            if *t != table {
                return true;
            }
            match tx.try_send(event.clone()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

/// Handle to an in-memory store with its own session
pub struct InMemoryBackend {
    shared: Arc<Shared>,
    session: watch::Sender<Option<Session>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_shared(Arc::new(Shared::default()))
    }

    fn with_shared(shared: Arc<Shared>) -> Self {
        let (session, _) = watch::channel(None);
        Self { shared, session }
    }

    /// Another handle onto the same data, signed out
    #[must_use]
    pub fn connect(&self) -> Self {
        Self::with_shared(self.shared.clone())
    }

    /// Make `fault` fail until [`InMemoryBackend::heal`]
    pub fn fail(&self, fault: Fault) {
        self.shared.faults.lock().insert(fault);
    }

    pub fn heal(&self, fault: Fault) {
        self.shared.faults.lock().remove(&fault);
    }

    /// How many times `operation` was invoked, failed calls included
    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        self.shared.calls.lock().get(operation).copied().unwrap_or(0)
    }

    /// Subscriptions that have not been released yet
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.shared.subscribers.lock().values().filter(|(_, tx)| !tx.is_closed()).count()
    }

    #[must_use]
    pub fn stored_objects(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shared.tables.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Register an account without signing in; returns its user id
    pub fn add_user(&self, email: &str, password: &str, full_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let mut tables = self.shared.tables.lock();
        tables.users.insert(email.to_lowercase(), UserRecord { id, password: password.to_string() });
        let mut profile = Profile::new(id, full_name);
        profile.email = Some(email.to_string());
        tables.profiles.insert(id, profile);
        id
    }

    /// Insert a row directly, bypassing the write path, and notify subscribers
    pub fn insert_incident_row(&self, incident: Incident) {
        let id = incident.id;
        self.shared.tables.lock().incidents.push(incident);
        self.shared.publish(Table::Incidents, ChangeKind::Insert, id);
    }

    pub fn insert_profile_row(&self, profile: Profile) {
        let id = profile.id;
        self.shared.tables.lock().profiles.insert(id, profile);
        self.shared.publish(Table::Profiles, ChangeKind::Insert, id);
    }

    pub fn insert_shift_row(&self, shift: Shift) {
        let id = shift.id;
        self.shared.tables.lock().shifts.push(shift);
        self.shared.publish(Table::Shifts, ChangeKind::Insert, id);
    }

    /// Sample site data for `--offline`; returns the demo user's email and password
    pub fn seed_demo(&self) -> (&'static str, &'static str) {
        const EMAIL: &str = "john.smith@zoo.org";
        const PASSWORD: &str = "zesty-demo";

        let me = self.add_user(EMAIL, PASSWORD, "John Smith");
        let colleagues = [
            ("Sarah Johnson", "Senior Maintenance Supervisor", "Maintenance"),
            ("Mike Chen", "Operations Manager", "Operations"),
            ("Emma Davis", "Facilities Coordinator", "Facilities"),
            ("Lisa Martinez", "Safety Inspector", "Safety & Compliance"),
        ];
        let mut colleague_ids = Vec::new();
        for (name, role, department) in colleagues {
            let email = format!("{}@zoo.org", name.to_lowercase().replace(' ', "."));
            let id = self.add_user(&email, PASSWORD, name);
            let mut tables = self.shared.tables.lock();
            if let Some(profile) = tables.profiles.get_mut(&id) {
                profile.role = Some(role.to_string());
                profile.department = Some(department.to_string());
            }
            colleague_ids.push(id);
        }

        let now = Utc::now();
        let samples = [
            ("Small Farm", Category::Safety, Priority::High, "Fence section compromised, needs immediate repair", "Critical - In Progress", 2),
            ("Food Kiosk - Crepes", Category::Cleaning, Priority::Med, "Deep cleaning required after equipment malfunction", "Scheduled", 4),
            ("Giraffe Habitat - Viewing Platform", Category::Repair, Priority::High, "Observation deck railing requires immediate attention", "Urgent - Awaiting Parts", 5),
            ("Main Entrance - Ticketing", Category::Repair, Priority::Low, "Entrance gate mechanism intermittent", IncidentStatus::UNDER_REVIEW, 26),
            ("Big Aviary - Bird Sanctuary", Category::Repair, Priority::Med, "Perch structure replaced successfully", IncidentStatus::RESOLVED, 72),
            ("Arctic Area - Polar Bears", Category::Cleaning, Priority::Med, "Pool filtration system maintenance completed", IncidentStatus::RESOLVED, 120),
        ];
        {
            let mut tables = self.shared.tables.lock();
            for (location, category, priority, description, status, hours_ago) in samples {
                tables.incidents.push(Incident {
                    id: Uuid::new_v4(),
                    location: location.to_string(),
                    category,
                    priority,
                    description: description.to_string(),
                    detailed_description: None,
                    image_url: None,
                    status: IncidentStatus::new(status),
                    reported_by: Some("Sarah Johnson".to_string()),
                    created_at: now - Duration::hours(hours_ago),
                });
            }

            if let Some(&sarah) = colleague_ids.first() {
                tables.messages.push(Message {
                    id: Uuid::new_v4(),
                    sender_id: sarah,
                    receiver_id: me,
                    content: "Hey John! Can you check the tiger enclosure report?".to_string(),
                    created_at: now - Duration::minutes(20),
                });
            }

            let today = now.date_naive();
            for offset in 0..7 {
                let date = today + Duration::days(offset);
                let day_off = offset == 4;
                tables.shifts.push(Shift {
                    id: Uuid::new_v4(),
                    profile_id: me,
                    shift_date: date,
                    start_time: if day_off { None } else { NaiveTime::from_hms_opt(8, 0, 0) },
                    end_time: if day_off { None } else { NaiveTime::from_hms_opt(16, 0, 0) },
                    location: (!day_off).then(|| "Primate Section".to_string()),
                    role: (!day_off).then(|| "Maintenance Supervisor".to_string()),
                });
            }
        }

        (EMAIL, PASSWORD)
    }

    fn require_session(&self) -> Result<Session> {
        self.session.borrow().clone().ok_or(ZestyError::Unauthenticated)
    }

    fn issue_session(&self, id: Uuid, email: &str) -> Session {
        let session = Session {
            user: AuthUser { id, email: Some(email.to_string()) },
            access_token: format!("memory-{}", Uuid::new_v4()),
            refresh_token: None,
            expires_at: Some(Utc::now() + Duration::hours(1)),
        };
        self.session.send_replace(Some(session.clone()));
        session
    }
}

#[async_trait]
impl IncidentRepository for InMemoryBackend {
    async fn list_incidents(&self, query: &IncidentQuery) -> Result<Vec<Incident>> {
        self.shared.enter("list_incidents", Some(Fault::ListIncidents))?;
        Ok(query.apply(&self.shared.tables.lock().incidents))
    }

    async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>> {
        self.shared.enter("get_incident", Some(Fault::ListIncidents))?;
        Ok(self.shared.tables.lock().incidents.iter().find(|i| i.id == id).cloned())
    }

    async fn insert_incident(&self, incident: &NewIncident) -> Result<Incident> {
        self.shared.enter("insert_incident", Some(Fault::InsertIncident))?;
        self.require_session()?;
        let row = Incident {
            id: Uuid::new_v4(),
            location: incident.location.clone(),
            category: incident.category,
            priority: incident.priority,
            description: incident.description.clone(),
            detailed_description: incident.detailed_description.clone(),
            image_url: incident.image_url.clone(),
            status: incident.status.clone(),
            reported_by: incident.reported_by.clone(),
            created_at: incident.created_at,
        };
        self.shared.tables.lock().incidents.push(row.clone());
        self.shared.publish(Table::Incidents, ChangeKind::Insert, row.id);
        Ok(row)
    }

    async fn update_incident_status(&self, id: Uuid, status: &IncidentStatus) -> Result<Incident> {
        self.shared.enter("update_incident_status", Some(Fault::UpdateIncident))?;
        self.require_session()?;
        let updated = {
            let mut tables = self.shared.tables.lock();
            let row = tables
                .incidents
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or_else(|| ZestyError::NotFound(format!("incident {id}")))?;
            row.status = status.clone();
            row.clone()
        };
        self.shared.publish(Table::Incidents, ChangeKind::Update, id);
        Ok(updated)
    }
}

#[async_trait]
impl ProfileRepository for InMemoryBackend {
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        self.shared.enter("get_profile", Some(Fault::ListProfiles))?;
        Ok(self.shared.tables.lock().profiles.get(&id).cloned())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.shared.enter("list_profiles", Some(Fault::ListProfiles))?;
        Ok(self.shared.tables.lock().profiles.values().cloned().collect())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile> {
        self.shared.enter("upsert_profile", Some(Fault::UpsertProfile))?;
        let session = self.require_session()?;
        if session.user_id() != profile.id {
            return Err(ZestyError::Backend {
                status: 403,
                message: "profiles can only be written by their owner".to_string(),
            });
        }
        self.shared.tables.lock().profiles.insert(profile.id, profile.clone());
        self.shared.publish(Table::Profiles, ChangeKind::Update, profile.id);
        Ok(profile.clone())
    }
}

#[async_trait]
impl MessageRepository for InMemoryBackend {
    async fn list_messages_for(&self, user: Uuid) -> Result<Vec<Message>> {
        self.shared.enter("list_messages_for", Some(Fault::ListMessages))?;
        let mut rows: Vec<Message> =
            self.shared.tables.lock().messages.iter().filter(|m| m.involves(user)).cloned().collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        self.shared.enter("insert_message", Some(Fault::InsertMessage))?;
        let session = self.require_session()?;
        if session.user_id() != message.sender_id {
            return Err(ZestyError::Backend {
                status: 403,
                message: "messages can only be sent as yourself".to_string(),
            });
        }
        let row = Message {
            id: Uuid::new_v4(),
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content.clone(),
            created_at: message.created_at,
        };
        self.shared.tables.lock().messages.push(row.clone());
        self.shared.publish(Table::Messages, ChangeKind::Insert, row.id);
        Ok(row)
    }
}

#[async_trait]
impl ShiftRepository for InMemoryBackend {
    async fn list_shifts(&self, profile: Uuid, from: NaiveDate, to: NaiveDate) -> Result<Vec<Shift>> {
        self.shared.enter("list_shifts", None)?;
        let mut rows: Vec<Shift> = self
            .shared
            .tables
            .lock()
            .shifts
            .iter()
            .filter(|s| s.profile_id == profile && s.shift_date >= from && s.shift_date <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.shift_date, s.start_time));
        Ok(rows)
    }
}

#[async_trait]
impl ObjectStorage for InMemoryBackend {
    async fn upload_object(&self, upload: &ObjectUpload) -> Result<String> {
        self.shared.enter("upload_object", Some(Fault::UploadObject))?;
        self.require_session()?;
        let key = format!("{}/{}", upload.bucket, upload.path);
        let mut tables = self.shared.tables.lock();
        if tables.objects.contains_key(&key) {
            return Err(ZestyError::Storage(format!("object {key} already exists")));
        }
        tables.objects.insert(key.clone(), upload.bytes.clone());
        Ok(format!("memory://{key}"))
    }
}

#[async_trait]
impl AuthProvider for InMemoryBackend {
    async fn sign_up(&self, credentials: &AuthCredentials, full_name: &str) -> Result<Option<Session>> {
        self.shared.enter("sign_up", None)?;
        let email = credentials.email.to_lowercase();
        if self.shared.tables.lock().users.contains_key(&email) {
            return Err(ZestyError::Backend { status: 422, message: "User already registered".to_string() });
        }
        let id = self.add_user(&credentials.email, &credentials.password, full_name);
        Ok(Some(self.issue_session(id, &credentials.email)))
    }

    async fn sign_in(&self, credentials: &AuthCredentials) -> Result<Session> {
        self.shared.enter("sign_in", Some(Fault::SignIn))?;
        let id = {
            let tables = self.shared.tables.lock();
            match tables.users.get(&credentials.email.to_lowercase()) {
                Some(user) if user.password == credentials.password => user.id,
                _ => {
                    return Err(ZestyError::Backend {
                        status: 400,
                        message: "Invalid login credentials".to_string(),
                    })
                },
            }
        };
        Ok(self.issue_session(id, &credentials.email))
    }

    async fn sign_out(&self) -> Result<()> {
        self.shared.enter("sign_out", None)?;
        self.session.send_replace(None);
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<()> {
        self.shared.enter("update_password", None)?;
        let session = self.require_session()?;
        let mut tables = self.shared.tables.lock();
        let user = tables
            .users
            .values_mut()
            .find(|u| u.id == session.user_id())
            .ok_or_else(|| ZestyError::NotFound("user".to_string()))?;
        user.password = new_password.to_string();
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn restore_session(&self, session: Session) {
        self.session.send_replace(Some(session));
    }

    fn drop_session(&self) {
        self.session.send_replace(None);
    }

    fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }
}

#[async_trait]
impl ChangeFeed for InMemoryBackend {
    async fn subscribe(&self, table: Table) -> Result<Subscription> {
        self.shared.enter("subscribe", Some(Fault::Subscribe))?;
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = self.shared.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.shared.subscribers.lock().insert(id, (table, tx));

        let shared = Arc::downgrade(&self.shared);
        Ok(Subscription::new(table, rx, move || {
            if let Some(shared) = shared.upgrade() {
                shared.subscribers.lock().remove(&id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(email: &str) -> AuthCredentials {
        AuthCredentials { email: email.to_string(), password: "correct horse".to_string() }
    }

    #[tokio::test]
    async fn handles_share_data_but_not_sessions() {
        let a = InMemoryBackend::new();
        let b = a.connect();
        a.sign_up(&creds("a@zoo.org"), "Ann").await.unwrap();
        assert!(a.current_session().is_some());
        assert!(b.current_session().is_none());
        assert_eq!(b.list_profiles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn writes_need_a_session() {
        let backend = InMemoryBackend::new();
        let err = backend
            .update_incident_status(Uuid::new_v4(), &IncidentStatus::resolved())
            .await
            .unwrap_err();
        assert!(matches!(err, ZestyError::Unauthenticated));
    }

    #[tokio::test]
    async fn dropping_a_subscription_unregisters_it() {
        let backend = InMemoryBackend::new();
        let sub = backend.subscribe(Table::Incidents).await.unwrap();
        assert_eq!(backend.active_subscriptions(), 1);
        drop(sub);
        assert_eq!(backend.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn faults_fail_until_healed() {
        let backend = InMemoryBackend::new();
        backend.fail(Fault::ListIncidents);
        assert!(backend.list_incidents(&IncidentQuery::all()).await.is_err());
        backend.heal(Fault::ListIncidents);
        assert!(backend.list_incidents(&IncidentQuery::all()).await.is_ok());
        assert_eq!(backend.call_count("list_incidents"), 2);
    }
}
