//! Composition root
//!
//! [`App`] wires the router to the services. Every call site catches its own
//! errors and turns them into transient notices; nothing escapes to a global
//! handler.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::account::AccountService;
use crate::auth::Session;
use crate::config::AppConfig;
use crate::directory::DirectoryService;
use crate::error::{Result, ZestyError};
use crate::incidents::IncidentService;
use crate::live::LiveCollection;
use crate::messaging::MessagingService;
use crate::models::{Incident, Message};
use crate::navigation::{Nav, Router};
use crate::repository::Backend;
use crate::schedule::ScheduleService;
use crate::session::SessionGate;
use crate::validation::ReportDraft;

/// Notices kept before the oldest is dropped
pub const NOTICE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// Bounded queue of transient notices
#[derive(Debug, Default)]
pub struct Notices {
    queue: VecDeque<Notice>,
}

impl Notices {
    pub fn push(&mut self, level: NoticeLevel, text: impl Into<String>) {
        if self.queue.len() == NOTICE_CAPACITY {
            self.queue.pop_front();
        }
        self.queue.push_back(Notice { level, text: text.into() });
    }

    pub fn drain(&mut self) -> Vec<Notice> {
        self.queue.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

pub struct App {
    config: AppConfig,
    router: Router,
    notices: Notices,
    gate: SessionGate,
    session_rx: watch::Receiver<Option<Session>>,
    incidents: IncidentService,
    messaging: MessagingService,
    directory: DirectoryService,
    schedule: ScheduleService,
    account: AccountService,
    /// Live messages for the inbox overlay, with the user they were opened for
    inbox: Option<(Uuid, LiveCollection<Message>)>,
}

impl App {
    #[must_use]
    pub fn new(backend: &Backend, config: AppConfig) -> Self {
        let gate = SessionGate::new(backend.auth.clone(), backend.profiles.clone(), Some(config.session_path()));
        Self::with_gate(backend, config, gate)
    }

    /// Like [`App::new`] but without reading or writing a session file
    #[must_use]
    pub fn ephemeral(backend: &Backend, config: AppConfig) -> Self {
        let gate = SessionGate::new(backend.auth.clone(), backend.profiles.clone(), None);
        Self::with_gate(backend, config, gate)
    }

    fn with_gate(backend: &Backend, config: AppConfig, gate: SessionGate) -> Self {
        let mut app = Self {
            router: Router::new(),
            notices: Notices::default(),
            session_rx: gate.watch(),
            gate,
            incidents: IncidentService::new(backend, &config),
            messaging: MessagingService::new(backend, &config),
            directory: DirectoryService::new(backend.profiles.clone()),
            schedule: ScheduleService::new(backend.shifts.clone()),
            account: AccountService::new(backend.profiles.clone(), backend.auth.clone()),
            inbox: None,
            config,
        };
        app.sync_session();
        app
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub const fn incidents(&self) -> &IncidentService {
        &self.incidents
    }

    #[must_use]
    pub const fn messaging(&self) -> &MessagingService {
        &self.messaging
    }

    #[must_use]
    pub const fn directory(&self) -> &DirectoryService {
        &self.directory
    }

    #[must_use]
    pub const fn schedule(&self) -> &ScheduleService {
        &self.schedule
    }

    #[must_use]
    pub const fn account(&self) -> &AccountService {
        &self.account
    }

    #[must_use]
    pub const fn session(&self) -> &SessionGate {
        &self.gate
    }

    pub fn notices(&mut self) -> &mut Notices {
        &mut self.notices
    }

    pub fn user_id(&self) -> Result<Uuid> {
        self.gate.user_id()
    }

    /// Follow the auth provider: a session enters the app, its absence shows login
    pub fn sync_session(&mut self) -> bool {
        let signed_in = self.session_rx.borrow_and_update().is_some();
        match (signed_in, self.router.is_authenticated()) {
            (true, false) => {
                self.router.login();
                true
            },
            (false, true) => {
                self.leave();
                true
            },
            _ => false,
        }
    }

    /// Restore a persisted session, if any
    pub fn restore(&mut self) -> bool {
        let restored = self.gate.restore().is_some();
        self.sync_session();
        restored
    }

    pub fn navigate(&mut self, nav: Nav) -> bool {
        self.sync_session();
        self.router.apply(nav)
    }

    /// Handle a call site's outcome: errors become notices, and a lost
    /// session sends the user back to login
    pub fn settle<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                if e.is_validation() {
                    debug!(error = %e, "Rejected input");
                } else {
                    error!(error = %e, "Operation failed");
                }
                if e.is_unauthenticated() {
                    self.gate.expire();
                    self.leave();
                }
                self.notices.push(NoticeLevel::Error, e.user_message());
                None
            },
        }
    }

    /// Back to the login screen, releasing per-user live state
    fn leave(&mut self) {
        self.router.logout();
        self.inbox = None;
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> bool {
        let result = self.gate.sign_in(email, password).await;
        let signed_in = self.settle(result).is_some();
        self.sync_session();
        signed_in
    }

    pub async fn sign_up(&mut self, full_name: &str, email: &str, password: &str) -> bool {
        let result = self.gate.sign_up(full_name, email, password).await;
        match self.settle(result) {
            Some(Some(_)) => {
                self.notices.push(NoticeLevel::Success, "Account created");
            },
            Some(None) => {
                self.notices.push(NoticeLevel::Info, "Check your email to confirm your account");
            },
            None => return false,
        }
        self.sync_session();
        true
    }

    pub async fn sign_out(&mut self) {
        let result = self.gate.sign_out().await;
        let _ = self.settle(result);
        self.leave();
    }

    async fn reporter_name(&self) -> Option<String> {
        match self.account.profile().await {
            Ok(profile) => Some(profile.full_name).filter(|n| !n.trim().is_empty()),
            Err(e) => {
                debug!(error = %e, "No profile for reporter name");
                self.gate.current().and_then(|s| s.user.email)
            },
        }
    }

    /// Submit the report form; on success return to the dashboard
    pub async fn submit_report(&mut self, draft: &ReportDraft) -> Option<Incident> {
        let checked = self.incidents.check_report(draft);
        self.settle(checked)?;
        let reporter = self.reporter_name().await;
        let result = self.incidents.submit_report(draft, reporter.as_deref()).await;
        let incident = self.settle(result)?;
        self.notices.push(NoticeLevel::Success, "Report submitted");
        self.router.apply(Nav::Back);
        Some(incident)
    }

    /// Resolve the incident on the detail screen, then go back after the
    /// configured delay if the screen still shows it
    pub async fn resolve_selected(&mut self) -> Option<Incident> {
        let Some(selected) = self.router.selected_incident().cloned() else {
            self.notices.push(NoticeLevel::Error, "No incident selected");
            return None;
        };
        let result = self.incidents.resolve(&selected).await;
        let updated = self.settle(result)?;
        self.router.apply(Nav::IncidentUpdated(updated.clone()));
        self.notices.push(NoticeLevel::Success, "Incident marked as resolved");

        let delay = self.config.resolve_return_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.showing(updated.id) {
            self.router.apply(Nav::Back);
        }
        info!(incident_id = %updated.id, "Returned to dashboard after resolve");
        Some(updated)
    }

    fn showing(&self, id: Uuid) -> bool {
        self.router.selected_incident().is_some_and(|i| i.id == id)
    }

    /// Send from the compose dialog; closes it on success
    pub async fn send_message(&mut self, to: Uuid, body: &str) -> Option<Message> {
        let result = match self.user_id() {
            Ok(me) => self.messaging.send(me, to, body).await,
            Err(e) => Err(e),
        };
        let message = self.settle(result)?;
        self.notices.push(NoticeLevel::Success, "Message sent");
        self.router.apply(Nav::CloseCompose);
        self.refresh_inbox();
        Some(message)
    }

    /// Reply inside the inbox overlay
    pub async fn reply(&mut self, counterpart: Uuid, body: &str) -> Option<Message> {
        let result = match self.user_id() {
            Ok(me) => self.messaging.send(me, counterpart, body).await,
            Err(e) => Err(e),
        };
        let message = self.settle(result)?;
        self.refresh_inbox();
        Some(message)
    }

    /// Live messages behind the inbox overlay, started on first use and kept
    /// until the signed-in user changes
    pub fn inbox(&mut self) -> Result<&mut LiveCollection<Message>> {
        let me = self.user_id()?;
        let live = match self.inbox.take() {
            Some((owner, live)) if owner == me => live,
            _ => self.messaging.live_messages(me),
        };
        Ok(&mut self.inbox.insert((me, live)).1)
    }

    fn refresh_inbox(&self) {
        if let Some((_, live)) = &self.inbox {
            live.refresh();
        }
    }
}

/// Build an app over the in-memory backend
#[must_use]
pub fn offline(config: AppConfig) -> (Arc<crate::memory::InMemoryBackend>, App) {
    let store = Arc::new(crate::memory::InMemoryBackend::new());
    let backend = Backend::from_shared(store.clone());
    (store, App::ephemeral(&backend, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_are_bounded() {
        let mut notices = Notices::default();
        for n in 0..40 {
            notices.push(NoticeLevel::Info, format!("notice {n}"));
        }
        assert_eq!(notices.len(), NOTICE_CAPACITY);
        let drained = notices.drain();
        assert_eq!(drained[0].text, "notice 8");
        assert!(notices.is_empty());
    }

    #[tokio::test]
    async fn failed_sign_in_raises_notice_and_stays_on_login() {
        let (_store, mut app) = offline(AppConfig::default());
        assert!(!app.sign_in("nobody@zoo.org", "wrong-password").await);
        assert!(!app.router().is_authenticated());
        let notices = app.notices().drain();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn sign_in_and_out_drive_the_router() {
        let (store, mut app) = offline(AppConfig::default());
        let (email, password) = store.seed_demo();
        assert!(app.sign_in(email, password).await);
        assert!(app.router().is_authenticated());
        app.sign_out().await;
        assert!(!app.router().is_authenticated());
    }

    #[tokio::test]
    async fn settling_a_lost_session_returns_to_login() {
        let (store, mut app) = offline(AppConfig::default());
        let (email, password) = store.seed_demo();
        assert!(app.sign_in(email, password).await);
        app.notices().drain();

        assert_eq!(app.settle(Ok(7)), Some(7));
        assert!(app.router().is_authenticated());

        let lost: Result<()> = Err(ZestyError::Unauthenticated);
        assert!(app.settle(lost).is_none());
        assert!(!app.router().is_authenticated());
        assert!(!app.navigate(Nav::ReportNewIssue));
        assert_eq!(app.notices().drain()[0].level, NoticeLevel::Error);
    }
}
