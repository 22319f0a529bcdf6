//! Incident feed, history, facility map, submission and resolution

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{Result, ZestyError};
use crate::live::{LiveCollection, LiveOptions, SyncSource};
use crate::metrics::MetricsCollector;
use crate::models::{Category, Incident, IncidentQuery, IncidentStatus, NewIncident, Priority, Table};
use crate::realtime::ChangeFeed;
use crate::repository::{Backend, IncidentRepository, ObjectStorage, ObjectUpload};
use crate::sites::{resolve_location, MapPin, PinStatus, MAP_SITES};
use crate::validation::{InputValidator, ReportDraft};

/// Active incidents, newest first, at most `cap` of them
#[must_use]
pub fn active_feed(incidents: &[Incident], cap: usize) -> Vec<Incident> {
    IncidentQuery::active().with_limit(cap).apply(incidents)
}

/// One row of the "all incidents" screen
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub incident: Incident,
    pub resolved: bool,
}

impl HistoryEntry {
    /// Badge text; resolved rows are marked, others show their status
    #[must_use]
    pub fn marker(&self) -> &str {
        if self.resolved {
            IncidentStatus::RESOLVED
        } else {
            status_display(&self.incident)
        }
    }
}

/// Every incident, newest first, resolved ones flagged
#[must_use]
pub fn history(incidents: &[Incident]) -> Vec<HistoryEntry> {
    IncidentQuery::all()
        .apply(incidents)
        .into_iter()
        .map(|incident| HistoryEntry { resolved: incident.is_resolved(), incident })
        .collect()
}

/// Pins for the site plan; a pin shows an issue while any active incident sits there
#[must_use]
pub fn facility_map(incidents: &[Incident]) -> Vec<MapPin> {
    MAP_SITES
        .iter()
        .map(|site| {
            let open_incidents = incidents
                .iter()
                .filter(|i| !i.is_resolved() && site.matches(&i.location))
                .count();
            MapPin {
                name: site.name,
                x: site.x,
                y: site.y,
                status: if open_incidents > 0 { PinStatus::Issue } else { PinStatus::Good },
                open_incidents,
            }
        })
        .collect()
}

/// Whether the detail screen offers the resolve action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolveControl {
    Offer,
    AlreadyResolved,
}

#[must_use]
pub fn resolve_control(incident: &Incident) -> ResolveControl {
    if incident.is_resolved() {
        ResolveControl::AlreadyResolved
    } else {
        ResolveControl::Offer
    }
}

fn status_display(incident: &Incident) -> &str {
    let status = incident.status.as_str();
    if status.trim().is_empty() {
        IncidentStatus::UNDER_REVIEW
    } else {
        status
    }
}

/// Everything the detail screen shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentDetail {
    pub id: Uuid,
    pub title: String,
    pub location: String,
    pub category: String,
    pub priority: String,
    pub description: String,
    pub reporter: String,
    pub status: String,
    pub image_url: Option<String>,
    pub reported_at: String,
    pub control: ResolveControl,
}

impl IncidentDetail {
    #[must_use]
    pub fn from_incident(incident: &Incident) -> Self {
        Self {
            id: incident.id,
            title: incident.description.clone(),
            location: incident.location.clone(),
            category: incident.category.to_string(),
            priority: incident.priority.to_string(),
            description: incident.full_description().to_string(),
            reporter: incident.reporter_display().to_string(),
            status: status_display(incident).to_string(),
            image_url: incident.image_url.clone(),
            reported_at: incident.created_at.format("%b %-d, %Y %H:%M").to_string(),
            control: resolve_control(incident),
        }
    }
}

/// Submission and resolution against the incident table
#[derive(Clone)]
pub struct IncidentService {
    incidents: Arc<dyn IncidentRepository>,
    storage: Arc<dyn ObjectStorage>,
    changes: Arc<dyn ChangeFeed>,
    bucket: String,
    page_size: usize,
    poll_interval: Duration,
    fetch_timeout: Duration,
    metrics: MetricsCollector,
}

impl IncidentService {
    #[must_use]
    pub fn new(backend: &Backend, config: &AppConfig) -> Self {
        Self::from_parts(
            backend.incidents.clone(),
            backend.storage.clone(),
            backend.changes.clone(),
            config,
        )
    }

    #[must_use]
    pub fn from_parts(
        incidents: Arc<dyn IncidentRepository>,
        storage: Arc<dyn ObjectStorage>,
        changes: Arc<dyn ChangeFeed>,
        config: &AppConfig,
    ) -> Self {
        Self {
            incidents,
            storage,
            changes,
            bucket: config.backend.storage_bucket.clone(),
            page_size: config.feed.page_size,
            poll_interval: config.feed_poll_interval(),
            fetch_timeout: config.fetch_timeout(),
            metrics: MetricsCollector::default(),
        }
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Validate, upload the optional photo, then write one incident row.
    ///
    /// Nothing touches the network when validation fails. A failed upload
    /// aborts the submission. A failed insert after a successful upload leaves
    /// the stored object behind.
    #[instrument(skip(self, draft), fields(category = %draft.category))]
    pub async fn submit_report(&self, draft: &ReportDraft, reporter: Option<&str>) -> Result<Incident> {
        self.check_report(draft)?;
        let category: Category = draft.category.parse()?;
        let priority: Priority = match draft.priority.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p.parse()?,
            _ => Priority::default(),
        };

        let uploaded = match &draft.image {
            Some(image) => {
                let upload = ObjectUpload {
                    bucket: self.bucket.clone(),
                    path: format!(
                        "reports/{}-{}",
                        Uuid::new_v4(),
                        InputValidator::sanitize_object_name(&image.file_name)
                    ),
                    content_type: image.content_type.clone(),
                    bytes: image.bytes.clone(),
                };
                let url = self.storage.upload_object(&upload).await.map_err(|e| {
                    warn!(error = %e, "Photo upload failed, report not submitted");
                    e
                })?;
                Some((upload.path, url))
            },
            None => None,
        };

        let row = NewIncident {
            location: resolve_location(&draft.location),
            category,
            priority,
            description: InputValidator::sanitize_text(&draft.description),
            detailed_description: draft
                .detailed_description
                .as_deref()
                .map(InputValidator::sanitize_text)
                .filter(|d| !d.is_empty()),
            image_url: uploaded.as_ref().map(|(_, url)| url.clone()),
            status: IncidentStatus::initial(),
            reported_by: reporter.map(str::to_string),
            created_at: Utc::now(),
        };

        match self.incidents.insert_incident(&row).await {
            Ok(incident) => {
                info!(incident_id = %incident.id, location = %incident.location, "Incident reported");
                Ok(incident)
            },
            Err(e) => {
                if let Some((path, _)) = &uploaded {
                    warn!(bucket = %self.bucket, path = %path, error = %e, "Incident insert failed, uploaded photo left orphaned");
                }
                Err(e)
            },
        }
    }

    /// Validate a report draft without touching the backend
    pub fn check_report(&self, draft: &ReportDraft) -> Result<()> {
        InputValidator::validate_report(draft).inspect_err(|_| {
            self.metrics.record_validation_failure("report");
        })
    }

    /// Mark a non-terminal incident resolved and return the updated row
    #[instrument(skip(self, incident), fields(incident_id = %incident.id))]
    pub async fn resolve(&self, incident: &Incident) -> Result<Incident> {
        if resolve_control(incident) == ResolveControl::AlreadyResolved {
            return Err(ZestyError::AlreadyResolved(incident.id));
        }
        let updated = self
            .incidents
            .update_incident_status(incident.id, &IncidentStatus::resolved())
            .await?;
        info!(status = %updated.status, "Incident resolved");
        Ok(updated)
    }

    pub async fn get(&self, id: Uuid) -> Result<Incident> {
        self.incidents
            .get_incident(id)
            .await?
            .ok_or_else(|| ZestyError::NotFound(format!("incident {id}")))
    }

    /// Dashboard feed: active incidents, capped to the page size
    #[must_use]
    pub fn live_feed(&self) -> LiveCollection<Incident> {
        self.live("incident_feed", IncidentQuery::active().with_limit(self.page_size))
    }

    /// Every active incident, for the facility map
    #[must_use]
    pub fn live_active(&self) -> LiveCollection<Incident> {
        self.live("facility_map", IncidentQuery::active())
    }

    /// Full history including resolved incidents
    #[must_use]
    pub fn live_history(&self) -> LiveCollection<Incident> {
        self.live("incident_history", IncidentQuery::all())
    }

    fn live(&self, name: &'static str, query: IncidentQuery) -> LiveCollection<Incident> {
        let repo = self.incidents.clone();
        let fetch = move || {
            let repo = repo.clone();
            let query = query.clone();
            async move { repo.list_incidents(&query).await }
        };
        LiveCollection::spawn(
            name,
            fetch,
            SyncSource::Push {
                feed: self.changes.clone(),
                table: Table::Incidents,
                fallback_poll: Some(self.poll_interval),
            },
            |i: &Incident| i.id.to_string(),
            LiveOptions {
                fetch_timeout: self.fetch_timeout,
                metrics: self.metrics.clone(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use crate::repository::{MockIncidentRepository, MockObjectStorage};
    use crate::validation::ImageAttachment;
    use chrono::Duration as ChronoDuration;

    fn incident(location: &str, status: &str, minutes_ago: i64) -> Incident {
        Incident {
            id: Uuid::new_v4(),
            location: location.into(),
            category: Category::Safety,
            priority: Priority::Med,
            description: format!("Issue at {location}"),
            detailed_description: None,
            image_url: None,
            status: IncidentStatus::new(status),
            reported_by: None,
            created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
        }
    }

    fn service(repo: MockIncidentRepository, storage: MockObjectStorage) -> IncidentService {
        IncidentService::from_parts(
            Arc::new(repo),
            Arc::new(storage),
            Arc::new(InMemoryBackend::new()),
            &AppConfig::default(),
        )
    }

    fn draft() -> ReportDraft {
        ReportDraft {
            category: "Safety".into(),
            location: "small-farm".into(),
            description: "Fence broken".into(),
            ..ReportDraft::default()
        }
    }

    #[test]
    fn feed_caps_and_excludes_resolved() {
        let rows: Vec<Incident> = (0..8)
            .map(|n| incident("Small Farm", if n % 3 == 0 { "Resolved" } else { "Under Review" }, n))
            .collect();
        let feed = active_feed(&rows, 5);
        assert_eq!(feed.len(), 5);
        assert!(feed.iter().all(|i| !i.is_resolved()));
        assert!(feed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn history_keeps_resolved_with_marker() {
        let rows = vec![incident("Big Aviary", "Resolved", 1), incident("Big Aviary", "", 2)];
        let entries = history(&rows);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].resolved);
        assert_eq!(entries[0].marker(), "Resolved");
        assert_eq!(entries[1].marker(), "Under Review");
    }

    #[test]
    fn map_pins_flag_active_incidents_only() {
        let rows = vec![
            incident("Giraffe Habitat - Feeding Deck", "Under Review", 1),
            incident("Small Farm", "Resolved", 2),
        ];
        let pins = facility_map(&rows);
        let giraffe = pins.iter().find(|p| p.name == "Giraffe Habitat").unwrap();
        assert_eq!(giraffe.status, PinStatus::Issue);
        assert_eq!(giraffe.open_incidents, 1);
        let farm = pins.iter().find(|p| p.name == "Small Farm").unwrap();
        assert_eq!(farm.status, PinStatus::Good);
    }

    #[test]
    fn detail_falls_back_for_missing_fields() {
        let mut i = incident("Lemurs & Primates", "", 0);
        i.detailed_description = Some("Door latch sticks in wet weather".into());
        let detail = IncidentDetail::from_incident(&i);
        assert_eq!(detail.reporter, "Staff Member");
        assert_eq!(detail.status, "Under Review");
        assert_eq!(detail.description, "Door latch sticks in wet weather");
        assert_eq!(detail.control, ResolveControl::Offer);
    }

    #[tokio::test]
    async fn invalid_report_never_writes() {
        let mut repo = MockIncidentRepository::new();
        repo.expect_insert_incident().times(0);
        let mut storage = MockObjectStorage::new();
        storage.expect_upload_object().times(0);

        let mut bad = draft();
        bad.description = "   ".into();
        bad.image = Some(ImageAttachment::from_bytes("fence.jpg", vec![1, 2, 3]));
        let err = service(repo, storage).submit_report(&bad, None).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn submit_without_image_writes_initial_status() {
        let mut repo = MockIncidentRepository::new();
        repo.expect_insert_incident()
            .withf(|row| {
                row.status == IncidentStatus::initial()
                    && row.image_url.is_none()
                    && row.location == "Small Farm"
                    && row.priority == Priority::Med
            })
            .times(1)
            .returning(|row| {
                Ok(Incident {
                    id: Uuid::new_v4(),
                    location: row.location.clone(),
                    category: row.category,
                    priority: row.priority,
                    description: row.description.clone(),
                    detailed_description: row.detailed_description.clone(),
                    image_url: row.image_url.clone(),
                    status: row.status.clone(),
                    reported_by: row.reported_by.clone(),
                    created_at: row.created_at,
                })
            });

        let created = service(repo, MockObjectStorage::new())
            .submit_report(&draft(), Some("John Smith"))
            .await
            .unwrap();
        assert_eq!(created.reported_by.as_deref(), Some("John Smith"));
    }

    #[tokio::test]
    async fn failed_upload_aborts_submission() {
        let mut repo = MockIncidentRepository::new();
        repo.expect_insert_incident().times(0);
        let mut storage = MockObjectStorage::new();
        storage
            .expect_upload_object()
            .times(1)
            .returning(|_| Err(ZestyError::Storage("bucket unavailable".into())));

        let mut with_image = draft();
        with_image.image = Some(ImageAttachment::from_bytes("fence.png", vec![0; 16]));
        let err = service(repo, storage).submit_report(&with_image, None).await.unwrap_err();
        assert!(matches!(err, ZestyError::Storage(_)));
    }

    #[tokio::test]
    async fn uploaded_reference_is_embedded_in_the_row() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_upload_object()
            .withf(|u| u.bucket == "incident-images" && u.path.ends_with("fence_photo.png") && u.content_type == "image/png")
            .returning(|u| Ok(format!("https://cdn.test/{}", u.path)));
        let mut repo = MockIncidentRepository::new();
        repo.expect_insert_incident()
            .withf(|row| row.image_url.as_deref().is_some_and(|u| u.starts_with("https://cdn.test/reports/")))
            .times(1)
            .returning(|_| Err(ZestyError::Backend { status: 500, message: "insert failed".into() }));

        let mut with_image = draft();
        with_image.image = Some(ImageAttachment::from_bytes("fence photo.png", vec![0; 16]));
        let err = service(repo, storage).submit_report(&with_image, None).await.unwrap_err();
        assert!(matches!(err, ZestyError::Backend { status: 500, .. }));
    }

    #[tokio::test]
    async fn resolve_is_gated_on_status() {
        let mut repo = MockIncidentRepository::new();
        repo.expect_update_incident_status().times(0);
        let resolved = incident("Small Farm", "Resolved", 0);
        let err = service(repo, MockObjectStorage::new()).resolve(&resolved).await.unwrap_err();
        assert!(matches!(err, ZestyError::AlreadyResolved(id) if id == resolved.id));
    }

    #[tokio::test]
    async fn resolve_updates_status_once() {
        let open = incident("Small Farm", "Under Review", 0);
        let returned = Incident { status: IncidentStatus::resolved(), ..open.clone() };
        let mut repo = MockIncidentRepository::new();
        let id = open.id;
        repo.expect_update_incident_status()
            .withf(move |got, status| *got == id && status.is_terminal())
            .times(1)
            .returning(move |_, _| Ok(returned.clone()));

        let updated = service(repo, MockObjectStorage::new()).resolve(&open).await.unwrap();
        assert!(updated.is_resolved());
        assert_eq!(resolve_control(&updated), ResolveControl::AlreadyResolved);
    }
}
