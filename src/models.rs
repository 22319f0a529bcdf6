//! Data models shared by the services, the backends and the front-end
//!
//! The authoritative schema lives in the backend; these types mirror the
//! columns the client reads and writes.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ZestyError;

/// Backend tables the client touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Incidents,
    Profiles,
    Messages,
    Shifts,
}

impl Table {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Incidents => "incidents",
            Self::Profiles => "profiles",
            Self::Messages => "messages",
            Self::Shifts => "shifts",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Incident category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Safety,
    Cleaning,
    Repair,
}

impl Category {
    pub const ALL: [Self; 3] = [Self::Safety, Self::Cleaning, Self::Repair];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Safety => "Safety",
            Self::Cleaning => "Cleaning",
            Self::Repair => "Repair",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = ZestyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ZestyError::Validation(format!("Unknown category: {s}")))
    }
}

/// Incident priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    High,
    #[default]
    Med,
    Low,
}

impl Priority {
    pub const ALL: [Self; 3] = [Self::High, Self::Med, Self::Low];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Med => "Med",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = ZestyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "med" | "medium" => Ok(Self::Med),
            "low" => Ok(Self::Low),
            _ => Err(ZestyError::Validation(format!("Unknown priority: {s}"))),
        }
    }
}

/// Free-text incident status
///
/// Only [`IncidentStatus::RESOLVED`] carries meaning: it is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentStatus(String);

impl IncidentStatus {
    pub const UNDER_REVIEW: &'static str = "Under Review";
    pub const RESOLVED: &'static str = "Resolved";

    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    /// Status stamped on every newly submitted report
    #[must_use]
    pub fn initial() -> Self {
        Self(Self::UNDER_REVIEW.to_string())
    }

    #[must_use]
    pub fn resolved() -> Self {
        Self(Self::RESOLVED.to_string())
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.0 == Self::RESOLVED
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for IncidentStatus {
    fn default() -> Self {
        Self::initial()
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reported facility issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub location: String,
    pub category: Category,
    pub priority: Priority,
    pub description: String,
    #[serde(default)]
    pub detailed_description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub status: IncidentStatus,
    #[serde(default)]
    pub reported_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Incident {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.status.is_terminal()
    }

    /// Extended description when present, otherwise the short one
    #[must_use]
    pub fn full_description(&self) -> &str {
        self.detailed_description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&self.description)
    }

    #[must_use]
    pub fn reporter_display(&self) -> &str {
        self.reported_by
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or("Staff Member")
    }
}

/// Row written by the report form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIncident {
    pub location: String,
    pub category: Category,
    pub priority: Priority,
    pub description: String,
    pub detailed_description: Option<String>,
    pub image_url: Option<String>,
    pub status: IncidentStatus,
    pub reported_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Read parameters for "list incidents"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentQuery {
    /// Skip rows whose status equals this value
    pub exclude_status: Option<IncidentStatus>,
    /// Maximum number of rows to return
    pub limit: Option<usize>,
}

impl IncidentQuery {
    /// Every incident, newest first
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Non-terminal incidents, newest first
    #[must_use]
    pub fn active() -> Self {
        Self {
            exclude_status: Some(IncidentStatus::resolved()),
            limit: None,
        }
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply the query to an in-memory slice, newest first
    #[must_use]
    pub fn apply(&self, incidents: &[Incident]) -> Vec<Incident> {
        let mut rows: Vec<Incident> = incidents
            .iter()
            .filter(|i| self.exclude_status.as_ref() != Some(&i.status))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

/// Per-user notification and display preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub incident_alerts: bool,
    pub schedule_reminders: bool,
    pub dark_mode: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            email_notifications: true,
            push_notifications: true,
            incident_alerts: true,
            schedule_reminders: true,
            dark_mode: false,
        }
    }
}

/// Staff profile, one per authenticated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Copied from the auth identity, never written back
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
}

impl Profile {
    /// Blank profile for a freshly signed-up user
    pub fn new(id: Uuid, full_name: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            role: None,
            department: None,
            phone: None,
            email: None,
            preferences: Preferences::default(),
        }
    }

    /// Up to two upper-case initials
    #[must_use]
    pub fn initials(&self) -> String {
        initials(&self.full_name)
    }
}

/// Editable profile fields from account settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub role: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
}

/// First letter of the first two words, upper-cased
#[must_use]
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}

/// A direct message between two staff members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The other party from `me`'s point of view
    #[must_use]
    pub fn counterpart(&self, me: Uuid) -> Uuid {
        if self.sender_id == me {
            self.receiver_id
        } else {
            self.sender_id
        }
    }

    #[must_use]
    pub fn involves(&self, user: Uuid) -> bool {
        self.sender_id == user || self.receiver_id == user
    }
}

/// Row written by compose and reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Client-side grouping of every message exchanged with one counterpart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub counterpart: Uuid,
    /// Oldest first
    pub messages: Vec<Message>,
}

impl Conversation {
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    #[must_use]
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_message().map(|m| m.created_at)
    }
}

/// A scheduled shift; no start time means a day off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub id: Uuid,
    pub profile_id: Uuid,
    pub shift_date: NaiveDate,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Where a shift sits relative to today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftStatus {
    Completed,
    Today,
    Upcoming,
}

impl Shift {
    #[must_use]
    pub const fn is_day_off(&self) -> bool {
        self.start_time.is_none()
    }

    #[must_use]
    pub fn status_on(&self, today: NaiveDate) -> ShiftStatus {
        match self.shift_date.cmp(&today) {
            std::cmp::Ordering::Less => ShiftStatus::Completed,
            std::cmp::Ordering::Equal => ShiftStatus::Today,
            std::cmp::Ordering::Greater => ShiftStatus::Upcoming,
        }
    }

    /// Scheduled length; shifts ending past midnight wrap into the next day
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        let (start, end) = (self.start_time?, self.end_time?);
        let span = end - start;
        if span < Duration::zero() {
            Some(span + Duration::days(1))
        } else {
            Some(span)
        }
    }
}
