//! Colleague directory

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Profile;
use crate::repository::ProfileRepository;

/// Department heading for profiles without one
pub const NO_DEPARTMENT: &str = "Other";

/// Case-insensitive substring search over name, role, department and email.
///
/// `me` is excluded. An empty query matches everyone. Sorted by name.
#[must_use]
pub fn search(profiles: &[Profile], me: Option<Uuid>, query: &str) -> Vec<Profile> {
    let needle = query.trim().to_lowercase();
    let mut hits: Vec<Profile> = profiles
        .iter()
        .filter(|p| Some(p.id) != me)
        .filter(|p| needle.is_empty() || matches(p, &needle))
        .cloned()
        .collect();
    hits.sort_by_cached_key(|p| (p.full_name.to_lowercase(), p.id));
    hits
}

fn matches(profile: &Profile, needle: &str) -> bool {
    std::iter::once(profile.full_name.as_str())
        .chain(profile.role.as_deref())
        .chain(profile.department.as_deref())
        .chain(profile.email.as_deref())
        .any(|field| field.to_lowercase().contains(needle))
}

/// Group already-sorted profiles under their department
#[must_use]
pub fn by_department(profiles: &[Profile]) -> BTreeMap<String, Vec<Profile>> {
    let mut groups: BTreeMap<String, Vec<Profile>> = BTreeMap::new();
    for profile in profiles {
        let department = profile
            .department
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(NO_DEPARTMENT);
        groups.entry(department.to_string()).or_default().push(profile.clone());
    }
    groups
}

/// A directory card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColleagueCard {
    pub id: Uuid,
    pub name: String,
    pub initials: String,
    pub role: Option<String>,
    pub department: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<&Profile> for ColleagueCard {
    fn from(profile: &Profile) -> Self {
        Self {
            id: profile.id,
            name: profile.full_name.clone(),
            initials: profile.initials(),
            role: profile.role.clone(),
            department: profile.department.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
        }
    }
}

/// Headline numbers above the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
    pub total_staff: usize,
    pub departments: usize,
}

#[derive(Clone)]
pub struct DirectoryService {
    profiles: Arc<dyn ProfileRepository>,
}

impl DirectoryService {
    pub fn new(profiles: Arc<dyn ProfileRepository>) -> Self {
        Self { profiles }
    }

    /// Colleagues matching `query`, excluding `me`
    pub async fn colleagues(&self, me: Option<Uuid>, query: &str) -> Result<Vec<ColleagueCard>> {
        let profiles = self.profiles.list_profiles().await?;
        Ok(search(&profiles, me, query).iter().map(ColleagueCard::from).collect())
    }

    pub async fn grouped(&self, me: Option<Uuid>, query: &str) -> Result<BTreeMap<String, Vec<ColleagueCard>>> {
        let profiles = self.profiles.list_profiles().await?;
        Ok(by_department(&search(&profiles, me, query))
            .into_iter()
            .map(|(dept, members)| (dept, members.iter().map(ColleagueCard::from).collect()))
            .collect())
    }

    pub async fn stats(&self, me: Option<Uuid>) -> Result<DirectoryStats> {
        let profiles = search(&self.profiles.list_profiles().await?, me, "");
        Ok(DirectoryStats {
            total_staff: profiles.len(),
            departments: by_department(&profiles).len(),
        })
    }
}
