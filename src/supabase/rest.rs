//! Row access through the PostgREST endpoint

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde::Serialize;
use uuid::Uuid;

use super::SupabaseBackend;
use crate::error::{Result, ZestyError};
use crate::models::{
    Incident, IncidentQuery, IncidentStatus, Message, NewIncident, NewMessage, Profile, Shift, Table,
};
use crate::repository::{IncidentRepository, MessageRepository, ProfileRepository, ShiftRepository};

const RETURN_ROWS: &str = "return=representation";
const UPSERT: &str = "resolution=merge-duplicates,return=representation";

/// PostgREST filter parameters for an incident query
pub fn incident_params(query: &IncidentQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("select", "*".to_string()), ("order", "created_at.desc".to_string())];
    if let Some(status) = &query.exclude_status {
        params.push(("status", format!("neq.{status}")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit", limit.to_string()));
    }
    params
}

fn eq(id: Uuid) -> String {
    format!("eq.{id}")
}

fn first<T>(rows: Vec<T>, what: &str) -> Result<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| ZestyError::NotFound(what.to_string()))
}

impl SupabaseBackend {
    async fn select<T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        table: Table,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let request = self.client.request(Method::GET, self.client.rest_url(table.name())?).query(params);
        self.client.send_json(operation, request).await
    }

    async fn write<B: Serialize + Sync + ?Sized, T: serde::de::DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        table: Table,
        params: &[(&str, String)],
        prefer: &str,
        body: &B,
    ) -> Result<Vec<T>> {
        let request = self
            .client
            .request(method, self.client.rest_url(table.name())?)
            .query(params)
            .header("Prefer", prefer)
            .json(body);
        self.client.send_json(operation, request).await
    }
}

#[async_trait]
impl IncidentRepository for SupabaseBackend {
    async fn list_incidents(&self, query: &IncidentQuery) -> Result<Vec<Incident>> {
        self.select("list_incidents", Table::Incidents, &incident_params(query)).await
    }

    async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>> {
        let rows: Vec<Incident> = self
            .select("get_incident", Table::Incidents, &[("select", "*".to_string()), ("id", eq(id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_incident(&self, incident: &NewIncident) -> Result<Incident> {
        let rows = self
            .write("insert_incident", Method::POST, Table::Incidents, &[], RETURN_ROWS, incident)
            .await?;
        first(rows, "inserted incident")
    }

    async fn update_incident_status(&self, id: Uuid, status: &IncidentStatus) -> Result<Incident> {
        #[derive(Serialize)]
        struct StatusPatch<'a> {
            status: &'a IncidentStatus,
        }

        let rows = self
            .write(
                "update_incident_status",
                Method::PATCH,
                Table::Incidents,
                &[("id", eq(id))],
                RETURN_ROWS,
                &StatusPatch { status },
            )
            .await?;
        first(rows, &format!("incident {id}"))
    }
}

#[async_trait]
impl ProfileRepository for SupabaseBackend {
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        let rows: Vec<Profile> = self
            .select("get_profile", Table::Profiles, &[("select", "*".to_string()), ("id", eq(id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.select(
            "list_profiles",
            Table::Profiles,
            &[("select", "*".to_string()), ("order", "full_name.asc".to_string())],
        )
        .await
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<Profile> {
        let rows = self
            .write("upsert_profile", Method::POST, Table::Profiles, &[], UPSERT, profile)
            .await?;
        first(rows, "upserted profile")
    }
}

#[async_trait]
impl MessageRepository for SupabaseBackend {
    async fn list_messages_for(&self, user: Uuid) -> Result<Vec<Message>> {
        self.select(
            "list_messages",
            Table::Messages,
            &[
                ("select", "*".to_string()),
                ("or", format!("(sender_id.eq.{user},receiver_id.eq.{user})")),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        let rows = self
            .write("insert_message", Method::POST, Table::Messages, &[], RETURN_ROWS, message)
            .await?;
        first(rows, "inserted message")
    }
}

#[async_trait]
impl ShiftRepository for SupabaseBackend {
    async fn list_shifts(&self, profile: Uuid, from: NaiveDate, to: NaiveDate) -> Result<Vec<Shift>> {
        self.select(
            "list_shifts",
            Table::Shifts,
            &[
                ("select", "*".to_string()),
                ("profile_id", eq(profile)),
                ("shift_date", format!("gte.{from}")),
                ("shift_date", format!("lte.{to}")),
                ("order", "shift_date.asc,start_time.asc".to_string()),
            ],
        )
        .await
    }
}
