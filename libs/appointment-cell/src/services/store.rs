// libs/appointment-cell/src/services/store.rs
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentPatch, AppointmentQuery, Professional};

/// The hosted document store the scheduler reads from and writes to.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn find_professional(&self, professional_id: Uuid) -> Result<Option<Professional>, AppointmentError>;

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    async fn list_appointments(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, AppointmentError>;

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError>;

    async fn update_appointment(
        &self,
        appointment_id: Uuid,
        patch: &AppointmentPatch,
    ) -> Result<Appointment, AppointmentError>;
}

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn build_list_path(query: &AppointmentQuery) -> String {
        let mut query_parts = vec!["select=*".to_string()];

        if let Some(from) = query.date_from {
            query_parts.push(format!("date=gte.{}", from.format("%Y-%m-%d")));
        }
        if let Some(to) = query.date_to {
            query_parts.push(format!("date=lte.{}", to.format("%Y-%m-%d")));
        }
        if let Some(professional_id) = query.professional_id {
            query_parts.push(format!("professional_id=eq.{}", professional_id));
        }
        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        query_parts.push("order=date.asc,time.asc".to_string());

        format!("/rest/v1/appointments?{}", query_parts.join("&"))
    }

    fn parse_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>, what: &str) -> Result<Vec<T>, AppointmentError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| {
                error!("Failed to parse {} rows: {}", what, e);
                AppointmentError::PersistenceError(format!("Failed to parse {}: {}", what, e))
            })
    }

    fn first_row(rows: Vec<Value>, what: &str) -> Result<Appointment, AppointmentError> {
        Self::parse_rows::<Appointment>(rows, what)?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::PersistenceError(format!("Store returned no row for {}", what)))
    }
}

fn persistence(e: anyhow::Error) -> AppointmentError {
    AppointmentError::PersistenceError(e.to_string())
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn find_professional(&self, professional_id: Uuid) -> Result<Option<Professional>, AppointmentError> {
        debug!("Fetching professional: {}", professional_id);

        let path = format!("/rest/v1/professionals?id=eq.{}", professional_id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(persistence)?;

        Ok(Self::parse_rows::<Professional>(rows, "professional")?.into_iter().next())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(persistence)?;

        Ok(Self::parse_rows::<Appointment>(rows, "appointment")?.into_iter().next())
    }

    async fn list_appointments(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments with filters: {:?}", query);

        let path = Self::build_list_path(query);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(persistence)?;

        Self::parse_rows(rows, "appointments")
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError> {
        debug!("Inserting appointment {} for professional {}", appointment.id, appointment.professional_id);

        let body = serde_json::to_value(appointment)
            .map_err(|e| AppointmentError::PersistenceError(format!("Failed to encode appointment: {}", e)))?;

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(persistence)?;

        Self::first_row(rows, "created appointment")
    }

    async fn update_appointment(
        &self,
        appointment_id: Uuid,
        patch: &AppointmentPatch,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment {}: {:?}", appointment_id, patch);

        let mut patch = patch.clone();
        patch.updated_at = Some(Utc::now());
        let body = serde_json::to_value(&patch)
            .map_err(|e| AppointmentError::PersistenceError(format!("Failed to encode update: {}", e)))?;

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(persistence)?;

        if rows.is_empty() {
            return Err(AppointmentError::NotFound);
        }

        Self::first_row(rows, "updated appointment")
    }
}
