// libs/appointment-cell/src/services/memory_store.rs
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentPatch, AppointmentQuery, Professional};
use crate::services::store::AppointmentStore;

pub const DEMO_DOCTOR_ID: Uuid = Uuid::from_u128(0x6d0c_7a11_0000_4000_8000_0000_0000_0001);
pub const DEMO_THERAPIST_ID: Uuid = Uuid::from_u128(0x6d0c_7a11_0000_4000_8000_0000_0000_0002);

/// Roster used for local runs when no professionals are configured.
pub fn demo_roster() -> Vec<Professional> {
    vec![
        Professional::doctor(DEMO_DOCTOR_ID, "Dr. Demo", Some(60)),
        Professional::therapist(DEMO_THERAPIST_ID, "Demo Therapist"),
    ]
}

/// Professionals from a JSON array, or the demo roster when none are given
/// or the value does not parse.
pub fn seed_roster(raw: Option<&str>) -> Vec<Professional> {
    let Some(raw) = raw else {
        info!("No seed professionals configured, using the demo roster");
        return demo_roster();
    };

    match serde_json::from_str::<Vec<Professional>>(raw) {
        Ok(professionals) if !professionals.is_empty() => professionals,
        Ok(_) => {
            warn!("SCHEDULING_SEED_PROFESSIONALS is an empty list, using the demo roster");
            demo_roster()
        }
        Err(e) => {
            warn!("SCHEDULING_SEED_PROFESSIONALS is not a valid professional list ({}), using the demo roster", e);
            demo_roster()
        }
    }
}

/// In-process store for local runs and tests.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    professionals: RwLock<HashMap<Uuid, Professional>>,
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_professionals(professionals: impl IntoIterator<Item = Professional>) -> Self {
        let professionals = professionals.into_iter().map(|p| (p.id, p)).collect();
        Self {
            professionals: RwLock::new(professionals),
            appointments: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_professional(&self, professional: Professional) {
        self.professionals.write().await.insert(professional.id, professional);
    }

    /// Seeds a document directly, bypassing every scheduling rule.
    pub async fn seed_appointment(&self, appointment: Appointment) {
        self.appointments.write().await.insert(appointment.id, appointment);
    }

    pub async fn appointment_count(&self) -> usize {
        self.appointments.read().await.len()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn find_professional(&self, professional_id: Uuid) -> Result<Option<Professional>, AppointmentError> {
        Ok(self.professionals.read().await.get(&professional_id).cloned())
    }

    async fn get_appointment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.read().await.get(&appointment_id).cloned())
    }

    async fn list_appointments(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let mut appointments: Vec<Appointment> = self.appointments
            .read()
            .await
            .values()
            .filter(|appointment| query.matches(appointment))
            .cloned()
            .collect();
        appointments.sort_by_key(|a| (a.date, a.time, a.created_at));
        Ok(appointments)
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        if appointments.contains_key(&appointment.id) {
            return Err(AppointmentError::PersistenceError(format!(
                "Appointment {} already exists",
                appointment.id
            )));
        }
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment.clone())
    }

    async fn update_appointment(
        &self,
        appointment_id: Uuid,
        patch: &AppointmentPatch,
    ) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;
        let appointment = appointments
            .get_mut(&appointment_id)
            .ok_or(AppointmentError::NotFound)?;

        let mut patch = patch.clone();
        patch.updated_at = Some(Utc::now());
        patch.apply_to(appointment);
        Ok(appointment.clone())
    }
}
