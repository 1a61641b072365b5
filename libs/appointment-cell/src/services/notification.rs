// libs/appointment-cell/src/services/notification.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    #[serde(rename = "type")]
    pub notification_type: String,
    pub message: String,
    pub read: bool,
    pub saved: bool,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(notification_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            notification_type: notification_type.into(),
            message: message.into(),
            read: false,
            saved: false,
            timestamp: Utc::now(),
        }
    }

    pub fn booked(appointment: &Appointment) -> Self {
        Self::new(
            "appointment_booked",
            format!(
                "New {} with {} on {} at {}",
                appointment.kind, appointment.patient_name, appointment.date, appointment.time
            ),
        )
    }

    pub fn rescheduled(appointment: &Appointment) -> Self {
        Self::new(
            "appointment_rescheduled",
            format!(
                "{} with {} moved to {} at {}",
                capitalize(&appointment.kind.to_string()),
                appointment.patient_name,
                appointment.date,
                appointment.time
            ),
        )
    }

    pub fn moved_away(appointment: &Appointment) -> Self {
        Self::new(
            "appointment_reassigned",
            format!(
                "{} with {} was reassigned to another professional",
                capitalize(&appointment.kind.to_string()),
                appointment.patient_name
            ),
        )
    }

    pub fn status_changed(appointment: &Appointment) -> Self {
        Self::new(
            "appointment_status",
            format!(
                "{} with {} on {} at {} is now {}",
                capitalize(&appointment.kind.to_string()),
                appointment.patient_name,
                appointment.date,
                appointment.time,
                appointment.status
            ),
        )
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Per-professional notification inbox.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, professional_id: Uuid, notification: Notification) -> Result<(), AppointmentError>;
}

pub struct SupabaseNotificationSink {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseNotificationSink {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }
}

#[async_trait]
impl NotificationSink for SupabaseNotificationSink {
    async fn notify(&self, professional_id: Uuid, notification: Notification) -> Result<(), AppointmentError> {
        debug!("Sending {} notification to professional {}", notification.notification_type, professional_id);

        let body = json!({
            "professional_id": professional_id,
            "type": notification.notification_type,
            "message": notification.message,
            "read": notification.read,
            "saved": notification.saved,
            "timestamp": notification.timestamp.to_rfc3339(),
        });

        let _: Vec<Value> = self.supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/notifications",
                None,
                Some(body),
                Some(SupabaseClient::return_representation()),
            )
            .await
            .map_err(|e| AppointmentError::PersistenceError(e.to_string()))?;

        Ok(())
    }
}

/// Keeps every notification in memory, keyed by recipient.
#[derive(Default)]
pub struct InMemoryNotificationSink {
    sent: RwLock<Vec<(Uuid, Notification)>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent_to(&self, professional_id: Uuid) -> Vec<Notification> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|(recipient, _)| *recipient == professional_id)
            .map(|(_, notification)| notification.clone())
            .collect()
    }

    pub async fn total_sent(&self) -> usize {
        self.sent.read().await.len()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify(&self, professional_id: Uuid, notification: Notification) -> Result<(), AppointmentError> {
        self.sent.write().await.push((professional_id, notification));
        Ok(())
    }
}
