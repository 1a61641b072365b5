use std::sync::Arc;
use serde_json::json;
use uuid::Uuid;

use shared_config::{AppConfig, StoreBackend};

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub store_backend: StoreBackend,
    pub too_soon_minutes: i64,
    pub count_no_show: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            store_backend: StoreBackend::Memory,
            too_soon_minutes: 30,
            count_no_show: true,
        }
    }
}

impl TestConfig {
    /// Config pointing the Supabase store at a mock server.
    pub fn supabase(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            store_backend: StoreBackend::Supabase,
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            store_backend: self.store_backend,
            too_soon_minutes: self.too_soon_minutes,
            default_consultation_minutes: 60,
            count_no_show: self.count_no_show,
            seed_professionals: None,
            port: 0,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// Rows shaped like the hosted store returns them.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_row(doctor_id: &str, consultation_minutes: serde_json::Value) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "kind": "doctor",
            "display_name": "Dr. Test Doctor",
            "consultation_duration_minutes": consultation_minutes
        })
    }

    pub fn therapist_row(therapist_id: &str) -> serde_json::Value {
        json!({
            "id": therapist_id,
            "kind": "therapist",
            "display_name": "Test Therapist",
            "consultation_duration_minutes": null
        })
    }

    pub fn appointment_row(
        professional_id: &str,
        professional_kind: &str,
        kind: &str,
        date: &str,
        time: &str,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "patient_id": Uuid::new_v4(),
            "patient_name": "Test Patient",
            "professional_id": professional_id,
            "professional_kind": professional_kind,
            "kind": kind,
            "date": date,
            "time": time,
            "status": status,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn notification_row(professional_id: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "professional_id": professional_id,
            "type": "appointment_booked",
            "message": "New appointment",
            "read": false,
            "saved": false,
            "timestamp": "2024-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
