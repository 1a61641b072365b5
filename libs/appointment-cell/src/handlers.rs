// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentKind, AppointmentQuery, AvailabilityQuery, BookAppointmentRequest,
    BookingSelection, IntakeBookingRequest, ReassignAppointmentRequest, StartIntakeRequest,
    UpdateStatusRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::first_visit::FirstVisitService;

/// Everything the scheduling routes share. One booking service per
/// process keeps the per-slot locks authoritative.
pub struct SchedulingState {
    pub config: AppConfig,
    pub booking: Arc<AppointmentBookingService>,
    pub first_visit: Arc<FirstVisitService>,
}

impl SchedulingState {
    pub fn new(config: AppConfig, booking: Arc<AppointmentBookingService>) -> Self {
        let first_visit = Arc::new(FirstVisitService::new(Arc::clone(&booking)));
        Self {
            config,
            booking,
            first_visit,
        }
    }

    pub fn from_config(config: AppConfig) -> Self {
        let booking = Arc::new(AppointmentBookingService::from_config(&config));
        Self::new(config, booking)
    }
}

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::SlotFull { .. } => AppError::Conflict(e.to_string()),
            AppointmentError::NotFound
            | AppointmentError::ProfessionalNotFound
            | AppointmentError::IntakeSessionNotFound => AppError::NotFound(e.to_string()),
            AppointmentError::PersistenceError(msg) => {
                AppError::ExternalService(format!("Scheduling store unavailable, please retry: {}", msg))
            }
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::InvalidStatusTransition { .. }
            | AppointmentError::IntakeOutOfOrder { .. }
            | AppointmentError::IntakeIncomplete(_) => AppError::BadRequest(e.to_string()),
        }
    }
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotQueryParams {
    pub date: NaiveDate,
    pub kind: AppointmentKind,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AppointmentQueryParams {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub professional_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

impl From<AppointmentQueryParams> for AppointmentQuery {
    fn from(params: AppointmentQueryParams) -> Self {
        AppointmentQuery {
            date_from: params.date_from,
            date_to: params.date_to,
            professional_id: params.professional_id,
            patient_id: params.patient_id,
        }
    }
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<Arc<SchedulingState>>,
    Path(professional_id): Path<Uuid>,
    Query(params): Query<SlotQueryParams>,
) -> Result<Json<Value>, AppError> {
    let query = AvailabilityQuery {
        professional_id,
        date: params.date,
        kind: params.kind,
        exclude_appointment_id: params.exclude_appointment_id,
    };

    let slots = state.booking.available_slots(&query).await?;

    Ok(Json(json!({
        "success": true,
        "professional_id": professional_id,
        "date": params.date,
        "kind": params.kind,
        "slots": slots,
    })))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<SchedulingState>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = state.booking.book_appointment(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": appointment,
            "message": "Appointment booked successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<SchedulingState>>,
    Query(params): Query<AppointmentQueryParams>,
) -> Result<Json<Value>, AppError> {
    let appointments = state.booking.list_appointments(&params.into()).await?;

    Ok(Json(json!({
        "success": true,
        "total": appointments.len(),
        "appointments": appointments,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.get_appointment(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn reassign_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<ReassignAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.reassign_appointment(appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment reassigned successfully"
    })))
}

#[axum::debug_handler]
pub async fn update_status(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.update_status(appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

// ==============================================================================
// FIRST-VISIT INTAKE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn start_intake(
    State(state): State<Arc<SchedulingState>>,
    Json(request): Json<StartIntakeRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let session = state.first_visit.start_intake(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "session": session,
            "next_kind": session.active_kind(),
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_intake(
    State(state): State<Arc<SchedulingState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = state.first_visit.get_session(session_id).await?;

    Ok(Json(json!({
        "success": true,
        "session": session,
        "next_kind": session.active_kind(),
    })))
}

#[axum::debug_handler]
pub async fn update_intake_selection(
    State(state): State<Arc<SchedulingState>>,
    Path(session_id): Path<Uuid>,
    Json(selection): Json<BookingSelection>,
) -> Result<Json<Value>, AppError> {
    let session = state.first_visit.update_selection(session_id, selection).await?;

    Ok(Json(json!({
        "success": true,
        "session": session,
    })))
}

#[axum::debug_handler]
pub async fn list_intake_slots(
    State(state): State<Arc<SchedulingState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let slots = state.first_visit.available_slots(session_id).await?;

    Ok(Json(json!({
        "success": true,
        "slots": slots,
    })))
}

#[axum::debug_handler]
pub async fn book_intake(
    State(state): State<Arc<SchedulingState>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<IntakeBookingRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let outcome = state.first_visit.book(session_id, request).await?;

    let message = match outcome.session.active_kind() {
        Some(next) => format!("{} booked, now choose the {}", outcome.appointment.kind, next),
        None => "First visit fully booked".to_string(),
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": outcome.appointment,
            "session": outcome.session,
            "message": message,
        })),
    ))
}

#[axum::debug_handler]
pub async fn dismiss_intake(
    State(state): State<Arc<SchedulingState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = state.first_visit.dismiss(session_id).await?;

    Ok(Json(json!({
        "success": true,
        "session": session,
        "message": "First visit completed"
    })))
}

#[axum::debug_handler]
pub async fn abandon_intake(
    State(state): State<Arc<SchedulingState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = state.first_visit.abandon(session_id).await?;

    Ok(Json(json!({
        "success": true,
        "session": session,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntakeStage, SlotTime};

    #[test]
    fn test_error_mapping() {
        let full = AppointmentError::SlotFull {
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            time: SlotTime::from_hm(9, 0).unwrap(),
        };
        assert_eq!(AppError::from(full).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::from(AppointmentError::NotFound).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::from(AppointmentError::PersistenceError("timeout".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::from(AppointmentError::IntakeIncomplete(IntakeStage::AwaitingTherapy)).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
