// libs/appointment-cell/src/services/first_visit.rs
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentKind, AvailabilityQuery, BookingChannel,
    BookingSelection, IntakeBookingRequest, IntakeStage, SlotDescriptor, StartIntakeRequest,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::clock::Clock;

/// One new patient's pass through the two required bookings. Lives only
/// in memory for the duration of the intake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntakeSession {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub stage: IntakeStage,
    pub selection: BookingSelection,
    pub consultation_appointment_id: Option<Uuid>,
    pub therapy_appointment_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
}

impl IntakeSession {
    pub fn new(patient_id: Uuid, patient_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            patient_name: patient_name.into(),
            stage: IntakeStage::AwaitingConsultation,
            selection: BookingSelection::default(),
            consultation_appointment_id: None,
            therapy_appointment_id: None,
            started_at: Utc::now(),
        }
    }

    /// The kind the date picker is currently booking.
    pub fn active_kind(&self) -> Option<AppointmentKind> {
        self.stage.expected_kind()
    }

    pub fn is_complete(&self) -> bool {
        self.stage == IntakeStage::Complete
    }

    pub fn ensure_can_book(&self, requested: AppointmentKind) -> Result<(), AppointmentError> {
        match self.active_kind() {
            Some(expected) if expected == requested => Ok(()),
            expected => Err(AppointmentError::IntakeOutOfOrder { expected, requested }),
        }
    }

    pub fn update_selection(&mut self, selection: &BookingSelection) {
        self.selection.merge(selection);
    }

    /// Advance after a successful booking. A consultation switches the
    /// picker to therapy on the same date with time and professional cleared.
    pub fn record_booking(&mut self, appointment: &Appointment) {
        match (self.stage, appointment.kind) {
            (IntakeStage::AwaitingConsultation, AppointmentKind::Consultation) => {
                self.consultation_appointment_id = Some(appointment.id);
                self.stage = IntakeStage::AwaitingTherapy;
                self.selection = BookingSelection {
                    date: Some(appointment.date),
                    professional_id: None,
                    time: None,
                };
            }
            (IntakeStage::AwaitingTherapy, AppointmentKind::Therapy) => {
                self.therapy_appointment_id = Some(appointment.id);
                self.stage = IntakeStage::Complete;
            }
            (stage, kind) => {
                warn!("Ignoring {} booking {} for intake {} in stage {}", kind, appointment.id, self.id, stage);
            }
        }
    }

    pub fn ensure_dismissable(&self) -> Result<(), AppointmentError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(AppointmentError::IntakeIncomplete(self.stage))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeBookingOutcome {
    pub appointment: Appointment,
    pub session: IntakeSession,
}

/// Sessions nobody has touched to completion or dismissal within this
/// window are dropped the next time an intake starts.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 12;

/// Drives first-visit intakes on top of the booking service.
pub struct FirstVisitService {
    booking: Arc<AppointmentBookingService>,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<IntakeSession>>>>,
    session_ttl: Duration,
}

impl FirstVisitService {
    pub fn new(booking: Arc<AppointmentBookingService>) -> Self {
        Self {
            booking,
            sessions: RwLock::new(HashMap::new()),
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        }
    }

    pub fn with_session_ttl(mut self, session_ttl: Duration) -> Self {
        self.session_ttl = session_ttl;
        self
    }

    pub async fn start_intake(&self, request: StartIntakeRequest) -> Result<IntakeSession, AppointmentError> {
        if request.patient_name.trim().is_empty() {
            return Err(AppointmentError::ValidationError("Patient name is required".to_string()));
        }

        let now = self.booking.clock().utc();
        let mut session = IntakeSession::new(request.patient_id, request.patient_name.trim());
        session.selection.date = request.date;
        session.started_at = now;

        info!("Starting first-visit intake {} for patient {}", session.id, session.patient_id);
        let mut sessions = self.sessions.write().await;
        prune_expired(&mut sessions, now - self.session_ttl);
        sessions.insert(session.id, Arc::new(Mutex::new(session.clone())));

        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<IntakeSession, AppointmentError> {
        let entry = self.entry(session_id).await?;
        let session = entry.lock().await;
        Ok(session.clone())
    }

    pub async fn update_selection(
        &self,
        session_id: Uuid,
        selection: BookingSelection,
    ) -> Result<IntakeSession, AppointmentError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;
        session.update_selection(&selection);
        Ok(session.clone())
    }

    /// Slots for the active kind on the selected professional and date.
    pub async fn available_slots(&self, session_id: Uuid) -> Result<Vec<SlotDescriptor>, AppointmentError> {
        let session = self.get_session(session_id).await?;
        let kind = session
            .active_kind()
            .ok_or_else(|| AppointmentError::ValidationError("Both first-visit appointments are already booked".to_string()))?;
        let professional_id = session
            .selection
            .professional_id
            .ok_or_else(|| AppointmentError::ValidationError("Select a professional first".to_string()))?;
        let date = session
            .selection
            .date
            .ok_or_else(|| AppointmentError::ValidationError("Select a date first".to_string()))?;

        self.booking
            .available_slots(&AvailabilityQuery {
                professional_id,
                date,
                kind,
                exclude_appointment_id: None,
            })
            .await
    }

    /// Book the next required appointment. The session is held for the
    /// whole booking, so one intake never commits twice for the same stage.
    #[instrument(skip(self, request))]
    pub async fn book(
        &self,
        session_id: Uuid,
        request: IntakeBookingRequest,
    ) -> Result<IntakeBookingOutcome, AppointmentError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;

        let kind = match request.kind {
            Some(kind) => kind,
            None => session.active_kind().ok_or_else(|| {
                AppointmentError::ValidationError("Both first-visit appointments are already booked".to_string())
            })?,
        };
        session.ensure_can_book(kind)?;
        session.update_selection(&request.selection);

        let mut booking_request = BookingChannel::FirstVisit.request(session.patient_id, session.patient_name.clone());
        booking_request.kind = Some(kind);
        booking_request.professional_id = session.selection.professional_id;
        booking_request.date = session.selection.date;
        booking_request.time = session.selection.time;

        let appointment = self.booking.book_appointment(booking_request).await?;
        session.record_booking(&appointment);

        info!("Intake {} booked {} {}, now {}", session.id, kind, appointment.id, session.stage);
        Ok(IntakeBookingOutcome {
            appointment,
            session: session.clone(),
        })
    }

    /// Close a finished intake. Earlier stages are refused.
    pub async fn dismiss(&self, session_id: Uuid) -> Result<IntakeSession, AppointmentError> {
        let entry = self.entry(session_id).await?;
        let session = entry.lock().await;
        session.ensure_dismissable()?;

        self.sessions.write().await.remove(&session_id);
        info!("Intake {} for patient {} dismissed", session.id, session.patient_id);
        Ok(session.clone())
    }

    /// Drop the session in any stage. Bookings already made are kept.
    pub async fn abandon(&self, session_id: Uuid) -> Result<IntakeSession, AppointmentError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(&session_id)
            .ok_or(AppointmentError::IntakeSessionNotFound)?;
        let session = entry.lock().await.clone();

        if session.stage == IntakeStage::AwaitingTherapy {
            info!("Intake {} abandoned with consultation {:?} booked and no therapy",
                  session.id, session.consultation_appointment_id);
        } else {
            info!("Intake {} abandoned in stage {}", session.id, session.stage);
        }
        Ok(session)
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn entry(&self, session_id: Uuid) -> Result<Arc<Mutex<IntakeSession>>, AppointmentError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(AppointmentError::IntakeSessionNotFound)
    }
}

/// Drops sessions started before `cutoff`. A session whose mutex is held
/// is mid-request and kept.
fn prune_expired(sessions: &mut HashMap<Uuid, Arc<Mutex<IntakeSession>>>, cutoff: DateTime<Utc>) {
    let before = sessions.len();
    sessions.retain(|_, entry| match entry.try_lock() {
        Ok(session) => session.started_at >= cutoff,
        Err(_) => true,
    });

    let pruned = before - sessions.len();
    if pruned > 0 {
        info!("Pruned {} expired first-visit intakes", pruned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Professional, SlotTime};
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    fn booked(session: &IntakeSession, kind: AppointmentKind) -> Appointment {
        let professional = match kind {
            AppointmentKind::Consultation => Professional::doctor(Uuid::new_v4(), "Dr. Ana", Some(60)),
            AppointmentKind::Therapy => Professional::therapist(Uuid::new_v4(), "Rui"),
        };
        Appointment::scheduled(
            session.patient_id,
            session.patient_name.clone(),
            &professional,
            kind,
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            SlotTime::from_hm(9, 0).unwrap(),
        )
    }

    #[test]
    fn test_new_session_awaits_consultation() {
        let session = IntakeSession::new(Uuid::new_v4(), "Maria");
        assert_eq!(session.stage, IntakeStage::AwaitingConsultation);
        assert_eq!(session.active_kind(), Some(AppointmentKind::Consultation));
    }

    #[test]
    fn test_therapy_before_consultation_is_rejected() {
        let session = IntakeSession::new(Uuid::new_v4(), "Maria");
        assert_matches!(
            session.ensure_can_book(AppointmentKind::Therapy),
            Err(AppointmentError::IntakeOutOfOrder {
                expected: Some(AppointmentKind::Consultation),
                requested: AppointmentKind::Therapy,
            })
        );
    }

    #[test]
    fn test_consultation_switches_picker_to_therapy() {
        let mut session = IntakeSession::new(Uuid::new_v4(), "Maria");
        session.update_selection(&BookingSelection {
            date: NaiveDate::from_ymd_opt(2024, 6, 10),
            professional_id: Some(Uuid::new_v4()),
            time: SlotTime::from_hm(9, 0),
        });

        let consultation = booked(&session, AppointmentKind::Consultation);
        session.record_booking(&consultation);

        assert_eq!(session.stage, IntakeStage::AwaitingTherapy);
        assert_eq!(session.consultation_appointment_id, Some(consultation.id));
        assert_eq!(session.selection.date, Some(consultation.date));
        assert!(session.selection.professional_id.is_none());
        assert!(session.selection.time.is_none());
        assert!(session.ensure_can_book(AppointmentKind::Therapy).is_ok());
    }

    #[test]
    fn test_dismiss_only_when_complete() {
        let mut session = IntakeSession::new(Uuid::new_v4(), "Maria");
        assert_matches!(
            session.ensure_dismissable(),
            Err(AppointmentError::IntakeIncomplete(IntakeStage::AwaitingConsultation))
        );

        session.record_booking(&booked(&session, AppointmentKind::Consultation));
        assert_matches!(
            session.ensure_dismissable(),
            Err(AppointmentError::IntakeIncomplete(IntakeStage::AwaitingTherapy))
        );

        session.record_booking(&booked(&session, AppointmentKind::Therapy));
        assert!(session.is_complete());
        assert!(session.ensure_dismissable().is_ok());
    }

    #[test]
    fn test_complete_session_accepts_no_more_bookings() {
        let mut session = IntakeSession::new(Uuid::new_v4(), "Maria");
        session.record_booking(&booked(&session, AppointmentKind::Consultation));
        session.record_booking(&booked(&session, AppointmentKind::Therapy));

        assert_matches!(
            session.ensure_can_book(AppointmentKind::Consultation),
            Err(AppointmentError::IntakeOutOfOrder { expected: None, .. })
        );
    }

    #[tokio::test]
    async fn test_prune_drops_only_stale_idle_sessions() {
        let now = Utc::now();
        let mut sessions = HashMap::new();

        let mut stale = IntakeSession::new(Uuid::new_v4(), "Old");
        stale.started_at = now - Duration::hours(13);
        let mut busy = IntakeSession::new(Uuid::new_v4(), "Busy");
        busy.started_at = now - Duration::hours(13);
        let fresh = IntakeSession::new(Uuid::new_v4(), "New");

        let (stale_id, busy_id, fresh_id) = (stale.id, busy.id, fresh.id);
        let busy_entry = Arc::new(Mutex::new(busy));
        sessions.insert(stale_id, Arc::new(Mutex::new(stale)));
        sessions.insert(busy_id, Arc::clone(&busy_entry));
        sessions.insert(fresh_id, Arc::new(Mutex::new(fresh)));

        let _held = busy_entry.lock().await;
        prune_expired(&mut sessions, now - Duration::hours(DEFAULT_SESSION_TTL_HOURS));

        assert!(!sessions.contains_key(&stale_id));
        assert!(sessions.contains_key(&busy_id));
        assert!(sessions.contains_key(&fresh_id));
    }

    #[test]
    fn test_out_of_order_booking_does_not_advance() {
        let mut session = IntakeSession::new(Uuid::new_v4(), "Maria");
        session.record_booking(&booked(&session, AppointmentKind::Therapy));
        assert_eq!(session.stage, IntakeStage::AwaitingConsultation);
        assert!(session.therapy_appointment_id.is_none());
    }
}
