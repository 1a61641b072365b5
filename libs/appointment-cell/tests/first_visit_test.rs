use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentError, AppointmentKind, AppointmentQuery, BookingSelection, IntakeBookingRequest,
    IntakeStage, Professional, SchedulingPolicy, SlotTime, StartIntakeRequest,
};
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::clock::FixedClock;
use appointment_cell::services::first_visit::FirstVisitService;
use appointment_cell::services::memory_store::InMemoryAppointmentStore;
use appointment_cell::services::notification::InMemoryNotificationSink;

struct TestIntake {
    first_visit: FirstVisitService,
    clock: Arc<FixedClock>,
    booking: Arc<AppointmentBookingService>,
    doctor: Professional,
    therapist: Professional,
}

fn intake_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

fn slot(raw: &str) -> SlotTime {
    raw.parse().unwrap()
}

fn setup() -> TestIntake {
    let doctor = Professional::doctor(Uuid::new_v4(), "Dr. Lima", Some(60));
    let therapist = Professional::therapist(Uuid::new_v4(), "Rita");
    let store = Arc::new(InMemoryAppointmentStore::with_professionals([doctor.clone(), therapist.clone()]));
    let clock = Arc::new(FixedClock::new(slot("09:00").on(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())));

    let booking = Arc::new(
        AppointmentBookingService::new(store, Arc::new(InMemoryNotificationSink::new()), SchedulingPolicy::default())
            .with_clock(clock.clone()),
    );

    TestIntake {
        first_visit: FirstVisitService::new(Arc::clone(&booking)),
        clock,
        booking,
        doctor,
        therapist,
    }
}

fn start(patient_id: Uuid) -> StartIntakeRequest {
    StartIntakeRequest {
        patient_id,
        patient_name: "Carla Nunes".to_string(),
        date: Some(intake_day()),
    }
}

fn pick(professional: &Professional, time: &str) -> IntakeBookingRequest {
    IntakeBookingRequest {
        kind: None,
        selection: BookingSelection {
            date: None,
            professional_id: Some(professional.id),
            time: Some(slot(time)),
        },
    }
}

#[tokio::test]
async fn test_therapy_before_consultation_is_rejected_by_workflow() {
    let intake = setup();
    let session = intake.first_visit.start_intake(start(Uuid::new_v4())).await.unwrap();

    let mut early_therapy = pick(&intake.therapist, "10:00");
    early_therapy.kind = Some(AppointmentKind::Therapy);

    let result = intake.first_visit.book(session.id, early_therapy).await;
    assert_matches!(
        result,
        Err(AppointmentError::IntakeOutOfOrder {
            expected: Some(AppointmentKind::Consultation),
            requested: AppointmentKind::Therapy,
        })
    );

    let all = intake.booking.list_appointments(&AppointmentQuery::default()).await.unwrap();
    assert!(all.is_empty());
}

#[tokio::test]
async fn test_full_intake_books_consultation_then_therapy() {
    let intake = setup();
    let patient_id = Uuid::new_v4();
    let session = intake.first_visit.start_intake(start(patient_id)).await.unwrap();
    assert_eq!(session.stage, IntakeStage::AwaitingConsultation);

    let consultation = intake.first_visit.book(session.id, pick(&intake.doctor, "09:00")).await.unwrap();
    assert_eq!(consultation.appointment.kind, AppointmentKind::Consultation);
    assert_eq!(consultation.appointment.date, intake_day());
    assert_eq!(consultation.session.stage, IntakeStage::AwaitingTherapy);
    assert_eq!(consultation.session.selection.date, Some(intake_day()));
    assert!(consultation.session.selection.time.is_none());
    assert!(consultation.session.selection.professional_id.is_none());

    let therapy = intake.first_visit.book(session.id, pick(&intake.therapist, "10:00")).await.unwrap();
    assert_eq!(therapy.appointment.kind, AppointmentKind::Therapy);
    assert_eq!(therapy.session.stage, IntakeStage::Complete);

    let booked = intake.booking
        .list_appointments(&AppointmentQuery {
            patient_id: Some(patient_id),
            ..AppointmentQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(booked.len(), 2);

    let dismissed = intake.first_visit.dismiss(session.id).await.unwrap();
    assert!(dismissed.is_complete());
    assert_matches!(
        intake.first_visit.get_session(session.id).await,
        Err(AppointmentError::IntakeSessionNotFound)
    );
}

#[tokio::test]
async fn test_dismiss_before_complete_is_refused() {
    let intake = setup();
    let session = intake.first_visit.start_intake(start(Uuid::new_v4())).await.unwrap();

    assert_matches!(
        intake.first_visit.dismiss(session.id).await,
        Err(AppointmentError::IntakeIncomplete(IntakeStage::AwaitingConsultation))
    );

    intake.first_visit.book(session.id, pick(&intake.doctor, "09:00")).await.unwrap();
    assert_matches!(
        intake.first_visit.dismiss(session.id).await,
        Err(AppointmentError::IntakeIncomplete(IntakeStage::AwaitingTherapy))
    );

    // Still open after both refusals
    assert_eq!(intake.first_visit.get_session(session.id).await.unwrap().stage, IntakeStage::AwaitingTherapy);
}

#[tokio::test]
async fn test_abandon_keeps_the_consultation() {
    let intake = setup();
    let patient_id = Uuid::new_v4();
    let session = intake.first_visit.start_intake(start(patient_id)).await.unwrap();

    let consultation = intake.first_visit.book(session.id, pick(&intake.doctor, "11:00")).await.unwrap();
    let abandoned = intake.first_visit.abandon(session.id).await.unwrap();

    assert_eq!(abandoned.stage, IntakeStage::AwaitingTherapy);
    assert_eq!(abandoned.consultation_appointment_id, Some(consultation.appointment.id));
    assert_eq!(intake.first_visit.active_sessions().await, 0);

    let kept = intake.booking.get_appointment(consultation.appointment.id).await.unwrap();
    assert_eq!(kept.patient_id, patient_id);
}

#[tokio::test]
async fn test_failed_booking_leaves_stage_unchanged() {
    let intake = setup();

    let first = intake.first_visit.start_intake(start(Uuid::new_v4())).await.unwrap();
    intake.first_visit.book(first.id, pick(&intake.doctor, "09:00")).await.unwrap();

    let second = intake.first_visit.start_intake(start(Uuid::new_v4())).await.unwrap();
    let clash = intake.first_visit.book(second.id, pick(&intake.doctor, "09:00")).await;
    assert_matches!(clash, Err(AppointmentError::SlotFull { .. }));

    let session = intake.first_visit.get_session(second.id).await.unwrap();
    assert_eq!(session.stage, IntakeStage::AwaitingConsultation);
    assert!(session.consultation_appointment_id.is_none());
}

#[tokio::test]
async fn test_session_slots_follow_active_kind() {
    let intake = setup();
    let session = intake.first_visit.start_intake(start(Uuid::new_v4())).await.unwrap();

    assert_matches!(
        intake.first_visit.available_slots(session.id).await,
        Err(AppointmentError::ValidationError(_))
    );

    intake.first_visit
        .update_selection(session.id, BookingSelection {
            professional_id: Some(intake.doctor.id),
            ..BookingSelection::default()
        })
        .await
        .unwrap();
    assert_eq!(intake.first_visit.available_slots(session.id).await.unwrap().len(), 9);

    intake.first_visit.book(session.id, pick(&intake.doctor, "09:00")).await.unwrap();
    intake.first_visit
        .update_selection(session.id, BookingSelection {
            professional_id: Some(intake.therapist.id),
            ..BookingSelection::default()
        })
        .await
        .unwrap();
    assert_eq!(intake.first_visit.available_slots(session.id).await.unwrap().len(), 13);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let intake = setup();

    assert_matches!(
        intake.first_visit.book(Uuid::new_v4(), pick(&intake.doctor, "09:00")).await,
        Err(AppointmentError::IntakeSessionNotFound)
    );
    assert_matches!(
        intake.first_visit.abandon(Uuid::new_v4()).await,
        Err(AppointmentError::IntakeSessionNotFound)
    );
}

#[tokio::test]
async fn test_stale_intakes_are_dropped_when_a_new_one_starts() {
    let intake = setup();
    let stale = intake.first_visit.start_intake(start(Uuid::new_v4())).await.unwrap();
    intake.first_visit.book(stale.id, pick(&intake.doctor, "09:00")).await.unwrap();

    let recent = intake.first_visit.start_intake(start(Uuid::new_v4())).await.unwrap();
    assert_eq!(intake.first_visit.active_sessions().await, 2);

    intake.clock.set(slot("20:00").on(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
    intake.first_visit.start_intake(start(Uuid::new_v4())).await.unwrap();
    assert_eq!(intake.first_visit.active_sessions().await, 3);

    intake.clock.set(slot("08:00").on(NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()));
    intake.first_visit.start_intake(start(Uuid::new_v4())).await.unwrap();

    assert_matches!(
        intake.first_visit.get_session(stale.id).await,
        Err(AppointmentError::IntakeSessionNotFound)
    );
    assert_matches!(
        intake.first_visit.get_session(recent.id).await,
        Err(AppointmentError::IntakeSessionNotFound)
    );
    assert_eq!(intake.first_visit.active_sessions().await, 2);

    // The consultation booked by the dropped intake stays
    let kept = intake.booking.list_appointments(&AppointmentQuery::default()).await.unwrap();
    assert_eq!(kept.len(), 1);
}
