use std::sync::Arc;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Days, Local, NaiveDate};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::models::{Professional, SchedulingPolicy, SlotTime};
use appointment_cell::router::appointment_routes;
use appointment_cell::services::booking::AppointmentBookingService;
use appointment_cell::services::clock::FixedClock;
use appointment_cell::services::memory_store::{InMemoryAppointmentStore, DEMO_DOCTOR_ID, DEMO_THERAPIST_ID};
use appointment_cell::services::notification::InMemoryNotificationSink;
use appointment_cell::SchedulingState;
use shared_config::AppConfig;
use shared_utils::test_utils::TestConfig;

struct TestApp {
    app: Router,
    doctor: Professional,
    therapist: Professional,
}

fn create_test_app() -> TestApp {
    let doctor = Professional::doctor(Uuid::new_v4(), "Dr. Test", Some(60));
    let therapist = Professional::therapist(Uuid::new_v4(), "Test Therapist");
    let store = Arc::new(InMemoryAppointmentStore::with_professionals([doctor.clone(), therapist.clone()]));
    let now = "12:00".parse::<SlotTime>().unwrap().on(NaiveDate::from_ymd_opt(2024, 6, 9).unwrap());

    let booking = AppointmentBookingService::new(
        store,
        Arc::new(InMemoryNotificationSink::new()),
        SchedulingPolicy::default(),
    )
    .with_clock(Arc::new(FixedClock::new(now)));

    let state = SchedulingState::new(TestConfig::default().to_app_config(), Arc::new(booking));

    TestApp {
        app: appointment_routes(Arc::new(state)),
        doctor,
        therapist,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json_body) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json_body.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn booking_body(professional_id: Uuid, kind: &str, time: &str) -> Value {
    json!({
        "patient_id": Uuid::new_v4(),
        "patient_name": "Paula Reis",
        "professional_id": professional_id,
        "kind": kind,
        "date": "2024-06-10",
        "time": time
    })
}

#[tokio::test]
async fn test_list_slots_for_doctor() {
    let test = create_test_app();

    let (status, body) = send(
        &test.app,
        "GET",
        &format!("/professionals/{}/slots?date=2024-06-10&kind=consultation", test.doctor.id),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 9);
    assert_eq!(slots[0]["time"], "08:00");
    assert_eq!(slots[8]["time"], "16:00");
    assert_eq!(slots[0]["remaining_capacity"], 1);
}

#[tokio::test]
async fn test_book_then_conflict() {
    let test = create_test_app();

    let (status, body) = send(&test.app, "POST", "/appointments", Some(booking_body(test.doctor.id, "consultation", "09:00"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["appointment"]["time"], "09:00");
    assert_eq!(body["appointment"]["status"], "scheduled");

    let (status, body) = send(&test.app, "POST", "/appointments", Some(booking_body(test.doctor.id, "consultation", "09:00"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_missing_professional_is_bad_request() {
    let test = create_test_app();

    let mut body = booking_body(test.doctor.id, "consultation", "09:00");
    body["professional_id"] = Value::Null;

    let (status, body) = send(&test.app, "POST", "/appointments", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_status_update_and_listing() {
    let test = create_test_app();

    let (_, created) = send(&test.app, "POST", "/appointments", Some(booking_body(test.therapist.id, "therapy", "15:00"))).await;
    let id = created["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &test.app,
        "PATCH",
        &format!("/appointments/{}/status", id),
        Some(json!({ "status": "no-show" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "no-show");

    let (status, body) = send(
        &test.app,
        "GET",
        &format!("/appointments?date_from=2024-06-10&date_to=2024-06-10&professional_id={}", test.therapist.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, _) = send(&test.app, "GET", &format!("/appointments/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reassign_endpoint() {
    let test = create_test_app();

    let (_, created) = send(&test.app, "POST", "/appointments", Some(booking_body(test.doctor.id, "consultation", "09:00"))).await;
    let id = created["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &test.app,
        "PATCH",
        &format!("/appointments/{}/reassign", id),
        Some(json!({ "time": "12:00", "channel": "admin_reschedule" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["time"], "12:00");
}

#[tokio::test]
async fn test_intake_flow_over_http() {
    let test = create_test_app();

    let (status, started) = send(
        &test.app,
        "POST",
        "/intake",
        Some(json!({ "patient_id": Uuid::new_v4(), "patient_name": "Nuno", "date": "2024-06-10" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(started["next_kind"], "consultation");
    let session_id = started["session"]["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &test.app,
        "POST",
        &format!("/intake/{}/book", session_id),
        Some(json!({ "kind": "therapy", "professional_id": test.therapist.id, "time": "10:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&test.app, "POST", &format!("/intake/{}/dismiss", session_id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, booked) = send(
        &test.app,
        "POST",
        &format!("/intake/{}/book", session_id),
        Some(json!({ "professional_id": test.doctor.id, "time": "09:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booked["session"]["stage"], "awaiting_therapy");

    let (status, _) = send(
        &test.app,
        "PATCH",
        &format!("/intake/{}/selection", session_id),
        Some(json!({ "professional_id": test.therapist.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, slots) = send(&test.app, "GET", &format!("/intake/{}/slots", session_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slots["slots"].as_array().unwrap().len(), 13);

    let (status, _) = send(
        &test.app,
        "POST",
        &format!("/intake/{}/book", session_id),
        Some(json!({ "time": "10:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&test.app, "POST", &format!("/intake/{}/dismiss", session_id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&test.app, "GET", &format!("/intake/{}", session_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_abandon_intake_endpoint() {
    let test = create_test_app();

    let (_, started) = send(
        &test.app,
        "POST",
        "/intake",
        Some(json!({ "patient_id": Uuid::new_v4(), "patient_name": "Vera" })),
    )
    .await;
    let session_id = started["session"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&test.app, "DELETE", &format!("/intake/{}", session_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["stage"], "awaiting_consultation");

    let (status, _) = send(&test.app, "DELETE", &format!("/intake/{}", session_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_default_config_serves_the_demo_roster() {
    let app = appointment_routes(Arc::new(SchedulingState::from_config(AppConfig::default())));
    let date = Local::now().date_naive() + Days::new(7);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/professionals/{}/slots?date={}&kind=therapy", DEMO_THERAPIST_ID, date),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["slots"].as_array().unwrap().len(), 13);

    let mut body = booking_body(DEMO_DOCTOR_ID, "consultation", "09:00");
    body["date"] = json!(date);
    let (status, created) = send(&app, "POST", "/appointments", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["appointment"]["professional_id"], json!(DEMO_DOCTOR_ID));
}
