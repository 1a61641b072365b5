// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::handlers::{self, SchedulingState};

pub fn appointment_routes(state: Arc<SchedulingState>) -> Router {
    Router::new()
        // Availability
        .route("/professionals/{professional_id}/slots", get(handlers::list_slots))

        // Appointments
        .route("/appointments", post(handlers::book_appointment).get(handlers::list_appointments))
        .route("/appointments/{appointment_id}", get(handlers::get_appointment))
        .route("/appointments/{appointment_id}/reassign", patch(handlers::reassign_appointment))
        .route("/appointments/{appointment_id}/status", patch(handlers::update_status))

        // First-visit intake
        .route("/intake", post(handlers::start_intake))
        .route("/intake/{session_id}", get(handlers::get_intake).delete(handlers::abandon_intake))
        .route("/intake/{session_id}/selection", patch(handlers::update_intake_selection))
        .route("/intake/{session_id}/slots", get(handlers::list_intake_slots))
        .route("/intake/{session_id}/book", post(handlers::book_intake))
        .route("/intake/{session_id}/dismiss", post(handlers::dismiss_intake))

        .with_state(state)
}
