use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{appointment_routes, SchedulingState};

pub fn create_router(state: Arc<SchedulingState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/scheduling", appointment_routes(state))
}
