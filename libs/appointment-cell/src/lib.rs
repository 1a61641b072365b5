pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use handlers::SchedulingState;
pub use router::appointment_routes;
