// libs/appointment-cell/src/services/lifecycle.rs
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::models::{AppointmentError, AppointmentStatus};

#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: &AppointmentStatus,
        new_status: &AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        let valid_transitions = self.get_valid_transitions(current_status);

        if !valid_transitions.contains(new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: *current_status,
                to: *new_status,
            });
        }

        info!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::NoShow,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::NoShow => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Only live bookings may move to another date, time or professional.
    pub fn validate_reassignment(
        &self,
        current_status: &AppointmentStatus,
        new_date: NaiveDate,
        today: NaiveDate,
    ) -> Result<(), AppointmentError> {
        if *current_status != AppointmentStatus::Scheduled {
            return Err(AppointmentError::ValidationError(format!(
                "Only scheduled appointments can be reassigned (current status: {})",
                current_status
            )));
        }

        if new_date < today {
            return Err(AppointmentError::ValidationError(format!(
                "Cannot move an appointment into the past ({})",
                new_date
            )));
        }

        Ok(())
    }
}
