// libs/appointment-cell/src/services/occupancy.rs
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentKind, OccupancyMap};

/// Which bookings an occupancy count covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyScope {
    pub date: NaiveDate,
    pub professional_id: Uuid,
    pub kind: AppointmentKind,
    pub exclude_appointment_id: Option<Uuid>,
}

impl OccupancyScope {
    pub fn new(professional_id: Uuid, date: NaiveDate, kind: AppointmentKind) -> Self {
        Self {
            date,
            professional_id,
            kind,
            exclude_appointment_id: None,
        }
    }

    pub fn excluding(mut self, appointment_id: Option<Uuid>) -> Self {
        self.exclude_appointment_id = appointment_id;
        self
    }

    fn covers(&self, appointment: &Appointment, count_no_show: bool) -> bool {
        appointment.date == self.date
            && appointment.professional_id == self.professional_id
            && appointment.professional_kind == self.kind.professional_kind()
            && Some(appointment.id) != self.exclude_appointment_id
            && appointment.status.consumes_capacity(count_no_show)
    }
}

/// Aggregate active bookings into `time -> count`. The input may be the
/// whole collection or any superset of the scope.
pub fn count_occupancy<'a, I>(appointments: I, scope: &OccupancyScope, count_no_show: bool) -> OccupancyMap
where
    I: IntoIterator<Item = &'a Appointment>,
{
    let mut occupancy = OccupancyMap::new();
    for appointment in appointments {
        if scope.covers(appointment, count_no_show) {
            *occupancy.entry(appointment.time).or_insert(0) += 1;
        }
    }
    occupancy
}
