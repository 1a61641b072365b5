// libs/appointment-cell/src/services/feed.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, AppointmentKind, AppointmentStatus, SlotTime};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ScheduleKey {
    pub professional_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Reassigned,
    StatusChanged,
}

/// One committed write to the appointment collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleChange {
    pub change: ChangeKind,
    pub appointment_id: Uuid,
    pub professional_id: Uuid,
    pub kind: AppointmentKind,
    pub date: NaiveDate,
    pub time: SlotTime,
    pub status: AppointmentStatus,
    /// Where a reassigned appointment came from.
    pub previous: Option<ScheduleKey>,
}

impl ScheduleChange {
    pub fn new(change: ChangeKind, appointment: &Appointment) -> Self {
        Self {
            change,
            appointment_id: appointment.id,
            professional_id: appointment.professional_id,
            kind: appointment.kind,
            date: appointment.date,
            time: appointment.time,
            status: appointment.status,
            previous: None,
        }
    }

    pub fn reassigned(appointment: &Appointment, previous: ScheduleKey) -> Self {
        Self {
            previous: Some(previous),
            ..Self::new(ChangeKind::Reassigned, appointment)
        }
    }

    /// Whether occupancy for `(professional_id, date)` may have changed.
    pub fn touches(&self, professional_id: Uuid, date: NaiveDate) -> bool {
        let key = ScheduleKey { professional_id, date };
        (self.professional_id == professional_id && self.date == date) || self.previous == Some(key)
    }
}

/// Fan-out of committed changes to every live availability view.
#[derive(Clone)]
pub struct ScheduleFeed {
    sender: broadcast::Sender<ScheduleChange>,
}

impl ScheduleFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, change: ScheduleChange) {
        match self.sender.send(change) {
            Ok(receivers) => debug!("Schedule change delivered to {} subscribers", receivers),
            Err(_) => debug!("Schedule change published with no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleChange> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ScheduleFeed {
    fn default() -> Self {
        Self::new(1000)
    }
}
