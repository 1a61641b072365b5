// libs/appointment-cell/src/services/availability.rs
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::models::{AppointmentKind, OccupancyMap, SchedulingPolicy, SlotDescriptor, SlotTime};

/// Narrows generated slots to what may be offered. Holds no state of its
/// own; callers recompute from live occupancy on every change.
#[derive(Debug, Clone, Copy)]
pub struct AvailabilityFilter {
    pub capacity: u32,
    pub too_soon_minutes: i64,
}

impl AvailabilityFilter {
    pub fn new(capacity: u32, too_soon_minutes: i64) -> Self {
        Self { capacity, too_soon_minutes }
    }

    pub fn for_kind(kind: AppointmentKind, policy: &SchedulingPolicy) -> Self {
        Self::new(policy.capacity(kind), policy.too_soon_minutes)
    }

    /// True when `time` on `date` has started already or starts within the
    /// lead time. Later dates are never excluded; earlier dates always are.
    pub fn is_excluded_by_time(&self, date: NaiveDate, time: SlotTime, now: NaiveDateTime) -> bool {
        let today = now.date();
        if date > today {
            return false;
        }
        if date < today {
            return true;
        }
        time.on(date) < now + Duration::minutes(self.too_soon_minutes)
    }

    /// Slot descriptors in slot order. Time-excluded slots are dropped;
    /// full slots stay listed as unavailable. `original_time` is the slot
    /// an edited appointment currently holds and is always selectable.
    pub fn apply(
        &self,
        slots: &[SlotTime],
        occupancy: &OccupancyMap,
        date: NaiveDate,
        now: NaiveDateTime,
        original_time: Option<SlotTime>,
    ) -> Vec<SlotDescriptor> {
        slots
            .iter()
            .copied()
            .filter(|slot| Some(*slot) == original_time || !self.is_excluded_by_time(date, *slot, now))
            .map(|slot| {
                let occupied = occupancy.get(&slot).copied().unwrap_or(0);
                SlotDescriptor {
                    time: slot,
                    remaining_capacity: self.capacity.saturating_sub(occupied),
                    available: occupied < self.capacity || Some(slot) == original_time,
                }
            })
            .collect()
    }

    pub fn is_available(
        &self,
        slots: &[SlotTime],
        occupancy: &OccupancyMap,
        date: NaiveDate,
        now: NaiveDateTime,
        original_time: Option<SlotTime>,
        time: SlotTime,
    ) -> bool {
        self.apply(slots, occupancy, date, now, original_time)
            .iter()
            .any(|descriptor| descriptor.time == time && descriptor.available)
    }
}
