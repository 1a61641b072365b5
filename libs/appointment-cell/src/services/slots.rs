// libs/appointment-cell/src/services/slots.rs
//
// Candidate slot generation. Pure: identical inputs always yield the
// identical ordered list, independent of existing bookings.

use crate::models::{AppointmentKind, Professional, SchedulingPolicy, SlotTime, FALLBACK_CONSULTATION_MINUTES};

/// Consultation spacing actually used: the professional's configured
/// duration when positive, otherwise the policy default.
pub fn effective_consultation_minutes(configured: Option<i64>, policy: &SchedulingPolicy) -> i64 {
    match configured {
        Some(minutes) if minutes > 0 => minutes,
        _ if policy.default_consultation_minutes > 0 => policy.default_consultation_minutes,
        _ => FALLBACK_CONSULTATION_MINUTES,
    }
}

/// Ordered `HH:MM` candidates for `kind`. `consultation_minutes` only
/// matters for consultations; therapy uses the fixed therapy spacing.
pub fn generate_slots(
    kind: AppointmentKind,
    consultation_minutes: Option<i64>,
    policy: &SchedulingPolicy,
) -> Vec<SlotTime> {
    let (start, end, step) = match kind {
        AppointmentKind::Consultation => (
            policy.consultation_start_minutes,
            policy.consultation_end_minutes,
            effective_consultation_minutes(consultation_minutes, policy),
        ),
        AppointmentKind::Therapy => (
            policy.therapy_start_minutes,
            policy.therapy_end_minutes,
            if policy.therapy_spacing_minutes > 0 {
                policy.therapy_spacing_minutes
            } else {
                FALLBACK_CONSULTATION_MINUTES
            },
        ),
    };

    let mut slots = Vec::new();
    let mut minutes = start;
    while minutes <= end {
        if let Some(slot) = SlotTime::from_minutes(minutes) {
            slots.push(slot);
        }
        minutes = match minutes.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    slots
}

/// Candidates for a specific professional.
pub fn slots_for(professional: &Professional, kind: AppointmentKind, policy: &SchedulingPolicy) -> Vec<SlotTime> {
    generate_slots(kind, professional.consultation_duration_minutes, policy)
}
