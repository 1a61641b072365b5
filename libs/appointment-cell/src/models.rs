// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use shared_config::AppConfig;

// ==============================================================================
// PROFESSIONALS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProfessionalKind {
    Doctor,
    Therapist,
}

impl fmt::Display for ProfessionalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfessionalKind::Doctor => write!(f, "doctor"),
            ProfessionalKind::Therapist => write!(f, "therapist"),
        }
    }
}

/// A doctor or therapist as read from the user-management collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Professional {
    pub id: Uuid,
    pub kind: ProfessionalKind,
    pub display_name: String,
    /// Slot spacing for consultations. Stored values that are missing or
    /// not numeric deserialize to `None`.
    #[serde(default, deserialize_with = "lenient_minutes")]
    pub consultation_duration_minutes: Option<i64>,
}

impl Professional {
    pub fn doctor(id: Uuid, display_name: impl Into<String>, consultation_duration_minutes: Option<i64>) -> Self {
        Self {
            id,
            kind: ProfessionalKind::Doctor,
            display_name: display_name.into(),
            consultation_duration_minutes,
        }
    }

    pub fn therapist(id: Uuid, display_name: impl Into<String>) -> Self {
        Self {
            id,
            kind: ProfessionalKind::Therapist,
            display_name: display_name.into(),
            consultation_duration_minutes: None,
        }
    }
}

fn lenient_minutes<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentKind {
    Consultation,
    Therapy,
}

impl AppointmentKind {
    /// Which capacity pool (foreign key) an appointment of this kind consumes.
    pub fn professional_kind(&self) -> ProfessionalKind {
        match self {
            AppointmentKind::Consultation => ProfessionalKind::Doctor,
            AppointmentKind::Therapy => ProfessionalKind::Therapist,
        }
    }
}

impl fmt::Display for AppointmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentKind::Consultation => write!(f, "consultation"),
            AppointmentKind::Therapy => write!(f, "therapy"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    #[serde(rename = "no-show", alias = "no_show")]
    NoShow,
    Cancelled,
}

impl AppointmentStatus {
    /// Whether an appointment in this status still occupies its slot.
    pub fn consumes_capacity(&self, count_no_show: bool) -> bool {
        match self {
            AppointmentStatus::Cancelled => false,
            AppointmentStatus::NoShow => count_no_show,
            AppointmentStatus::Scheduled | AppointmentStatus::Completed => true,
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::NoShow => write!(f, "no-show"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Local time-of-day at minute precision, rendered as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime(NaiveTime);

impl SlotTime {
    pub fn new(time: NaiveTime) -> Self {
        Self(time.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(time))
    }

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn from_minutes(minutes: i64) -> Option<Self> {
        if !(0..24 * 60).contains(&minutes) {
            return None;
        }
        Self::from_hm((minutes / 60) as u32, (minutes % 60) as u32)
    }

    pub fn minutes_from_midnight(&self) -> i64 {
        i64::from(self.0.hour()) * 60 + i64::from(self.0.minute())
    }

    pub fn time(&self) -> NaiveTime {
        self.0
    }

    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.0)
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for SlotTime {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .map(SlotTime::new)
            .map_err(|_| format!("invalid time '{}', expected HH:MM", value))
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub professional_id: Uuid,
    pub professional_kind: ProfessionalKind,
    pub kind: AppointmentKind,
    /// Local calendar date, `YYYY-MM-DD`.
    pub date: NaiveDate,
    pub time: SlotTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn scheduled(
        patient_id: Uuid,
        patient_name: String,
        professional: &Professional,
        kind: AppointmentKind,
        date: NaiveDate,
        time: SlotTime,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            patient_name,
            professional_id: professional.id,
            professional_kind: professional.kind,
            kind,
            date,
            time,
            status: AppointmentStatus::Scheduled,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.time.on(self.date)
    }
}

/// Partial update written to an existing appointment document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<SlotTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub professional_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub professional_kind: Option<ProfessionalKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AppointmentPatch {
    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(date) = self.date {
            appointment.date = date;
        }
        if let Some(time) = self.time {
            appointment.time = time;
        }
        if let Some(professional_id) = self.professional_id {
            appointment.professional_id = professional_id;
        }
        if let Some(kind) = self.professional_kind {
            appointment.professional_kind = kind;
        }
        if let Some(status) = self.status {
            appointment.status = status;
        }
        appointment.updated_at = self.updated_at.or(appointment.updated_at);
    }
}

/// Occupancy per slot: time -> number of active bookings.
pub type OccupancyMap = BTreeMap<SlotTime, u32>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotDescriptor {
    pub time: SlotTime,
    pub remaining_capacity: u32,
    pub available: bool,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: Uuid,
    pub patient_name: String,
    pub professional_id: Option<Uuid>,
    /// Falls back to the channel's default kind when omitted.
    pub kind: Option<AppointmentKind>,
    pub date: Option<NaiveDate>,
    pub time: Option<SlotTime>,
    #[serde(default)]
    pub channel: Option<BookingChannel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReassignAppointmentRequest {
    pub date: Option<NaiveDate>,
    pub time: Option<SlotTime>,
    pub professional_id: Option<Uuid>,
    #[serde(default)]
    pub channel: Option<BookingChannel>,
}

impl ReassignAppointmentRequest {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.time.is_none() && self.professional_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub professional_id: Uuid,
    pub date: NaiveDate,
    pub kind: AppointmentKind,
    /// The appointment being edited; it never counts against itself.
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub professional_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
}

impl AppointmentQuery {
    pub fn for_day(professional_id: Uuid, date: NaiveDate) -> Self {
        Self {
            date_from: Some(date),
            date_to: Some(date),
            professional_id: Some(professional_id),
            patient_id: None,
        }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.date_from.map_or(true, |from| appointment.date >= from)
            && self.date_to.map_or(true, |to| appointment.date <= to)
            && self.professional_id.map_or(true, |id| appointment.professional_id == id)
            && self.patient_id.map_or(true, |id| appointment.patient_id == id)
    }
}

// ==============================================================================
// BOOKING CHANNELS
// ==============================================================================

/// The front-desk surfaces that book through the engine. They share one
/// contract and differ only in defaults and permitted operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingChannel {
    PatientIntake,
    FirstVisit,
    ReceptionReschedule,
    AdminReschedule,
    TherapistSelfSchedule,
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelDefaults {
    pub default_kind: AppointmentKind,
    pub permitted_kinds: &'static [AppointmentKind],
    pub may_reassign: bool,
}

const BOTH_KINDS: &[AppointmentKind] = &[AppointmentKind::Consultation, AppointmentKind::Therapy];
const THERAPY_ONLY: &[AppointmentKind] = &[AppointmentKind::Therapy];

impl BookingChannel {
    pub fn defaults(&self) -> ChannelDefaults {
        match self {
            BookingChannel::PatientIntake | BookingChannel::FirstVisit => ChannelDefaults {
                default_kind: AppointmentKind::Consultation,
                permitted_kinds: BOTH_KINDS,
                may_reassign: false,
            },
            BookingChannel::ReceptionReschedule | BookingChannel::AdminReschedule => ChannelDefaults {
                default_kind: AppointmentKind::Consultation,
                permitted_kinds: BOTH_KINDS,
                may_reassign: true,
            },
            BookingChannel::TherapistSelfSchedule => ChannelDefaults {
                default_kind: AppointmentKind::Therapy,
                permitted_kinds: THERAPY_ONLY,
                may_reassign: true,
            },
        }
    }

    pub fn resolve_kind(&self, requested: Option<AppointmentKind>) -> Result<AppointmentKind, AppointmentError> {
        let defaults = self.defaults();
        let kind = requested.unwrap_or(defaults.default_kind);
        if !defaults.permitted_kinds.contains(&kind) {
            return Err(AppointmentError::ValidationError(format!(
                "{} appointments cannot be booked through {}", kind, self
            )));
        }
        Ok(kind)
    }

    /// Request template carrying this channel's defaults.
    pub fn request(self, patient_id: Uuid, patient_name: impl Into<String>) -> BookAppointmentRequest {
        BookAppointmentRequest {
            patient_id,
            patient_name: patient_name.into(),
            professional_id: None,
            kind: None,
            date: None,
            time: None,
            channel: Some(self),
        }
    }

    pub fn ensure_may_reassign(&self) -> Result<(), AppointmentError> {
        if self.defaults().may_reassign {
            Ok(())
        } else {
            Err(AppointmentError::ValidationError(format!(
                "{} cannot reassign existing appointments", self
            )))
        }
    }
}

impl fmt::Display for BookingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingChannel::PatientIntake => write!(f, "patient intake"),
            BookingChannel::FirstVisit => write!(f, "first visit"),
            BookingChannel::ReceptionReschedule => write!(f, "reception reschedule"),
            BookingChannel::AdminReschedule => write!(f, "admin reschedule"),
            BookingChannel::TherapistSelfSchedule => write!(f, "therapist self-schedule"),
        }
    }
}

// ==============================================================================
// FIRST-VISIT WORKFLOW STATE
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStage {
    AwaitingConsultation,
    AwaitingTherapy,
    Complete,
}

impl IntakeStage {
    pub fn expected_kind(&self) -> Option<AppointmentKind> {
        match self {
            IntakeStage::AwaitingConsultation => Some(AppointmentKind::Consultation),
            IntakeStage::AwaitingTherapy => Some(AppointmentKind::Therapy),
            IntakeStage::Complete => None,
        }
    }
}

impl fmt::Display for IntakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntakeStage::AwaitingConsultation => write!(f, "awaiting consultation"),
            IntakeStage::AwaitingTherapy => write!(f, "awaiting therapy"),
            IntakeStage::Complete => write!(f, "complete"),
        }
    }
}

/// Date, professional and time picked in the intake date picker. Any of
/// them may still be unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingSelection {
    pub date: Option<NaiveDate>,
    pub professional_id: Option<Uuid>,
    pub time: Option<SlotTime>,
}

impl BookingSelection {
    /// Overlay the fields set in `other` onto this selection.
    pub fn merge(&mut self, other: &BookingSelection) {
        if other.date.is_some() {
            self.date = other.date;
        }
        if other.professional_id.is_some() {
            self.professional_id = other.professional_id;
        }
        if other.time.is_some() {
            self.time = other.time;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartIntakeRequest {
    pub patient_id: Uuid,
    pub patient_name: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntakeBookingRequest {
    /// Defaults to the kind the session is waiting for.
    #[serde(default)]
    pub kind: Option<AppointmentKind>,
    #[serde(flatten)]
    pub selection: BookingSelection,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error, PartialEq)]
pub enum AppointmentError {
    #[error("Slot {time} on {date} is already full")]
    SlotFull { date: NaiveDate, time: SlotTime },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Appointment not found")]
    NotFound,

    #[error("Professional not found")]
    ProfessionalNotFound,

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("First visit expects {expected:?} next, not {requested}")]
    IntakeOutOfOrder { expected: Option<AppointmentKind>, requested: AppointmentKind },

    #[error("First visit is not complete yet ({0}): book both the consultation and the therapy session before closing")]
    IntakeIncomplete(IntakeStage),

    #[error("Intake session not found")]
    IntakeSessionNotFound,
}

// ==============================================================================
// SCHEDULING POLICY
// ==============================================================================

/// Policy values governing slot generation and availability. Times are
/// minutes from local midnight.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingPolicy {
    pub consultation_start_minutes: i64,
    pub consultation_end_minutes: i64,
    pub therapy_start_minutes: i64,
    pub therapy_end_minutes: i64,
    pub therapy_spacing_minutes: i64,
    pub default_consultation_minutes: i64,
    pub consultation_capacity: u32,
    pub therapy_capacity: u32,
    pub too_soon_minutes: i64,
    pub count_no_show: bool,
}

pub const FALLBACK_CONSULTATION_MINUTES: i64 = 60;

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            consultation_start_minutes: 8 * 60,
            consultation_end_minutes: 16 * 60,
            therapy_start_minutes: 6 * 60,
            therapy_end_minutes: 18 * 60,
            therapy_spacing_minutes: 60,
            default_consultation_minutes: FALLBACK_CONSULTATION_MINUTES,
            consultation_capacity: 1,
            therapy_capacity: 2,
            too_soon_minutes: 30,
            count_no_show: true,
        }
    }
}

impl SchedulingPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        let default_consultation_minutes = if config.default_consultation_minutes > 0 {
            config.default_consultation_minutes
        } else {
            FALLBACK_CONSULTATION_MINUTES
        };

        Self {
            default_consultation_minutes,
            too_soon_minutes: config.too_soon_minutes.max(0),
            count_no_show: config.count_no_show,
            ..Self::default()
        }
    }

    pub fn capacity(&self, kind: AppointmentKind) -> u32 {
        match kind {
            AppointmentKind::Consultation => self.consultation_capacity,
            AppointmentKind::Therapy => self.therapy_capacity,
        }
    }
}
