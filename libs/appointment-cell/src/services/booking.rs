// libs/appointment-cell/src/services/booking.rs
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::{AppConfig, StoreBackend};
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentKind, AppointmentPatch, AppointmentQuery,
    AppointmentStatus, AvailabilityQuery, BookAppointmentRequest, OccupancyMap,
    Professional, ReassignAppointmentRequest, SchedulingPolicy, SlotDescriptor, SlotTime,
    UpdateStatusRequest,
};
use crate::services::availability::AvailabilityFilter;
use crate::services::clock::{local_now, DefaultClock, SharedClock};
use crate::services::feed::{ChangeKind, ScheduleChange, ScheduleFeed, ScheduleKey};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::SlotLockRegistry;
use crate::services::memory_store::{seed_roster, InMemoryAppointmentStore};
use crate::services::notification::{
    InMemoryNotificationSink, Notification, NotificationSink, SupabaseNotificationSink,
};
use crate::services::occupancy::{count_occupancy, OccupancyScope};
use crate::services::slots::slots_for;
use crate::services::store::{AppointmentStore, SupabaseAppointmentStore};

/// Single authority for slot availability and booking commits. All
/// writers going through one instance see an exact capacity invariant.
pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    notifier: Arc<dyn NotificationSink>,
    clock: SharedClock,
    feed: ScheduleFeed,
    slot_locks: SlotLockRegistry,
    lifecycle_service: AppointmentLifecycleService,
    policy: SchedulingPolicy,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        notifier: Arc<dyn NotificationSink>,
        policy: SchedulingPolicy,
    ) -> Self {
        Self {
            store,
            notifier,
            clock: Arc::new(DefaultClock),
            feed: ScheduleFeed::default(),
            slot_locks: SlotLockRegistry::new(),
            lifecycle_service: AppointmentLifecycleService::new(),
            policy,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let policy = SchedulingPolicy::from_config(config);

        match config.store_backend {
            StoreBackend::Supabase => {
                let supabase = Arc::new(SupabaseClient::new(config));
                info!("Scheduling against Supabase at {}", supabase.get_base_url());
                Self::new(
                    Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase))),
                    Arc::new(SupabaseNotificationSink::new(supabase)),
                    policy,
                )
            }
            StoreBackend::Memory => {
                let roster = seed_roster(config.seed_professionals.as_deref());
                info!("Scheduling against the in-memory store with {} professionals", roster.len());
                Self::new(
                    Arc::new(InMemoryAppointmentStore::with_professionals(roster)),
                    Arc::new(InMemoryNotificationSink::new()),
                    policy,
                )
            }
        }
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleChange> {
        self.feed.subscribe()
    }

    pub fn today(&self) -> NaiveDate {
        local_now(self.clock.as_ref()).date()
    }

    // ==============================================================================
    // READS
    // ==============================================================================

    pub async fn get_professional(&self, professional_id: Uuid) -> Result<Professional, AppointmentError> {
        self.store
            .find_professional(professional_id)
            .await?
            .ok_or(AppointmentError::ProfessionalNotFound)
    }

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    pub async fn list_appointments(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>, AppointmentError> {
        self.store.list_appointments(query).await
    }

    /// Live occupancy for one professional's day.
    pub async fn occupancy(&self, scope: &OccupancyScope) -> Result<OccupancyMap, AppointmentError> {
        let appointments = self.store
            .list_appointments(&AppointmentQuery::for_day(scope.professional_id, scope.date))
            .await?;
        Ok(count_occupancy(&appointments, scope, self.policy.count_no_show))
    }

    /// Bookable slot list for `(professional, date, kind)`, recomputed from
    /// the store on every call.
    pub async fn available_slots(&self, query: &AvailabilityQuery) -> Result<Vec<SlotDescriptor>, AppointmentError> {
        debug!("Computing availability for professional {} on {} ({})",
               query.professional_id, query.date, query.kind);

        let professional = self.get_professional(query.professional_id).await?;
        ensure_professional_matches(&professional, query.kind)?;

        let original_time = match query.exclude_appointment_id {
            Some(appointment_id) => {
                let edited = self.get_appointment(appointment_id).await?;
                (edited.professional_id == query.professional_id && edited.date == query.date)
                    .then_some(edited.time)
            }
            None => None,
        };

        let scope = OccupancyScope::new(query.professional_id, query.date, query.kind)
            .excluding(query.exclude_appointment_id);
        let occupancy = self.occupancy(&scope).await?;
        let slots = slots_for(&professional, query.kind, &self.policy);

        Ok(AvailabilityFilter::for_kind(query.kind, &self.policy)
            .apply(&slots, &occupancy, query.date, local_now(self.clock.as_ref()), original_time))
    }

    /// Streams the slot list for `query`: once immediately, then after
    /// every committed change touching the same professional and day.
    /// The task ends when the receiver is dropped.
    pub fn watch_availability(
        self: &Arc<Self>,
        query: AvailabilityQuery,
    ) -> mpsc::Receiver<Result<Vec<SlotDescriptor>, AppointmentError>> {
        let (tx, rx) = mpsc::channel(16);
        let mut changes = self.feed.subscribe();
        let service = Arc::clone(self);

        tokio::spawn(async move {
            if tx.send(service.available_slots(&query).await).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    received = changes.recv() => match received {
                        Ok(change) if !change.touches(query.professional_id, query.date) => continue,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Availability watcher lagged by {} changes, recomputing", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }

                if tx.send(service.available_slots(&query).await).await.is_err() {
                    break;
                }
            }

            debug!("Availability watcher for professional {} on {} stopped",
                   query.professional_id, query.date);
        });

        rx
    }

    // ==============================================================================
    // BOOKING TRANSACTION
    // ==============================================================================

    /// Create a new appointment. Capacity is checked and the document
    /// written while holding the `(professional, date)` lock.
    #[instrument(skip(self, request), fields(patient_id = %request.patient_id))]
    pub async fn book_appointment(&self, request: BookAppointmentRequest) -> Result<Appointment, AppointmentError> {
        let kind = match request.channel {
            Some(channel) => channel.resolve_kind(request.kind)?,
            None => request.kind.ok_or_else(|| validation("Appointment kind is required"))?,
        };
        let professional_id = request.professional_id.ok_or_else(|| validation("Professional is required"))?;
        let date = request.date.ok_or_else(|| validation("Date is required"))?;
        let time = request.time.ok_or_else(|| validation("Time is required"))?;

        if request.patient_name.trim().is_empty() {
            return Err(validation("Patient name is required"));
        }
        if date < self.today() {
            return Err(validation(&format!("Cannot book into the past ({})", date)));
        }

        info!("Booking {} for patient {} with professional {} on {} at {}",
              kind, request.patient_id, professional_id, date, time);

        let professional = self.get_professional(professional_id).await?;
        ensure_professional_matches(&professional, kind)?;
        self.ensure_slot_offered(&professional, kind, date, time, None)?;

        let created = {
            let _guard = self.slot_locks.acquire(professional.id, date).await;

            // Step 1: pre-check against live occupancy
            let scope = OccupancyScope::new(professional.id, date, kind);
            self.ensure_capacity(&scope, time).await?;

            // Step 2: commit
            let appointment = Appointment::scheduled(
                request.patient_id,
                request.patient_name.trim().to_string(),
                &professional,
                kind,
                date,
                time,
            );
            self.store.insert_appointment(&appointment).await?
        };

        self.feed.publish(ScheduleChange::new(ChangeKind::Created, &created));
        self.notify(created.professional_id, Notification::booked(&created)).await;

        info!("Appointment {} booked with professional {} on {} at {}",
              created.id, created.professional_id, created.date, created.time);
        Ok(created)
    }

    /// Move an existing appointment to a new date, time and/or professional.
    #[instrument(skip(self, request))]
    pub async fn reassign_appointment(
        &self,
        appointment_id: Uuid,
        request: ReassignAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        if let Some(channel) = request.channel {
            channel.ensure_may_reassign()?;
        }
        if request.is_empty() {
            return Err(validation("Nothing to reassign: provide a date, time or professional"));
        }

        let current = self.get_appointment(appointment_id).await?;
        if let Some(channel) = request.channel {
            channel.resolve_kind(Some(current.kind))?;
        }

        let new_date = request.date.unwrap_or(current.date);
        let new_time = request.time.unwrap_or(current.time);
        let new_professional_id = request.professional_id.unwrap_or(current.professional_id);

        self.lifecycle_service
            .validate_reassignment(&current.status, new_date, self.today())?;

        if new_date == current.date && new_time == current.time && new_professional_id == current.professional_id {
            debug!("Reassignment of {} keeps the same slot, nothing to write", appointment_id);
            return Ok(current);
        }

        let professional = self.get_professional(new_professional_id).await?;
        ensure_professional_matches(&professional, current.kind)?;

        let same_day_pool = new_professional_id == current.professional_id && new_date == current.date;
        let original_time = same_day_pool.then_some(current.time);
        self.ensure_slot_offered(&professional, current.kind, new_date, new_time, original_time)?;

        let updated = {
            // Source key too: status changes take it before writing
            let _guards = self.slot_locks
                .acquire_all(&[(current.professional_id, current.date), (professional.id, new_date)])
                .await;

            let fresh = self.get_appointment(appointment_id).await?;
            self.lifecycle_service
                .validate_reassignment(&fresh.status, new_date, self.today())?;
            if (fresh.professional_id, fresh.date, fresh.time) != (current.professional_id, current.date, current.time) {
                return Err(validation(&format!(
                    "Appointment {} was moved by another request, reload and retry",
                    appointment_id
                )));
            }

            let scope = OccupancyScope::new(professional.id, new_date, current.kind)
                .excluding(Some(current.id));
            self.ensure_capacity(&scope, new_time).await?;

            let patch = AppointmentPatch {
                date: Some(new_date),
                time: Some(new_time),
                professional_id: Some(professional.id),
                professional_kind: Some(professional.kind),
                ..AppointmentPatch::default()
            };
            self.store.update_appointment(current.id, &patch).await?
        };

        let previous = ScheduleKey {
            professional_id: current.professional_id,
            date: current.date,
        };
        self.feed.publish(ScheduleChange::reassigned(&updated, previous));

        self.notify(updated.professional_id, Notification::rescheduled(&updated)).await;
        if current.professional_id != updated.professional_id {
            self.notify(current.professional_id, Notification::moved_away(&updated)).await;
        }

        info!("Appointment {} reassigned from {} {} to {} {} (professional {})",
              updated.id, current.date, current.time, updated.date, updated.time, updated.professional_id);
        Ok(updated)
    }

    /// Apply a status transition. Leaving `scheduled` frees the slot.
    #[instrument(skip(self, request))]
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        request: UpdateStatusRequest,
    ) -> Result<Appointment, AppointmentError> {
        let located = self.get_appointment(appointment_id).await?;

        let updated = {
            let _guard = self.slot_locks.acquire(located.professional_id, located.date).await;

            let current = self.get_appointment(appointment_id).await?;
            self.lifecycle_service
                .validate_status_transition(&current.status, &request.status)?;

            let patch = AppointmentPatch {
                status: Some(request.status),
                ..AppointmentPatch::default()
            };
            self.store.update_appointment(appointment_id, &patch).await?
        };

        self.feed.publish(ScheduleChange::new(ChangeKind::StatusChanged, &updated));
        if updated.status == AppointmentStatus::Cancelled {
            self.notify(updated.professional_id, Notification::status_changed(&updated)).await;
        }

        info!("Appointment {} is now {}", updated.id, updated.status);
        Ok(updated)
    }

    pub async fn cancel_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.update_status(appointment_id, UpdateStatusRequest { status: AppointmentStatus::Cancelled })
            .await
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    /// The time must be a generated slot and not excluded by the clock,
    /// unless it is the slot the edited appointment already holds.
    fn ensure_slot_offered(
        &self,
        professional: &Professional,
        kind: AppointmentKind,
        date: NaiveDate,
        time: SlotTime,
        original_time: Option<SlotTime>,
    ) -> Result<(), AppointmentError> {
        if Some(time) == original_time {
            return Ok(());
        }

        let slots = slots_for(professional, kind, &self.policy);
        if !slots.contains(&time) {
            return Err(validation(&format!(
                "{} is not a bookable {} slot for {}",
                time, kind, professional.display_name
            )));
        }

        let filter = AvailabilityFilter::for_kind(kind, &self.policy);
        if filter.is_excluded_by_time(date, time, local_now(self.clock.as_ref())) {
            return Err(validation(&format!(
                "{} on {} has already started or is less than {} minutes away",
                time, date, self.policy.too_soon_minutes
            )));
        }

        Ok(())
    }

    async fn ensure_capacity(&self, scope: &OccupancyScope, time: SlotTime) -> Result<(), AppointmentError> {
        let occupancy = self.occupancy(scope).await?;
        let occupied = occupancy.get(&time).copied().unwrap_or(0);
        let capacity = self.policy.capacity(scope.kind);

        if occupied >= capacity {
            warn!("Slot {} on {} for professional {} is full ({}/{})",
                  time, scope.date, scope.professional_id, occupied, capacity);
            return Err(AppointmentError::SlotFull { date: scope.date, time });
        }

        Ok(())
    }

    /// Notification failures never undo a committed booking.
    async fn notify(&self, professional_id: Uuid, notification: Notification) {
        if let Err(e) = self.notifier.notify(professional_id, notification).await {
            warn!("Failed to notify professional {}: {}", professional_id, e);
        }
    }
}

fn validation(message: &str) -> AppointmentError {
    AppointmentError::ValidationError(message.to_string())
}

fn ensure_professional_matches(professional: &Professional, kind: AppointmentKind) -> Result<(), AppointmentError> {
    if professional.kind != kind.professional_kind() {
        return Err(validation(&format!(
            "{} is a {} and cannot take {} appointments",
            professional.display_name, professional.kind, kind
        )));
    }
    Ok(())
}
