// libs/appointment-cell/src/services/booking.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, FixedOffset, NaiveDate, NaiveTime};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::parse_utc_offset;
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, OccurrenceResult, RecurrenceHorizon,
    RecurrencePattern, RescheduleAppointmentRequest, RescheduleResult, SeriesBookingResult, StaffMember, TimeRange,
    UpdateSeriesPatternRequest, UpdateStatusRequest,
};
use crate::services::calendar::{CalendarStore, StoreError};
use crate::services::conflict::ConflictValidator;
use crate::services::events::{EventPublisher, SchedulingEvent};
use crate::services::lifecycle::{AppointmentLifecycle, StatusTransition};
use crate::services::recurrence::RecurrenceExpander;

const MIN_DURATION_MINUTES: u32 = 5;
const MAX_DURATION_MINUTES: u32 = 480;
const SERIES_CONCURRENCY: usize = 4;
const EXCEPTION_SKIP_REASON: &str = "occurrence modified individually";
const KEPT_SKIP_REASON: &str = "occurrence changed during regeneration";

/// Validated booking input: the template record plus what it is checked against.
struct PreparedBooking {
    staff: StaffMember,
    offset: FixedOffset,
    appointment: Appointment,
}

pub struct AppointmentBookingService {
    store: Arc<dyn CalendarStore>,
    validator: Arc<ConflictValidator>,
    lifecycle: AppointmentLifecycle,
    events: EventPublisher,
}

impl AppointmentBookingService {
    pub fn new(validator: Arc<ConflictValidator>, events: EventPublisher) -> Self {
        Self {
            store: validator.store(),
            lifecycle: AppointmentLifecycle::new(validator.config().min_outcome_notes_length),
            validator,
            events,
        }
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    #[instrument(skip(self, request, user), fields(staff_id = %request.staff_id, date = %request.date))]
    pub async fn create(&self, request: BookAppointmentRequest, user: &User) -> Result<Appointment, AppointmentError> {
        let prepared = self.prepare(&request, user).await?;
        let stored = self
            .place(prepared.appointment, &prepared.staff, prepared.offset)
            .await?;

        info!(
            "Appointment {} booked for staff {} on {} at {}",
            stored.id,
            stored.staff_id,
            stored.date,
            stored.time_range()
        );
        self.events.publish(SchedulingEvent::AppointmentBooked {
            appointment_id: stored.id,
            staff_id: stored.staff_id,
            date: stored.date,
        });

        Ok(stored)
    }

    /// Books every occurrence independently; rejections become skipped
    /// entries instead of failing the series.
    #[instrument(skip(self, request, user), fields(staff_id = %request.staff_id, date = %request.date))]
    pub async fn create_series(
        &self,
        request: BookAppointmentRequest,
        user: &User,
    ) -> Result<SeriesBookingResult, AppointmentError> {
        let pattern = request
            .recurrence
            .clone()
            .ok_or_else(|| AppointmentError::Validation("recurrence pattern is required".to_string()))?;
        self.check_pattern(&pattern, request.date)?;
        let horizon = self.horizon(request.date, request.max_occurrences)?;

        let prepared = self.prepare(&request, user).await?;
        let series_id = Uuid::new_v4();
        let dates = RecurrenceExpander::generate_dates(request.date, &pattern, horizon);
        debug!("Series {} expands to {} dates", series_id, dates.len());

        let occurrences = self
            .expand(series_id, &pattern, &prepared, dates, &HashMap::new())
            .await;
        let result = SeriesBookingResult::new(series_id, occurrences);

        info!(
            "Series {} booked: {} created, {} skipped",
            series_id, result.created_count, result.skipped_count
        );
        self.events.publish(SchedulingEvent::SeriesExpanded {
            series_id,
            created: result.created_count,
            skipped: result.skipped_count,
        });

        Ok(result)
    }

    /// Replaces a series' future occurrences with an expansion of the new
    /// pattern. Occurrences changed one by one keep their dates.
    #[instrument(skip(self, request, user))]
    pub async fn regenerate_series(
        &self,
        series_id: Uuid,
        request: UpdateSeriesPatternRequest,
        user: &User,
    ) -> Result<SeriesBookingResult, AppointmentError> {
        let pattern = request.recurrence;
        let occurrences = self.store.series_occurrences(series_id).await?;

        fn origin(apt: &Appointment) -> NaiveDate {
            apt.recurrence_origin_date.unwrap_or(apt.date)
        }

        let anchor = occurrences
            .iter()
            .map(origin)
            .min()
            .ok_or(AppointmentError::SeriesNotFound(series_id))?;
        let template = occurrences
            .iter()
            .filter(|apt| !apt.is_recurring_exception)
            .min_by_key(|apt| (origin(apt), apt.date))
            .or_else(|| occurrences.first())
            .cloned()
            .ok_or(AppointmentError::SeriesNotFound(series_id))?;

        self.check_pattern(&pattern, anchor)?;
        let horizon = self.horizon(anchor, request.max_occurrences)?;

        let staff = self.bookable_staff(template.staff_id).await?;
        let offset = parse_utc_offset(&template.timezone).unwrap_or(self.validator.config().timezone);
        let today = self.validator.today();
        let now = self.validator.now();

        // Dates that stay with an existing record, mapped to the skip reason
        // reported when the new pattern lands on them.
        let mut owned = HashMap::new();
        let mut removed = 0usize;
        for occurrence in &occurrences {
            let replaceable = matches!(
                occurrence.status,
                AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
            );
            if occurrence.date >= today && replaceable && !occurrence.is_recurring_exception {
                let mut deleted = occurrence.clone();
                deleted.is_deleted = true;
                deleted.updated_at = now;
                match self.store.update_appointment(deleted, occurrence.version).await {
                    Ok(_) => removed += 1,
                    Err(e) => {
                        // The record survives, so its date is not re-booked.
                        warn!(
                            "Series {}: could not remove occurrence {} ({}), keeping it",
                            series_id, occurrence.id, e
                        );
                        owned.insert(origin(occurrence), KEPT_SKIP_REASON);
                    }
                }
            } else if origin(occurrence) >= today {
                owned.insert(origin(occurrence), EXCEPTION_SKIP_REASON);
            }
        }
        debug!("Series {}: removed {} future occurrences, {} kept", series_id, removed, owned.len());

        let prepared = PreparedBooking {
            staff,
            offset,
            appointment: Appointment {
                id: Uuid::new_v4(),
                status: AppointmentStatus::Scheduled,
                recurrence: Some(pattern.clone()),
                is_recurring_exception: false,
                rescheduled_from: None,
                rescheduled_to: None,
                cancellation_reason: None,
                outcome: None,
                created_at: now,
                updated_at: now,
                created_by: user.id.clone(),
                is_deleted: false,
                version: 0,
                ..template
            },
        };

        let dates: Vec<NaiveDate> = RecurrenceExpander::generate_dates(anchor, &pattern, horizon)
            .into_iter()
            .filter(|date| *date >= today)
            .collect();
        let occurrences = self.expand(series_id, &pattern, &prepared, dates, &owned).await;
        let result = SeriesBookingResult::new(series_id, occurrences);

        info!(
            "Series {} regenerated: {} created, {} skipped",
            series_id, result.created_count, result.skipped_count
        );
        self.events.publish(SchedulingEvent::SeriesExpanded {
            series_id,
            created: result.created_count,
            skipped: result.skipped_count,
        });

        Ok(result)
    }

    // ==============================================================================
    // LIFECYCLE
    // ==============================================================================

    #[instrument(skip(self, request), fields(target = %request.status))]
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        request: UpdateStatusRequest,
    ) -> Result<Appointment, AppointmentError> {
        let mut retried = false;
        loop {
            let current = self.get(appointment_id).await?;
            let transition = self.lifecycle.transition_for(current.status, request.clone())?;
            let updated = self.lifecycle.apply(&current, transition, self.validator.now())?;

            match self.store.update_appointment(updated, current.version).await {
                Ok(stored) => {
                    info!("Appointment {} moved {} -> {}", stored.id, current.status, stored.status);
                    self.events.publish(SchedulingEvent::AppointmentStatusChanged {
                        appointment_id: stored.id,
                        from: current.status,
                        to: stored.status,
                    });
                    return Ok(stored);
                }
                Err(StoreError::VersionConflict { .. }) if !retried => {
                    warn!("Appointment {} changed during status update, retrying", appointment_id);
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Moves the appointment to `rescheduled` and creates its replacement in
    /// one store operation. The old record is never edited in place.
    #[instrument(skip(self, request, user))]
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
        user: &User,
    ) -> Result<RescheduleResult, AppointmentError> {
        let mut retried = false;
        loop {
            let current = self.get(appointment_id).await?;
            if !AppointmentLifecycle::can_transition(current.status, AppointmentStatus::Rescheduled) {
                return Err(AppointmentError::InvalidTransition {
                    from: current.status,
                    to: AppointmentStatus::Rescheduled,
                });
            }

            let duration = request.duration_minutes.unwrap_or(current.duration_minutes);
            let range = Self::checked_range(request.time, duration)?;
            let staff = self.bookable_staff(request.staff_id.unwrap_or(current.staff_id)).await?;
            let offset = parse_utc_offset(&current.timezone).unwrap_or(self.validator.config().timezone);

            self.validator
                .check(&staff, request.date, &range, offset, Some(current.id))
                .await?;

            let now = self.validator.now();
            let replacement = Appointment {
                id: Uuid::new_v4(),
                staff_id: staff.id,
                date: request.date,
                time: request.time,
                duration_minutes: duration,
                status: AppointmentStatus::Scheduled,
                recurrence_origin_date: current
                    .recurrence_origin_date
                    .or_else(|| current.series_id.map(|_| current.date)),
                is_recurring_exception: current.series_id.is_some(),
                rescheduled_from: Some(current.id),
                rescheduled_to: None,
                cancellation_reason: None,
                outcome: None,
                created_at: now,
                updated_at: now,
                created_by: user.id.clone(),
                is_deleted: false,
                version: 0,
                ..current.clone()
            };

            let mut previous = self.lifecycle.apply(
                &current,
                StatusTransition::Reschedule {
                    reason: request.reason.clone(),
                },
                now,
            )?;
            previous.rescheduled_to = Some(replacement.id);

            match self.store.replace_appointment(previous, current.version, replacement).await {
                Ok((previous, replacement)) => {
                    info!("Appointment {} rescheduled to {}", previous.id, replacement.id);
                    self.events.publish(SchedulingEvent::AppointmentRescheduled {
                        previous_id: previous.id,
                        replacement_id: replacement.id,
                    });
                    return Ok(RescheduleResult { previous, replacement });
                }
                Err(StoreError::SlotTaken { .. } | StoreError::VersionConflict { .. }) if !retried => {
                    warn!("Reschedule of {} lost a race, re-validating", appointment_id);
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn soft_delete(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let mut retried = false;
        loop {
            let current = self.get(appointment_id).await?;
            let mut deleted = current.clone();
            deleted.is_deleted = true;
            deleted.updated_at = self.validator.now();

            match self.store.update_appointment(deleted, current.version).await {
                Ok(stored) => {
                    info!("Appointment {} deleted", stored.id);
                    return Ok(stored);
                }
                Err(StoreError::VersionConflict { .. }) if !retried => retried = true,
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store
            .appointment(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))
    }

    pub async fn list_for_staff(&self, staff_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, AppointmentError> {
        self.validator.staff(staff_id).await?;
        Ok(self.store.appointments_for(staff_id, date).await?)
    }

    // ==============================================================================
    // HELPERS
    // ==============================================================================

    /// Validate, then insert atomically. A lost race is re-validated once
    /// against the fresh calendar before it surfaces as a conflict.
    async fn place(
        &self,
        appointment: Appointment,
        staff: &StaffMember,
        offset: FixedOffset,
    ) -> Result<Appointment, AppointmentError> {
        let range = appointment.time_range();
        let mut retried = false;
        loop {
            self.validator.check(staff, appointment.date, &range, offset, None).await?;

            match self.store.insert_if_free(appointment.clone()).await {
                Ok(stored) => return Ok(stored),
                Err(StoreError::SlotTaken { .. }) if !retried => {
                    warn!("Lost race for {} on {}, re-validating", range, appointment.date);
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn expand(
        &self,
        series_id: Uuid,
        pattern: &RecurrencePattern,
        prepared: &PreparedBooking,
        dates: Vec<NaiveDate>,
        owned: &HashMap<NaiveDate, &'static str>,
    ) -> Vec<OccurrenceResult> {
        stream::iter(dates)
            .map(move |date| async move {
                if let Some(reason) = owned.get(&date) {
                    return OccurrenceResult::skipped(date, *reason);
                }

                let mut occurrence = prepared.appointment.clone();
                occurrence.id = Uuid::new_v4();
                occurrence.date = date;
                occurrence.series_id = Some(series_id);
                occurrence.recurrence = Some(pattern.clone());
                occurrence.recurrence_origin_date = Some(date);

                match self.place(occurrence, &prepared.staff, prepared.offset).await {
                    Ok(stored) => OccurrenceResult::created(date, stored.id),
                    Err(AppointmentError::Rejected(reason)) => OccurrenceResult::skipped(date, reason.to_string()),
                    Err(e) => {
                        warn!("Occurrence {} of series {} failed: {}", date, series_id, e);
                        OccurrenceResult::skipped(date, e.to_string())
                    }
                }
            })
            .buffered(SERIES_CONCURRENCY)
            .collect()
            .await
    }

    async fn prepare(&self, request: &BookAppointmentRequest, user: &User) -> Result<PreparedBooking, AppointmentError> {
        let duration = request
            .duration_minutes
            .unwrap_or_else(|| request.appointment_type.default_duration_minutes());
        Self::checked_range(request.time, duration)?;

        let (offset, timezone) = match request.timezone.as_deref() {
            Some(raw) => {
                let offset = parse_utc_offset(raw)
                    .ok_or_else(|| AppointmentError::Validation(format!("invalid timezone offset '{}'", raw)))?;
                (offset, offset.to_string())
            }
            None => {
                let offset = self.validator.config().timezone;
                (offset, offset.to_string())
            }
        };

        let workplace_id = request
            .workplace_id
            .or(user.workplace_id)
            .ok_or_else(|| AppointmentError::Validation("workplace_id is required".to_string()))?;

        let staff = self.bookable_staff(request.staff_id).await?;
        let now = self.validator.now();

        let appointment = Appointment {
            id: Uuid::new_v4(),
            workplace_id,
            patient_id: request.patient_id,
            staff_id: staff.id,
            appointment_type: request.appointment_type,
            date: request.date,
            time: request.time,
            duration_minutes: duration,
            timezone,
            status: AppointmentStatus::Scheduled,
            notes: request
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            recurrence: None,
            series_id: None,
            recurrence_origin_date: None,
            is_recurring_exception: false,
            rescheduled_from: None,
            rescheduled_to: None,
            cancellation_reason: None,
            outcome: None,
            created_at: now,
            updated_at: now,
            created_by: user.id.clone(),
            is_deleted: false,
            version: 0,
        };

        Ok(PreparedBooking {
            staff,
            offset,
            appointment,
        })
    }

    async fn bookable_staff(&self, staff_id: Uuid) -> Result<StaffMember, AppointmentError> {
        let staff = self.validator.staff(staff_id).await?;
        if !staff.is_active {
            return Err(AppointmentError::Validation(format!("staff member {} is inactive", staff_id)));
        }
        Ok(staff)
    }

    fn checked_range(time: NaiveTime, duration: u32) -> Result<TimeRange, AppointmentError> {
        if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&duration) {
            return Err(AppointmentError::Validation(format!(
                "duration must be between {} and {} minutes",
                MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
            )));
        }
        let range = TimeRange::new(time, duration);
        if !range.fits_in_day() {
            return Err(AppointmentError::Validation("appointment must end by midnight".to_string()));
        }
        Ok(range)
    }

    fn check_pattern(&self, pattern: &RecurrencePattern, anchor: NaiveDate) -> Result<(), AppointmentError> {
        RecurrenceExpander::validate_pattern(pattern)?;
        if pattern.end_date.is_some_and(|end| end < anchor) {
            return Err(AppointmentError::Validation(
                "recurrence end_date must not be before the first occurrence".to_string(),
            ));
        }
        Ok(())
    }

    fn horizon(&self, anchor: NaiveDate, requested: Option<usize>) -> Result<RecurrenceHorizon, AppointmentError> {
        let config = self.validator.config();
        let max_occurrences = requested.unwrap_or(config.max_occurrences);
        if max_occurrences == 0 {
            return Err(AppointmentError::Validation("max_occurrences must be at least 1".to_string()));
        }

        Ok(RecurrenceHorizon {
            max_occurrences: max_occurrences.min(config.max_occurrences),
            until: anchor + Duration::days(config.recurrence_horizon_days as i64),
        })
    }
}
