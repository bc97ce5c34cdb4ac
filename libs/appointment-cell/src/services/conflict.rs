// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use shared_config::SchedulingConfig;

use crate::models::{
    local_instant, minute_of_day, time_from_minute, Appointment, AppointmentError, ConflictReason, StaffMember,
    TimeOffRequest, TimeRange, WorkingHours,
};
use crate::services::calendar::CalendarStore;
use crate::services::clock::Clock;

/// Half-open interval overlap. Touching intervals (`10:00-10:30` and
/// `10:30-11:00`) do not overlap.
pub fn overlaps(existing: &TimeRange, candidate: &TimeRange) -> bool {
    existing.start_minute < candidate.end_minute && candidate.start_minute < existing.end_minute
}

/// First occupying appointment in `existing` that collides with `candidate`.
pub fn first_conflict<'a>(
    existing: &'a [Appointment],
    candidate: &TimeRange,
    exclude: Option<Uuid>,
) -> Option<&'a Appointment> {
    existing
        .iter()
        .filter(|apt| apt.occupies_calendar())
        .filter(|apt| Some(apt.id) != exclude)
        .find(|apt| overlaps(&apt.time_range(), candidate))
}

/// Snapshot of everything that constrains one staff member on one day.
#[derive(Debug, Clone)]
pub struct DayCalendar {
    pub staff: StaffMember,
    pub date: NaiveDate,
    pub appointments: Vec<Appointment>,
    pub time_off: Option<TimeOffRequest>,
    pub working_hours: WorkingHours,
}

impl DayCalendar {
    /// Applies the booking rules in order; the first failing rule wins.
    pub fn evaluate(
        &self,
        candidate: &TimeRange,
        offset: FixedOffset,
        exclude: Option<Uuid>,
        now: DateTime<Utc>,
        enforce_working_hours: bool,
    ) -> Result<(), ConflictReason> {
        if self.starts_in_past(candidate, offset, now) {
            return Err(ConflictReason::InThePast);
        }

        if first_conflict(&self.appointments, candidate, exclude).is_some() {
            return Err(ConflictReason::OverlapsExistingAppointment);
        }

        if self.time_off.as_ref().is_some_and(|t| t.covers(self.date)) {
            return Err(ConflictReason::StaffOnTimeOff);
        }

        if enforce_working_hours && !self.within_working_hours(candidate) {
            return Err(ConflictReason::OutsideWorkingHours);
        }

        Ok(())
    }

    pub fn within_working_hours(&self, candidate: &TimeRange) -> bool {
        self.working_hours.is_working_day(self.date)
            && candidate.start_minute >= minute_of_day(self.working_hours.start)
            && candidate.end_minute <= minute_of_day(self.working_hours.end)
    }

    /// Grid of candidate intervals from the start of working hours.
    pub fn candidates(&self, duration_minutes: u32, granularity_minutes: u32) -> Vec<TimeRange> {
        if !self.working_hours.is_working_day(self.date) || duration_minutes == 0 {
            return Vec::new();
        }

        let step = granularity_minutes.max(1);
        let day_end = minute_of_day(self.working_hours.end);
        let mut start = minute_of_day(self.working_hours.start);
        let mut ranges = Vec::new();

        while start + duration_minutes <= day_end {
            ranges.push(TimeRange {
                start_minute: start,
                end_minute: start + duration_minutes,
            });
            start += step;
        }

        ranges
    }

    fn starts_in_past(&self, candidate: &TimeRange, offset: FixedOffset, now: DateTime<Utc>) -> bool {
        match time_from_minute(candidate.start_minute).and_then(|t| local_instant(self.date, t, offset)) {
            Some(start) => start < now,
            None => true,
        }
    }
}

/// Accepts or rejects candidate bookings against the calendar store.
pub struct ConflictValidator {
    store: Arc<dyn CalendarStore>,
    config: SchedulingConfig,
    clock: Arc<dyn Clock>,
}

impl ConflictValidator {
    pub fn new(store: Arc<dyn CalendarStore>, config: SchedulingConfig, clock: Arc<dyn Clock>) -> Self {
        Self { store, config, clock }
    }

    pub fn config(&self) -> &SchedulingConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn CalendarStore> {
        Arc::clone(&self.store)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Today's date in the configured scheduling timezone.
    pub fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.config.timezone).date_naive()
    }

    pub fn working_hours_for(&self, staff: &StaffMember) -> WorkingHours {
        staff
            .working_hours
            .clone()
            .unwrap_or_else(|| self.config.working_hours.clone())
    }

    pub async fn staff(&self, staff_id: Uuid) -> Result<StaffMember, AppointmentError> {
        self.store
            .staff_member(staff_id)
            .await?
            .ok_or(AppointmentError::StaffNotFound(staff_id))
    }

    pub async fn load_day(&self, staff: &StaffMember, date: NaiveDate) -> Result<DayCalendar, AppointmentError> {
        let appointments = self
            .store
            .appointments_for(staff.id, date)
            .await?
            .into_iter()
            .filter(Appointment::occupies_calendar)
            .collect();
        let time_off = self.store.time_off_for(staff.id, date).await?;

        Ok(DayCalendar {
            staff: staff.clone(),
            date,
            appointments,
            time_off,
            working_hours: self.working_hours_for(staff),
        })
    }

    pub fn evaluate(
        &self,
        day: &DayCalendar,
        candidate: &TimeRange,
        offset: FixedOffset,
        exclude: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(), ConflictReason> {
        day.evaluate(candidate, offset, exclude, now, self.config.enforce_working_hours)
    }

    /// Loads a fresh snapshot and checks one candidate. Rejections surface as
    /// `AppointmentError::Rejected`.
    #[instrument(skip(self, staff), fields(staff_id = %staff.id))]
    pub async fn check(
        &self,
        staff: &StaffMember,
        date: NaiveDate,
        candidate: &TimeRange,
        offset: FixedOffset,
        exclude: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        let day = self.load_day(staff, date).await?;
        self.evaluate(&day, candidate, offset, exclude, self.now()).map_err(|reason| {
            debug!("Candidate {} on {} rejected: {}", candidate, date, reason);
            AppointmentError::Rejected(reason)
        })
    }
}
