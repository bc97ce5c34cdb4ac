// libs/appointment-cell/src/services/calendar.rs
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, StaffMember, TimeOffRequest, TimeOffStatus};
use crate::services::conflict::first_conflict;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The atomic insert found an overlapping active appointment.
    #[error("slot already taken for staff {staff_id} on {date}")]
    SlotTaken { staff_id: Uuid, date: NaiveDate },

    /// Compare-and-swap on `version` failed.
    #[error("record {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: Uuid, expected: i64 },

    /// Conditional time-off write found the request in another status.
    #[error("time-off request {id} is no longer {expected}")]
    StatusConflict { id: Uuid, expected: TimeOffStatus },

    #[error("record not found: {0}")]
    NotFound(Uuid),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SlotTaken { .. } | StoreError::VersionConflict { .. } | StoreError::StatusConflict { .. } => {
                AppointmentError::ConcurrencyConflict
            }
            StoreError::NotFound(id) => AppointmentError::NotFound(id),
            StoreError::Backend(msg) => AppointmentError::Store(msg),
        }
    }
}

/// Authoritative calendar for one scheduling domain.
///
/// Reads return soft-deleted records filtered out; callers decide which
/// statuses occupy the calendar. The three write paths for appointments are
/// atomic with respect to each other: an insert re-checks overlaps under the
/// same guard that performs the write, and updates are compare-and-swap on
/// `Appointment::version`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn list_staff(&self) -> Result<Vec<StaffMember>, StoreError>;

    async fn staff_member(&self, staff_id: Uuid) -> Result<Option<StaffMember>, StoreError>;

    /// Appointments for one staff member on one day, ordered by start time.
    async fn appointments_for(&self, staff_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError>;

    /// Appointments with `start <= date <= end`, ordered by date then time.
    async fn appointments_between(
        &self,
        staff_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn series_occurrences(&self, series_id: Uuid) -> Result<Vec<Appointment>, StoreError>;

    async fn insert_if_free(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    async fn update_appointment(&self, appointment: Appointment, expected_version: i64) -> Result<Appointment, StoreError>;

    /// Writes the superseded record and its replacement in one step. The
    /// replacement's slot is checked with `previous` excluded.
    async fn replace_appointment(
        &self,
        previous: Appointment,
        expected_version: i64,
        replacement: Appointment,
    ) -> Result<(Appointment, Appointment), StoreError>;

    /// The approved time-off covering `date`, if any.
    async fn time_off_for(&self, staff_id: Uuid, date: NaiveDate) -> Result<Option<TimeOffRequest>, StoreError>;

    async fn time_off_requests_for(&self, staff_id: Uuid) -> Result<Vec<TimeOffRequest>, StoreError>;

    async fn time_off(&self, id: Uuid) -> Result<Option<TimeOffRequest>, StoreError>;

    async fn insert_time_off(&self, request: TimeOffRequest) -> Result<TimeOffRequest, StoreError>;

    /// Writes only while the stored request still has `expected_status`.
    async fn update_time_off(
        &self,
        request: TimeOffRequest,
        expected_status: TimeOffStatus,
    ) -> Result<TimeOffRequest, StoreError>;
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

#[derive(Default)]
struct CalendarState {
    staff: HashMap<Uuid, StaffMember>,
    appointments: HashMap<Uuid, Appointment>,
    // (staff, day) -> appointment ids sorted by start time
    day_index: HashMap<(Uuid, NaiveDate), Vec<Uuid>>,
    time_off: HashMap<Uuid, TimeOffRequest>,
}

impl CalendarState {
    fn day(&self, staff_id: Uuid, date: NaiveDate) -> Vec<Appointment> {
        self.day_index
            .get(&(staff_id, date))
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.appointments.get(id))
                    .filter(|apt| !apt.is_deleted)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn ensure_free(&self, candidate: &Appointment, exclude: Option<Uuid>) -> Result<(), StoreError> {
        if !candidate.occupies_calendar() {
            return Ok(());
        }

        let existing = self.day(candidate.staff_id, candidate.date);
        if let Some(conflict) = first_conflict(&existing, &candidate.time_range(), exclude) {
            debug!(
                "Atomic check rejected {} on {}: overlaps {}",
                candidate.time_range(),
                candidate.date,
                conflict.id
            );
            return Err(StoreError::SlotTaken {
                staff_id: candidate.staff_id,
                date: candidate.date,
            });
        }

        Ok(())
    }

    fn index(&mut self, appointment: &Appointment) {
        let key = (appointment.staff_id, appointment.date);
        let mut ids = self.day_index.remove(&key).unwrap_or_default();
        ids.push(appointment.id);
        ids.sort_by_key(|id| self.appointments.get(id).map(|apt| (apt.time, apt.id)));
        self.day_index.insert(key, ids);
    }

    fn check_version(&self, id: Uuid, expected: i64) -> Result<(), StoreError> {
        let current = self.appointments.get(&id).ok_or(StoreError::NotFound(id))?;
        if current.version != expected {
            return Err(StoreError::VersionConflict { id, expected });
        }
        Ok(())
    }
}

/// Process-local calendar guarded by a single lock. Suitable for a single API
/// instance and for tests; no lock is held across an await point.
#[derive(Default)]
pub struct InMemoryCalendarStore {
    state: RwLock<CalendarState>,
}

impl InMemoryCalendarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_staff(staff: Vec<StaffMember>) -> Self {
        let store = Self::new();
        for member in staff {
            store.upsert_staff(member);
        }
        store
    }

    /// Staff records come from the directory service; this seeds them locally.
    pub fn upsert_staff(&self, staff: StaffMember) {
        match self.state.write() {
            Ok(mut state) => {
                state.staff.insert(staff.id, staff);
            }
            Err(_) => warn!("Calendar state lock poisoned; staff record {} not stored", staff.id),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CalendarState>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("calendar state lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CalendarState>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("calendar state lock poisoned".to_string()))
    }
}

#[async_trait]
impl CalendarStore for InMemoryCalendarStore {
    async fn list_staff(&self) -> Result<Vec<StaffMember>, StoreError> {
        let state = self.read()?;
        let mut staff: Vec<StaffMember> = state.staff.values().cloned().collect();
        staff.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
        Ok(staff)
    }

    async fn staff_member(&self, staff_id: Uuid) -> Result<Option<StaffMember>, StoreError> {
        Ok(self.read()?.staff.get(&staff_id).cloned())
    }

    async fn appointments_for(&self, staff_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        Ok(self.read()?.day(staff_id, date))
    }

    async fn appointments_between(
        &self,
        staff_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Appointment>, StoreError> {
        let state = self.read()?;
        let mut result: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|apt| apt.staff_id == staff_id && !apt.is_deleted && apt.date >= start && apt.date <= end)
            .cloned()
            .collect();
        result.sort_by_key(|apt| (apt.date, apt.time, apt.id));
        Ok(result)
    }

    async fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.read()?.appointments.get(&id).filter(|apt| !apt.is_deleted).cloned())
    }

    async fn series_occurrences(&self, series_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let state = self.read()?;
        let mut result: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|apt| apt.belongs_to_series(series_id) && !apt.is_deleted)
            .cloned()
            .collect();
        result.sort_by_key(|apt| (apt.date, apt.time, apt.id));
        Ok(result)
    }

    async fn insert_if_free(&self, mut appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut state = self.write()?;

        if state.appointments.contains_key(&appointment.id) {
            return Err(StoreError::Backend(format!("duplicate appointment id {}", appointment.id)));
        }
        state.ensure_free(&appointment, None)?;

        appointment.version = 1;
        state.appointments.insert(appointment.id, appointment.clone());
        state.index(&appointment);
        Ok(appointment)
    }

    async fn update_appointment(&self, mut appointment: Appointment, expected_version: i64) -> Result<Appointment, StoreError> {
        let mut state = self.write()?;
        state.check_version(appointment.id, expected_version)?;

        appointment.version = expected_version + 1;
        state.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn replace_appointment(
        &self,
        mut previous: Appointment,
        expected_version: i64,
        mut replacement: Appointment,
    ) -> Result<(Appointment, Appointment), StoreError> {
        let mut state = self.write()?;
        state.check_version(previous.id, expected_version)?;
        if state.appointments.contains_key(&replacement.id) {
            return Err(StoreError::Backend(format!("duplicate appointment id {}", replacement.id)));
        }
        state.ensure_free(&replacement, Some(previous.id))?;

        previous.version = expected_version + 1;
        replacement.version = 1;
        state.appointments.insert(previous.id, previous.clone());
        state.appointments.insert(replacement.id, replacement.clone());
        state.index(&replacement);
        Ok((previous, replacement))
    }

    async fn time_off_for(&self, staff_id: Uuid, date: NaiveDate) -> Result<Option<TimeOffRequest>, StoreError> {
        let state = self.read()?;
        let mut approved: Vec<&TimeOffRequest> = state
            .time_off
            .values()
            .filter(|t| t.staff_id == staff_id && t.status == crate::models::TimeOffStatus::Approved && t.covers(date))
            .collect();
        approved.sort_by_key(|t| (t.start_date, t.id));
        Ok(approved.first().map(|t| (*t).clone()))
    }

    async fn time_off_requests_for(&self, staff_id: Uuid) -> Result<Vec<TimeOffRequest>, StoreError> {
        let state = self.read()?;
        let mut requests: Vec<TimeOffRequest> = state
            .time_off
            .values()
            .filter(|t| t.staff_id == staff_id)
            .cloned()
            .collect();
        requests.sort_by_key(|t| (t.start_date, t.id));
        Ok(requests)
    }

    async fn time_off(&self, id: Uuid) -> Result<Option<TimeOffRequest>, StoreError> {
        Ok(self.read()?.time_off.get(&id).cloned())
    }

    async fn insert_time_off(&self, request: TimeOffRequest) -> Result<TimeOffRequest, StoreError> {
        let mut state = self.write()?;

        // Same-staff open ranges must stay disjoint so a day has at most one
        // active absence.
        let clash = state.time_off.values().any(|existing| {
            existing.staff_id == request.staff_id
                && existing.is_open()
                && existing.overlaps_dates(request.start_date, request.end_date)
        });
        if clash {
            return Err(StoreError::Backend(format!(
                "time-off range {}..{} overlaps an open request",
                request.start_date, request.end_date
            )));
        }

        state.time_off.insert(request.id, request.clone());
        Ok(request)
    }

    async fn update_time_off(
        &self,
        request: TimeOffRequest,
        expected_status: TimeOffStatus,
    ) -> Result<TimeOffRequest, StoreError> {
        let mut state = self.write()?;
        let current = state.time_off.get(&request.id).ok_or(StoreError::NotFound(request.id))?;
        if current.status != expected_status {
            return Err(StoreError::StatusConflict {
                id: request.id,
                expected: expected_status,
            });
        }
        state.time_off.insert(request.id, request.clone());
        Ok(request)
    }
}
