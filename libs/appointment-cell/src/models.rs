// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use shared_config::WorkingHours;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub workplace_id: Uuid,
    pub patient_id: Uuid,
    pub staff_id: Uuid,
    pub appointment_type: AppointmentType,
    pub date: NaiveDate,
    #[serde(with = "shared_config::hhmm")]
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub timezone: String,
    pub status: AppointmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrencePattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_id: Option<Uuid>,
    /// Date the series generated this occurrence for; survives rescheduling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_origin_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_recurring_exception: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescheduled_from: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescheduled_to: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<AppointmentOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub version: i64,
}

impl Appointment {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.time, self.duration_minutes)
    }

    /// Soft-deleted records and non-active statuses never block a slot.
    pub fn occupies_calendar(&self) -> bool {
        !self.is_deleted && self.status.occupies_calendar()
    }

    pub fn belongs_to_series(&self, series_id: Uuid) -> bool {
        self.series_id == Some(series_id)
    }
}

/// Half-open `[start, end)` interval within one day, in minutes from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeRange {
    pub start_minute: u32,
    pub end_minute: u32,
}

impl TimeRange {
    pub fn new(start: NaiveTime, duration_minutes: u32) -> Self {
        let start_minute = minute_of_day(start);
        Self {
            start_minute,
            end_minute: start_minute + duration_minutes,
        }
    }

    pub fn start_time(&self) -> Option<NaiveTime> {
        time_from_minute(self.start_minute)
    }

    pub fn end_time(&self) -> Option<NaiveTime> {
        time_from_minute(self.end_minute)
    }

    /// Ends no later than midnight.
    pub fn fits_in_day(&self) -> bool {
        self.end_minute <= 24 * 60
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start_minute / 60,
            self.start_minute % 60,
            self.end_minute / 60,
            self.end_minute % 60
        )
    }
}

pub fn minute_of_day(time: NaiveTime) -> u32 {
    use chrono::Timelike;
    time.hour() * 60 + time.minute()
}

pub fn time_from_minute(minute: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
}

/// Converts a wall-clock booking into an instant using its UTC offset.
pub fn local_instant(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 7] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
        AppointmentStatus::Rescheduled,
    ];

    pub fn occupies_calendar(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed | AppointmentStatus::InProgress
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.occupies_calendar()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    MtmSession,
    ChronicDiseaseReview,
    NewMedicationConsultation,
    Vaccination,
    HealthCheck,
    SmokingCessation,
    GeneralFollowup,
}

impl AppointmentType {
    pub fn default_duration_minutes(&self) -> u32 {
        match self {
            AppointmentType::MtmSession => 45,
            AppointmentType::ChronicDiseaseReview => 30,
            AppointmentType::NewMedicationConsultation => 20,
            AppointmentType::Vaccination => 15,
            AppointmentType::HealthCheck => 30,
            AppointmentType::SmokingCessation => 30,
            AppointmentType::GeneralFollowup => 15,
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::MtmSession => write!(f, "mtm_session"),
            AppointmentType::ChronicDiseaseReview => write!(f, "chronic_disease_review"),
            AppointmentType::NewMedicationConsultation => write!(f, "new_medication_consultation"),
            AppointmentType::Vaccination => write!(f, "vaccination"),
            AppointmentType::HealthCheck => write!(f, "health_check"),
            AppointmentType::SmokingCessation => write!(f, "smoking_cessation"),
            AppointmentType::GeneralFollowup => write!(f, "general_followup"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Successful,
    PartiallySuccessful,
    Unsuccessful,
}

/// Post-visit record; required to move an appointment to `completed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentOutcome {
    pub status: OutcomeStatus,
    pub notes: String,
    #[serde(default)]
    pub next_actions: Vec<String>,
    #[serde(default)]
    pub visit_created: bool,
}

// ==============================================================================
// RECURRENCE MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceFrequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecurrencePattern {
    pub frequency: RecurrenceFrequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// 0 = Sunday .. 6 = Saturday; weekly and biweekly only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
}

fn default_interval() -> u32 {
    1
}

/// Both bounds are always applied; whichever is reached first stops expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceHorizon {
    pub max_occurrences: usize,
    pub until: NaiveDate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceStatus {
    Created,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OccurrenceResult {
    pub date: NaiveDate,
    pub status: OccurrenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OccurrenceResult {
    pub fn created(date: NaiveDate, appointment_id: Uuid) -> Self {
        Self {
            date,
            status: OccurrenceStatus::Created,
            appointment_id: Some(appointment_id),
            reason: None,
        }
    }

    pub fn skipped(date: NaiveDate, reason: impl Into<String>) -> Self {
        Self {
            date,
            status: OccurrenceStatus::Skipped,
            appointment_id: None,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesBookingResult {
    pub series_id: Uuid,
    pub occurrences: Vec<OccurrenceResult>,
    pub created_count: usize,
    pub skipped_count: usize,
}

impl SeriesBookingResult {
    pub fn new(series_id: Uuid, occurrences: Vec<OccurrenceResult>) -> Self {
        let created_count = occurrences
            .iter()
            .filter(|o| o.status == OccurrenceStatus::Created)
            .count();
        let skipped_count = occurrences.len() - created_count;
        Self {
            series_id,
            occurrences,
            created_count,
            skipped_count,
        }
    }
}

// ==============================================================================
// STAFF AND TIME-OFF MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaffMember {
    pub id: Uuid,
    pub workplace_id: Uuid,
    pub display_name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_hours: Option<WorkingHours>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeOffType {
    Vacation,
    Sick,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimeOffStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for TimeOffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeOffStatus::Pending => write!(f, "pending"),
            TimeOffStatus::Approved => write!(f, "approved"),
            TimeOffStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeOffRequest {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub time_off_type: TimeOffType,
    pub status: TimeOffStatus,
    #[serde(default)]
    pub affected_appointment_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TimeOffRequest {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn overlaps_dates(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && start <= self.end_date
    }

    /// Pending and approved requests both reserve their date range.
    pub fn is_open(&self) -> bool {
        matches!(self.status, TimeOffStatus::Pending | TimeOffStatus::Approved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImpactRecord {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "shared_config::hhmm")]
    pub time: NaiveTime,
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
}

impl From<&Appointment> for ImpactRecord {
    fn from(appointment: &Appointment) -> Self {
        Self {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            date: appointment.date,
            time: appointment.time,
            duration_minutes: appointment.duration_minutes,
            status: appointment.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeOffDecision {
    pub time_off: TimeOffRequest,
    pub affected_appointments: Vec<ImpactRecord>,
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    InThePast,
    OverlapsExistingAppointment,
    StaffOnTimeOff,
    OutsideWorkingHours,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::InThePast => write!(f, "date/time is in the past"),
            ConflictReason::OverlapsExistingAppointment => write!(f, "overlaps existing appointment"),
            ConflictReason::StaffOnTimeOff => write!(f, "staff on time off"),
            ConflictReason::OutsideWorkingHours => write!(f, "outside working hours"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    #[serde(with = "shared_config::hhmm")]
    pub time: NaiveTime,
    #[serde(with = "shared_config::hhmm")]
    pub end_time: NaiveTime,
    pub staff_id: Uuid,
    pub staff_name: String,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_reason: Option<ConflictReason>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SlotSummary {
    pub total_slots: usize,
    pub available_slots: usize,
    pub utilization_rate: f64,
}

impl SlotSummary {
    pub fn from_counts(total_slots: usize, available_slots: usize) -> Self {
        let utilization_rate = if total_slots == 0 {
            0.0
        } else {
            1.0 - available_slots as f64 / total_slots as f64
        };
        Self {
            total_slots,
            available_slots,
            utilization_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaffSlotSummary {
    pub staff_id: Uuid,
    pub staff_name: String,
    #[serde(flatten)]
    pub summary: SlotSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlotsResponse {
    pub date: NaiveDate,
    pub duration_minutes: u32,
    pub slots: Vec<Slot>,
    pub summary: SlotSummary,
    pub per_staff_breakdown: Vec<StaffSlotSummary>,
}

impl AvailableSlotsResponse {
    pub fn empty(date: NaiveDate, duration_minutes: u32) -> Self {
        Self {
            date,
            duration_minutes,
            slots: Vec::new(),
            summary: SlotSummary::default(),
            per_staff_breakdown: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextAvailableSlot {
    pub date: NaiveDate,
    #[serde(with = "shared_config::hhmm")]
    pub time: NaiveTime,
    #[serde(with = "shared_config::hhmm")]
    pub end_time: NaiveTime,
    pub staff_id: Uuid,
    pub staff_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotValidation {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ConflictReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<Slot>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
    pub staff_id: Option<Uuid>,
    pub duration: Option<u32>,
    pub appointment_type: Option<AppointmentType>,
    pub include_unavailable: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextAvailableQuery {
    pub staff_id: Uuid,
    pub duration: Option<u32>,
    pub appointment_type: Option<AppointmentType>,
    pub days_ahead: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateSlotQuery {
    pub staff_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "shared_config::hhmm")]
    pub time: NaiveTime,
    pub duration: Option<u32>,
    pub appointment_type: Option<AppointmentType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub workplace_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub staff_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "shared_config::hhmm")]
    pub time: NaiveTime,
    pub duration_minutes: Option<u32>,
    pub appointment_type: AppointmentType,
    pub timezone: Option<String>,
    pub notes: Option<String>,
    pub recurrence: Option<RecurrencePattern>,
    pub max_occurrences: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
    pub outcome: Option<AppointmentOutcome>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: NaiveDate,
    #[serde(with = "shared_config::hhmm")]
    pub time: NaiveTime,
    pub duration_minutes: Option<u32>,
    pub staff_id: Option<Uuid>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleResult {
    pub previous: Appointment,
    pub replacement: Appointment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSeriesPatternRequest {
    pub recurrence: RecurrencePattern,
    pub max_occurrences: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeOffSubmission {
    pub staff_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub time_off_type: TimeOffType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffDayQuery {
    pub date: NaiveDate,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("Staff member not found: {0}")]
    StaffNotFound(Uuid),

    #[error("Time-off request not found: {0}")]
    TimeOffNotFound(Uuid),

    #[error("Recurring series not found: {0}")]
    SeriesNotFound(Uuid),

    #[error("{0}")]
    Rejected(ConflictReason),

    #[error("no handler accepts this source/target pair: {from} -> {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("an appointment cannot be completed without an outcome record")]
    OutcomeRequired,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("The slot changed while booking; please try again")]
    ConcurrencyConflict,

    #[error("Calendar store error: {0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_overlap_boundaries() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        let range = TimeRange::new(t(10, 0), 30);

        assert_eq!(range.start_minute, 600);
        assert_eq!(range.end_minute, 630);
        assert_eq!(range.end_time(), Some(t(10, 30)));
        assert_eq!(range.to_string(), "10:00-10:30");
        assert!(TimeRange::new(t(23, 30), 30).fits_in_day());
        assert!(!TimeRange::new(t(23, 45), 30).fits_in_day());
    }

    #[test]
    fn test_status_occupancy() {
        let occupying: Vec<_> = AppointmentStatus::ALL
            .iter()
            .filter(|s| s.occupies_calendar())
            .collect();
        assert_eq!(occupying.len(), 3);
        assert!(AppointmentStatus::Rescheduled.is_terminal());
        assert!(AppointmentStatus::NoShow.is_terminal());
    }

    #[test]
    fn test_wire_formats() {
        assert_eq!(serde_json::to_string(&AppointmentType::MtmSession).unwrap(), "\"mtm_session\"");
        assert_eq!(serde_json::to_string(&AppointmentStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!(
            serde_json::to_string(&ConflictReason::StaffOnTimeOff).unwrap(),
            "\"staff_on_time_off\""
        );

        let pattern: RecurrencePattern = serde_json::from_str(r#"{"frequency":"weekly"}"#).unwrap();
        assert_eq!(pattern.interval, 1);
        assert!(pattern.days_of_week.is_none());
    }

    #[test]
    fn test_summary_utilization() {
        assert_eq!(SlotSummary::from_counts(0, 0).utilization_rate, 0.0);
        assert_eq!(SlotSummary::from_counts(4, 1).utilization_rate, 0.75);
    }

    #[test]
    fn test_local_instant_applies_offset() {
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 11, 3).unwrap();
        let instant = local_instant(date, NaiveTime::from_hms_opt(9, 0, 0).unwrap(), offset).unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-11-03T01:00:00+00:00");
    }
}
