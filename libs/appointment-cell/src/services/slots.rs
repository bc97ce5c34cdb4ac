// libs/appointment-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::models::{
    AppointmentError, AppointmentType, AvailableSlotsResponse, NextAvailableQuery, NextAvailableSlot, Slot,
    SlotQuery, SlotSummary, SlotValidation, StaffMember, StaffSlotSummary, TimeRange, ValidateSlotQuery,
};
use crate::services::conflict::{ConflictValidator, DayCalendar};

const MAX_DURATION_MINUTES: u32 = 480;
const MAX_ALTERNATIVES: usize = 3;

/// Produces bookable slots by running every grid candidate through the
/// validator's evaluation, so listings and bookings agree.
pub struct SlotGenerator {
    validator: Arc<ConflictValidator>,
}

impl SlotGenerator {
    pub fn new(validator: Arc<ConflictValidator>) -> Self {
        Self { validator }
    }

    pub fn resolve_duration(
        &self,
        duration: Option<u32>,
        appointment_type: Option<AppointmentType>,
    ) -> Result<u32, AppointmentError> {
        let minutes = duration
            .or_else(|| appointment_type.map(|t| t.default_duration_minutes()))
            .unwrap_or(self.validator.config().default_duration_minutes);

        if minutes == 0 || minutes > MAX_DURATION_MINUTES {
            return Err(AppointmentError::Validation(format!(
                "duration must be between 1 and {} minutes",
                MAX_DURATION_MINUTES
            )));
        }
        Ok(minutes)
    }

    #[instrument(skip(self), fields(date = %query.date))]
    pub async fn available_slots(&self, query: &SlotQuery) -> Result<AvailableSlotsResponse, AppointmentError> {
        let duration = self.resolve_duration(query.duration, query.appointment_type)?;
        let include_unavailable = query.include_unavailable.unwrap_or(false);

        let staff = self.bookable_staff(query.staff_id).await?;
        if staff.is_empty() {
            debug!("No bookable staff for slot query on {}", query.date);
            return Ok(AvailableSlotsResponse::empty(query.date, duration));
        }

        let mut slots = Vec::new();
        let mut breakdown = Vec::with_capacity(staff.len());
        let (mut total, mut available) = (0usize, 0usize);

        for member in &staff {
            let day = self.validator.load_day(member, query.date).await?;
            let staff_slots = self.evaluate_day(&day, duration);
            let staff_available = staff_slots.iter().filter(|s| s.available).count();

            total += staff_slots.len();
            available += staff_available;
            breakdown.push(StaffSlotSummary {
                staff_id: member.id,
                staff_name: member.display_name.clone(),
                summary: SlotSummary::from_counts(staff_slots.len(), staff_available),
            });

            slots.extend(staff_slots.into_iter().filter(|s| include_unavailable || s.available));
        }

        slots.sort_by(|a, b| {
            a.time
                .cmp(&b.time)
                .then_with(|| a.staff_name.cmp(&b.staff_name))
                .then_with(|| a.staff_id.cmp(&b.staff_id))
        });

        Ok(AvailableSlotsResponse {
            date: query.date,
            duration_minutes: duration,
            slots,
            summary: SlotSummary::from_counts(total, available),
            per_staff_breakdown: breakdown,
        })
    }

    /// Scans forward from today in the scheduling timezone.
    #[instrument(skip(self), fields(staff_id = %query.staff_id))]
    pub async fn next_available_slot(
        &self,
        query: &NextAvailableQuery,
    ) -> Result<Option<NextAvailableSlot>, AppointmentError> {
        let duration = self.resolve_duration(query.duration, query.appointment_type)?;
        let staff = self.validator.staff(query.staff_id).await?;
        if !staff.is_active {
            return Ok(None);
        }

        let config = self.validator.config();
        let days_ahead = query
            .days_ahead
            .unwrap_or(config.next_available_days)
            .clamp(1, config.max_search_days);
        let today = self.validator.today();

        for offset in 0..days_ahead {
            let date = today + Duration::days(offset as i64);
            let day = self.validator.load_day(&staff, date).await?;

            if let Some(slot) = self.evaluate_day(&day, duration).into_iter().find(|s| s.available) {
                info!("Next available slot for {} is {} {}", staff.id, date, slot.time);
                return Ok(Some(NextAvailableSlot {
                    date,
                    time: slot.time,
                    end_time: slot.end_time,
                    staff_id: staff.id,
                    staff_name: staff.display_name,
                }));
            }
        }

        debug!("No slot for {} within {} days", staff.id, days_ahead);
        Ok(None)
    }

    /// Checks one candidate; on rejection offers up to three same-day openings.
    #[instrument(skip(self), fields(staff_id = %query.staff_id, date = %query.date))]
    pub async fn validate_slot(&self, query: &ValidateSlotQuery) -> Result<SlotValidation, AppointmentError> {
        let duration = self.resolve_duration(query.duration, query.appointment_type)?;
        let candidate = TimeRange::new(query.time, duration);
        if !candidate.fits_in_day() {
            return Err(AppointmentError::Validation("appointment must end by midnight".to_string()));
        }

        let staff = self.validator.staff(query.staff_id).await?;
        if !staff.is_active {
            return Err(AppointmentError::Validation(format!("staff member {} is inactive", staff.id)));
        }

        let day = self.validator.load_day(&staff, query.date).await?;
        let offset = self.validator.config().timezone;

        match self.validator.evaluate(&day, &candidate, offset, None, self.validator.now()) {
            Ok(()) => Ok(SlotValidation {
                available: true,
                reason: None,
                message: None,
                alternatives: Vec::new(),
            }),
            Err(reason) => {
                let alternatives = self
                    .evaluate_day(&day, duration)
                    .into_iter()
                    .filter(|s| s.available)
                    .take(MAX_ALTERNATIVES)
                    .collect();
                Ok(SlotValidation {
                    available: false,
                    reason: Some(reason),
                    message: Some(reason.to_string()),
                    alternatives,
                })
            }
        }
    }

    async fn bookable_staff(&self, staff_id: Option<Uuid>) -> Result<Vec<StaffMember>, AppointmentError> {
        let store = self.validator.store();
        let staff: Vec<StaffMember> = match staff_id {
            Some(id) => store.staff_member(id).await?.into_iter().collect(),
            None => store.list_staff().await?,
        };
        Ok(staff.into_iter().filter(|s| s.is_active).collect())
    }

    fn evaluate_day(&self, day: &DayCalendar, duration: u32) -> Vec<Slot> {
        let config = self.validator.config();
        let now = self.validator.now();

        day.candidates(duration, config.slot_granularity_minutes)
            .into_iter()
            .filter_map(|range| {
                let verdict = self.validator.evaluate(day, &range, config.timezone, None, now);
                Some(Slot {
                    time: range.start_time()?,
                    end_time: range.end_time()?,
                    staff_id: day.staff.id,
                    staff_name: day.staff.display_name.clone(),
                    available: verdict.is_ok(),
                    conflict_reason: verdict.err(),
                })
            })
            .collect()
    }
}

