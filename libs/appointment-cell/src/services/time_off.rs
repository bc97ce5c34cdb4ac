// libs/appointment-cell/src/services/time_off.rs
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use shared_config::SchedulingConfig;

use crate::models::{
    AppointmentError, ImpactRecord, TimeOffDecision, TimeOffRequest, TimeOffStatus, TimeOffSubmission,
};
use crate::services::calendar::CalendarStore;
use crate::services::clock::Clock;
use crate::services::events::{EventPublisher, SchedulingEvent};

/// Time-off workflow and impact resolution. Impact is informational: the
/// affected appointments are reported, never modified.
pub struct TimeOffService {
    store: Arc<dyn CalendarStore>,
    config: SchedulingConfig,
    clock: Arc<dyn Clock>,
    events: EventPublisher,
}

impl TimeOffService {
    pub fn new(
        store: Arc<dyn CalendarStore>,
        config: SchedulingConfig,
        clock: Arc<dyn Clock>,
        events: EventPublisher,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            events,
        }
    }

    #[instrument(skip(self, submission), fields(staff_id = %submission.staff_id))]
    pub async fn submit(
        &self,
        submission: TimeOffSubmission,
        created_by: Option<String>,
    ) -> Result<TimeOffDecision, AppointmentError> {
        if submission.end_date < submission.start_date {
            return Err(AppointmentError::Validation(
                "end_date must not be before start_date".to_string(),
            ));
        }

        let reason = submission.reason.trim().to_string();
        if reason.chars().count() < self.config.min_time_off_reason_length {
            return Err(AppointmentError::Validation(format!(
                "reason must be at least {} characters",
                self.config.min_time_off_reason_length
            )));
        }

        if self.store.staff_member(submission.staff_id).await?.is_none() {
            return Err(AppointmentError::StaffNotFound(submission.staff_id));
        }

        let existing = self.store.time_off_requests_for(submission.staff_id).await?;
        if let Some(clash) = existing
            .iter()
            .find(|t| t.is_open() && t.overlaps_dates(submission.start_date, submission.end_date))
        {
            return Err(AppointmentError::Validation(format!(
                "overlaps {} time-off request {} ({} to {})",
                clash.status, clash.id, clash.start_date, clash.end_date
            )));
        }

        let now = self.clock.now();
        let mut request = TimeOffRequest {
            id: Uuid::new_v4(),
            staff_id: submission.staff_id,
            start_date: submission.start_date,
            end_date: submission.end_date,
            reason,
            time_off_type: submission.time_off_type,
            status: TimeOffStatus::Pending,
            affected_appointment_ids: Vec::new(),
            created_by,
            decided_at: None,
            created_at: now,
            updated_at: now,
        };

        let affected = self.resolve_impact(&request).await?;
        request.affected_appointment_ids = affected.iter().map(|r| r.appointment_id).collect();
        let stored = self.store.insert_time_off(request).await?;

        info!(
            "Time-off {} submitted for staff {} ({} affected appointments)",
            stored.id,
            stored.staff_id,
            affected.len()
        );

        Ok(TimeOffDecision {
            time_off: stored,
            affected_appointments: affected,
        })
    }

    #[instrument(skip(self))]
    pub async fn approve(&self, time_off_id: Uuid) -> Result<TimeOffDecision, AppointmentError> {
        let mut request = self.pending(time_off_id).await?;

        let affected = self.resolve_impact(&request).await?;
        let now = self.clock.now();
        request.status = TimeOffStatus::Approved;
        request.decided_at = Some(now);
        request.updated_at = now;
        request.affected_appointment_ids = affected.iter().map(|r| r.appointment_id).collect();

        let stored = self.store.update_time_off(request, TimeOffStatus::Pending).await?;

        if !affected.is_empty() {
            warn!(
                "Approved time-off {} affects {} appointments for staff {}",
                stored.id,
                affected.len(),
                stored.staff_id
            );
        }

        self.events.publish(SchedulingEvent::TimeOffApproved {
            time_off_id: stored.id,
            staff_id: stored.staff_id,
            affected_appointments: affected.clone(),
        });

        Ok(TimeOffDecision {
            time_off: stored,
            affected_appointments: affected,
        })
    }

    #[instrument(skip(self))]
    pub async fn reject(&self, time_off_id: Uuid) -> Result<TimeOffRequest, AppointmentError> {
        let mut request = self.pending(time_off_id).await?;

        let now = self.clock.now();
        request.status = TimeOffStatus::Rejected;
        request.decided_at = Some(now);
        request.updated_at = now;

        let stored = self.store.update_time_off(request, TimeOffStatus::Pending).await?;
        info!("Time-off {} rejected", stored.id);
        Ok(stored)
    }

    /// Recomputes the derived impact list and stores it if it changed.
    #[instrument(skip(self))]
    pub async fn refresh_impact(&self, time_off_id: Uuid) -> Result<TimeOffDecision, AppointmentError> {
        let mut request = self
            .store
            .time_off(time_off_id)
            .await?
            .ok_or(AppointmentError::TimeOffNotFound(time_off_id))?;

        let affected = self.resolve_impact(&request).await?;
        let ids: Vec<Uuid> = affected.iter().map(|r| r.appointment_id).collect();

        if ids != request.affected_appointment_ids {
            request.affected_appointment_ids = ids;
            request.updated_at = self.clock.now();
            let expected = request.status;
            request = self.store.update_time_off(request, expected).await?;
        }

        Ok(TimeOffDecision {
            time_off: request,
            affected_appointments: affected,
        })
    }

    /// Occupying appointments of the staff member inside the request's
    /// inclusive range, ordered by date, time and id.
    pub async fn resolve_impact(&self, request: &TimeOffRequest) -> Result<Vec<ImpactRecord>, AppointmentError> {
        let mut appointments = self
            .store
            .appointments_between(request.staff_id, request.start_date, request.end_date)
            .await?;
        appointments.retain(|apt| apt.occupies_calendar() && request.covers(apt.date));
        appointments.sort_by_key(|apt| (apt.date, apt.time, apt.id));

        Ok(appointments.iter().map(ImpactRecord::from).collect())
    }

    async fn pending(&self, time_off_id: Uuid) -> Result<TimeOffRequest, AppointmentError> {
        let request = self
            .store
            .time_off(time_off_id)
            .await?
            .ok_or(AppointmentError::TimeOffNotFound(time_off_id))?;

        if request.status != TimeOffStatus::Pending {
            return Err(AppointmentError::Validation(format!(
                "time-off request {} is already {}",
                time_off_id, request.status
            )));
        }
        Ok(request)
    }
}
