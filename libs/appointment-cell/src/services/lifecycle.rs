// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{Appointment, AppointmentError, AppointmentOutcome, AppointmentStatus, UpdateStatusRequest};

/// A requested move in the appointment lifecycle. `Complete` carries its
/// outcome so the record and the status change land together.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusTransition {
    Confirm,
    Start,
    Complete(AppointmentOutcome),
    Cancel { reason: Option<String> },
    NoShow,
    Reschedule { reason: Option<String> },
}

impl StatusTransition {
    pub fn target(&self) -> AppointmentStatus {
        match self {
            StatusTransition::Confirm => AppointmentStatus::Confirmed,
            StatusTransition::Start => AppointmentStatus::InProgress,
            StatusTransition::Complete(_) => AppointmentStatus::Completed,
            StatusTransition::Cancel { .. } => AppointmentStatus::Cancelled,
            StatusTransition::NoShow => AppointmentStatus::NoShow,
            StatusTransition::Reschedule { .. } => AppointmentStatus::Rescheduled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppointmentLifecycle {
    min_outcome_notes_length: usize,
}

impl AppointmentLifecycle {
    pub fn new(min_outcome_notes_length: usize) -> Self {
        Self { min_outcome_notes_length }
    }

    pub fn valid_transitions(from: AppointmentStatus) -> &'static [AppointmentStatus] {
        use AppointmentStatus::*;
        match from {
            Scheduled => &[Confirmed, Cancelled, NoShow, Rescheduled],
            Confirmed => &[InProgress, Cancelled, NoShow, Rescheduled],
            InProgress => &[Completed, Cancelled, NoShow],
            Completed | Cancelled | NoShow | Rescheduled => &[],
        }
    }

    pub fn can_transition(from: AppointmentStatus, to: AppointmentStatus) -> bool {
        Self::valid_transitions(from).contains(&to)
    }

    /// Turns a status-update request into a transition. `rescheduled` is never
    /// reachable here; it belongs to the reschedule operation.
    pub fn transition_for(
        &self,
        current: AppointmentStatus,
        request: UpdateStatusRequest,
    ) -> Result<StatusTransition, AppointmentError> {
        let target = request.status;
        if target == AppointmentStatus::Rescheduled || !Self::can_transition(current, target) {
            return Err(AppointmentError::InvalidTransition { from: current, to: target });
        }

        match target {
            AppointmentStatus::Confirmed => Ok(StatusTransition::Confirm),
            AppointmentStatus::InProgress => Ok(StatusTransition::Start),
            AppointmentStatus::Completed => {
                let outcome = request.outcome.ok_or(AppointmentError::OutcomeRequired)?;
                self.validate_outcome(&outcome)?;
                Ok(StatusTransition::Complete(outcome))
            }
            AppointmentStatus::Cancelled => Ok(StatusTransition::Cancel { reason: request.reason }),
            AppointmentStatus::NoShow => Ok(StatusTransition::NoShow),
            AppointmentStatus::Scheduled | AppointmentStatus::Rescheduled => {
                Err(AppointmentError::InvalidTransition { from: current, to: target })
            }
        }
    }

    pub fn validate_outcome(&self, outcome: &AppointmentOutcome) -> Result<(), AppointmentError> {
        if outcome.notes.trim().chars().count() < self.min_outcome_notes_length {
            return Err(AppointmentError::Validation(format!(
                "outcome notes must be at least {} characters",
                self.min_outcome_notes_length
            )));
        }
        Ok(())
    }

    /// Returns the updated record; the caller persists it with a version check.
    pub fn apply(
        &self,
        appointment: &Appointment,
        transition: StatusTransition,
        now: DateTime<Utc>,
    ) -> Result<Appointment, AppointmentError> {
        let from = appointment.status;
        let to = transition.target();
        if !Self::can_transition(from, to) {
            return Err(AppointmentError::InvalidTransition { from, to });
        }

        let mut updated = appointment.clone();
        updated.status = to;
        updated.updated_at = now;

        match transition {
            StatusTransition::Complete(outcome) => {
                self.validate_outcome(&outcome)?;
                updated.outcome = Some(outcome);
            }
            StatusTransition::Cancel { reason } | StatusTransition::Reschedule { reason } => {
                if reason.is_some() {
                    updated.cancellation_reason = reason;
                }
            }
            StatusTransition::Confirm | StatusTransition::Start | StatusTransition::NoShow => {}
        }

        debug!("Appointment {} transition {} -> {}", appointment.id, from, to);
        Ok(updated)
    }
}
