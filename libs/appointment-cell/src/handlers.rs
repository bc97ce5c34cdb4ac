// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AvailableSlotsResponse, BookAppointmentRequest, NextAvailableQuery,
    RescheduleAppointmentRequest, RescheduleResult, SeriesBookingResult, SlotQuery, SlotValidation, StaffDayQuery,
    TimeOffDecision, TimeOffRequest, TimeOffSubmission, UpdateSeriesPatternRequest, UpdateStatusRequest,
    ValidateSlotQuery,
};
use crate::services::booking::AppointmentBookingService;
use crate::services::calendar::CalendarStore;
use crate::services::clock::Clock;
use crate::services::conflict::ConflictValidator;
use crate::services::events::EventPublisher;
use crate::services::slots::SlotGenerator;
use crate::services::time_off::TimeOffService;

// ==============================================================================
// SHARED STATE
// ==============================================================================

#[derive(Clone)]
pub struct SchedulingState {
    pub config: Arc<AppConfig>,
    pub slots: Arc<SlotGenerator>,
    pub booking: Arc<AppointmentBookingService>,
    pub time_off: Arc<TimeOffService>,
}

impl SchedulingState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<dyn CalendarStore>,
        clock: Arc<dyn Clock>,
        events: EventPublisher,
    ) -> Self {
        let scheduling = config.scheduling.clone();
        let validator = Arc::new(ConflictValidator::new(
            Arc::clone(&store),
            scheduling.clone(),
            Arc::clone(&clock),
        ));

        Self {
            slots: Arc::new(SlotGenerator::new(Arc::clone(&validator))),
            booking: Arc::new(AppointmentBookingService::new(validator, events.clone())),
            time_off: Arc::new(TimeOffService::new(store, scheduling, clock, events)),
            config,
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound(_)
            | AppointmentError::StaffNotFound(_)
            | AppointmentError::TimeOffNotFound(_)
            | AppointmentError::SeriesNotFound(_) => AppError::NotFound(err.to_string()),
            AppointmentError::Rejected(_) | AppointmentError::ConcurrencyConflict => AppError::Conflict(err.to_string()),
            AppointmentError::InvalidTransition { .. } => AppError::BadRequest(err.to_string()),
            AppointmentError::OutcomeRequired | AppointmentError::Validation(_) => {
                AppError::ValidationError(err.to_string())
            }
            AppointmentError::Store(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

pub async fn get_available_slots(
    State(state): State<SchedulingState>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<AvailableSlotsResponse>, AppError> {
    Ok(Json(state.slots.available_slots(&query).await?))
}

pub async fn get_next_available_slot(
    State(state): State<SchedulingState>,
    Query(query): Query<NextAvailableQuery>,
) -> Result<Json<Value>, AppError> {
    let slot = state.slots.next_available_slot(&query).await?;
    Ok(Json(json!({
        "found": slot.is_some(),
        "slot": slot,
    })))
}

pub async fn validate_slot(
    State(state): State<SchedulingState>,
    Query(query): Query<ValidateSlotQuery>,
) -> Result<Json<SlotValidation>, AppError> {
    Ok(Json(state.slots.validate_slot(&query).await?))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

/// Single booking, or a series when the request carries `recurrence`.
pub async fn book_appointment(
    State(state): State<SchedulingState>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Response, AppError> {
    if request.recurrence.is_some() {
        let series = state.booking.create_series(request, &user).await?;
        return Ok((StatusCode::CREATED, Json(series)).into_response());
    }

    let appointment = state.booking.create(request, &user).await?;
    Ok((StatusCode::CREATED, Json(appointment)).into_response())
}

pub async fn get_appointment(
    State(state): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(state.booking.get(appointment_id).await?))
}

pub async fn delete_appointment(
    State(state): State<SchedulingState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    debug!("User {} deleting appointment {}", user.id, appointment_id);
    state.booking.soft_delete(appointment_id).await?;
    Ok(Json(json!({ "deleted": true, "id": appointment_id })))
}

pub async fn get_staff_appointments(
    State(state): State<SchedulingState>,
    Path(staff_id): Path<Uuid>,
    Query(query): Query<StaffDayQuery>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    Ok(Json(state.booking.list_for_staff(staff_id, query.date).await?))
}

pub async fn update_appointment_status(
    State(state): State<SchedulingState>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Appointment>, AppError> {
    Ok(Json(state.booking.update_status(appointment_id, request).await?))
}

pub async fn reschedule_appointment(
    State(state): State<SchedulingState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<RescheduleResult>, AppError> {
    Ok(Json(state.booking.reschedule(appointment_id, request, &user).await?))
}

pub async fn update_series_pattern(
    State(state): State<SchedulingState>,
    Extension(user): Extension<User>,
    Path(series_id): Path<Uuid>,
    Json(request): Json<UpdateSeriesPatternRequest>,
) -> Result<Json<SeriesBookingResult>, AppError> {
    Ok(Json(state.booking.regenerate_series(series_id, request, &user).await?))
}

// ==============================================================================
// TIME-OFF HANDLERS
// ==============================================================================

pub async fn submit_time_off(
    State(state): State<SchedulingState>,
    Extension(user): Extension<User>,
    Json(submission): Json<TimeOffSubmission>,
) -> Result<(StatusCode, Json<TimeOffDecision>), AppError> {
    let decision = state.time_off.submit(submission, Some(user.id)).await?;
    Ok((StatusCode::CREATED, Json(decision)))
}

pub async fn approve_time_off(
    State(state): State<SchedulingState>,
    Path(time_off_id): Path<Uuid>,
) -> Result<Json<TimeOffDecision>, AppError> {
    Ok(Json(state.time_off.approve(time_off_id).await?))
}

pub async fn reject_time_off(
    State(state): State<SchedulingState>,
    Path(time_off_id): Path<Uuid>,
) -> Result<Json<TimeOffRequest>, AppError> {
    Ok(Json(state.time_off.reject(time_off_id).await?))
}

pub async fn get_time_off_impact(
    State(state): State<SchedulingState>,
    Path(time_off_id): Path<Uuid>,
) -> Result<Json<TimeOffDecision>, AppError> {
    Ok(Json(state.time_off.refresh_impact(time_off_id).await?))
}
