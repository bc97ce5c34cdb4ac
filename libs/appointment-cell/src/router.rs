// libs/appointment-cell/src/router.rs
use axum::{
    middleware,
    routing::{get, patch, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, SchedulingState};

pub fn appointment_routes(state: SchedulingState) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::book_appointment))
        // Availability
        .route("/slots", get(handlers::get_available_slots))
        .route("/slots/next", get(handlers::get_next_available_slot))
        .route("/slots/validate", get(handlers::validate_slot))
        // Calendars and series
        .route("/staff/{staff_id}", get(handlers::get_staff_appointments))
        .route("/series/{series_id}/pattern", put(handlers::update_series_pattern))
        // Single appointment
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).delete(handlers::delete_appointment),
        )
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .route("/{appointment_id}/reschedule", post(handlers::reschedule_appointment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}

pub fn time_off_routes(state: SchedulingState) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::submit_time_off))
        .route("/{time_off_id}/approve", post(handlers::approve_time_off))
        .route("/{time_off_id}/reject", post(handlers::reject_time_off))
        .route("/{time_off_id}/impact", get(handlers::get_time_off_impact))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
