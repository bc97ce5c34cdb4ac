use axum::{routing::get, Router};

use appointment_cell::{appointment_routes, time_off_routes, SchedulingState};

pub fn create_router(state: SchedulingState) -> Router {
    Router::new()
        .route("/", get(|| async { "Pharmacy scheduling API is running!" }))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/time-off", time_off_routes(state))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use appointment_cell::services::calendar::InMemoryCalendarStore;
    use appointment_cell::services::clock::SystemClock;
    use appointment_cell::services::events::EventPublisher;
    use shared_utils::test_utils::TestConfig;

    use super::*;

    fn app() -> Router {
        let state = SchedulingState::new(
            TestConfig::default().to_arc(),
            Arc::new(InMemoryCalendarStore::new()),
            Arc::new(SystemClock),
            EventPublisher::disabled(),
        );
        create_router(state)
    }

    #[tokio::test]
    async fn test_liveness_route() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Pharmacy scheduling API is running!");
    }

    #[tokio::test]
    async fn test_nested_routes_require_auth() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/appointments/slots?date=2025-11-03")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
