use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::calendar::{CalendarStore, InMemoryCalendarStore};
use appointment_cell::services::clock::SystemClock;
use appointment_cell::services::events::{EventPublisher, SchedulingEvent};
use appointment_cell::services::supabase_store::SupabaseCalendarStore;
use appointment_cell::SchedulingState;
use shared_config::{AppConfig, CalendarBackend};
use shared_database::supabase::SupabaseClient;

const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pharmacy scheduling API server");

    let config = Arc::new(AppConfig::from_env());
    if !config.is_configured() {
        warn!("SUPABASE_JWT_SECRET is empty; every authenticated request will be rejected");
    }

    let store: Arc<dyn CalendarStore> = match config.calendar_backend {
        CalendarBackend::Memory => {
            info!("Using in-memory calendar store");
            Arc::new(InMemoryCalendarStore::new())
        }
        CalendarBackend::Supabase => {
            info!("Using Supabase calendar store at {}", config.supabase_url);
            let client = Arc::new(SupabaseClient::new(&config));
            Arc::new(SupabaseCalendarStore::new(client, config.supabase_service_role_key.clone()))
        }
    };

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(log_events(events_rx));

    let state = SchedulingState::new(
        Arc::clone(&config),
        store,
        Arc::new(SystemClock),
        EventPublisher::new(events_tx),
    );

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// Downstream consumers (reminders, notifications) are not wired up yet, so
/// events are only logged.
async fn log_events(mut events: mpsc::Receiver<SchedulingEvent>) {
    while let Some(event) = events.recv().await {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(target: "scheduling_events", "{}", payload),
            Err(e) => warn!("Could not serialize scheduling event: {}", e),
        }
    }
}
