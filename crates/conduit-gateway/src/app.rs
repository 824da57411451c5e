use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use conduit_bus::EventProducer;
use conduit_sessions::RedisSessionStore;
use conduit_ws::Hub;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::coordinator::Coordinator;
use crate::{http, ws};

/// Concrete coordinator type this binary runs — Redis-backed sessions,
/// Kafka-backed event publishing. The generic `Coordinator`/`WorkflowDriver`
/// stay testable against fakes; production wires the real backends once,
/// here.
pub type AppCoordinator = Coordinator<RedisSessionStore, EventProducer>;

/// Shared state handed to every Axum handler.
pub struct AppState {
    pub coordinator: Arc<AppCoordinator>,
    pub hub: Arc<Hub>,
}

pub fn build_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let mut router = Router::new()
        .route("/health", get(http::health::health))
        .route("/health/ready", get(http::health::ready))
        .route("/health/live", get(http::health::live))
        .route("/api/v1/conversation/chat", post(http::chat::chat))
        .route("/api/v1/sessions/active", get(http::sessions::list_active))
        .route("/api/v1/sessions/{id}/info", get(http::sessions::info))
        .route("/api/v1/sessions/{id}/context", get(http::sessions::context))
        .route("/api/v1/sessions/{id}/history", get(http::sessions::history))
        .route("/api/v1/sessions/{id}/state", post(http::sessions::override_state))
        .route("/api/v1/sessions/{id}", delete(http::sessions::remove))
        .route("/api/v1/realtime/ws/{session_id}", get(ws::connection::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if !cors_origins.is_empty() {
        router = router.layer(build_cors(cors_origins));
    }
    router
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
