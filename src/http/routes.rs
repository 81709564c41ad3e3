use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Devices
        .route("/devices", get(handlers::list_devices))
        .route("/devices/select", post(handlers::select_device))
        // Test control
        .route("/test/start", post(handlers::start_test))
        .route("/test/stop", post(handlers::stop_test))
        .route("/test/reset", post(handlers::reset_test))
        .route("/test/status", get(handlers::get_status))
        .route("/test/level", get(handlers::get_level))
        // Recording download
        .route("/recordings/:id", get(handlers::get_recording))
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
