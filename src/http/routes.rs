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
        // Session control
        .route("/session", get(handlers::get_session))
        .route("/session/configure", post(handlers::configure))
        .route("/session/chat/start", post(handlers::start_chat))
        .route("/session/chat/stop", post(handlers::stop_chat))
        .route("/session/message", post(handlers::send_message))
        .route("/session/reset", post(handlers::reset))
        // Assessment
        .route("/session/assessment", post(handlers::request_assessment))
        .route("/session/report", get(handlers::get_report))
        .route("/session/report/export", get(handlers::export_report))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
