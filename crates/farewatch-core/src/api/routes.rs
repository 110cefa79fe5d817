//! API routes

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Banner
        .route("/", get(handlers::root))

        // Health
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/health/ready", get(handlers::readiness))
        .route("/api/v1/health/live", get(handlers::liveness))

        // Alerts
        .route("/api/v1/alerts", post(handlers::create_alert))
        .route("/api/v1/alerts", get(handlers::list_alerts))
        .route("/api/v1/alerts/:id", get(handlers::get_alert))
        .route("/api/v1/alerts/:id", put(handlers::update_alert))
        .route("/api/v1/alerts/:id", delete(handlers::delete_alert))
        .route("/api/v1/alerts/:id/pause", post(handlers::pause_alert))
        .route("/api/v1/alerts/:id/resume", post(handlers::resume_alert))
        .route("/api/v1/alerts/:id/history", get(handlers::alert_history))

        // Prices
        .route("/api/v1/prices/search", post(handlers::search_prices))
        .route("/api/v1/prices/history/:route", get(handlers::route_history))
        .route("/api/v1/prices/route/:route", get(handlers::route_price))

        .with_state(state)
}
