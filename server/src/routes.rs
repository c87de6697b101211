//! Router configuration for the Cliniq server.
//!
//! Builds the complete Axum router with all endpoints.

use crate::api::{hospitals, push, queues, tickets};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use cliniq_web::handlers::{health_check, readiness_check, ws};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// Configures all routes:
/// - Health checks
/// - Queue operations (book / advance / status)
/// - Ticket operations (mark / cancel)
/// - Push subscription registration
/// - Hospital alerts
/// - The topic-subscription WebSocket
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Queue operations
        .route("/queues/:doctor_id/tickets", post(queues::book_ticket))
        .route("/queues/:doctor_id/advance", post(queues::advance_queue))
        .route("/queues/:doctor_id/status", get(queues::queue_status))
        // Ticket operations
        .route("/tickets/:ticket_id/status", post(tickets::mark_ticket))
        .route("/tickets/:ticket_id", delete(tickets::cancel_ticket))
        // Push subscriptions
        .route(
            "/push/subscriptions",
            put(push::register_subscription).delete(push::deactivate_subscription),
        )
        // Hospital alerts
        .route("/hospitals/:hospital_id/alerts", post(hospitals::send_alert));

    Router::new()
        // Health checks (no authentication)
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Live updates
        .route("/ws", get(ws::handle))
        // API routes under /api prefix
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
