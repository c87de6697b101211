//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use axum::http::StatusCode;

/// Simple health check endpoint (for basic liveness).
///
/// Returns 200 OK to indicate the service is running.
/// This endpoint does NOT check dependencies (database, etc.).
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness check endpoint.
///
/// The engine holds no warm-up state of its own; readiness equals
/// liveness here, and deployments gate on the storage layer separately.
///
/// # Endpoint
///
/// ```text
/// GET /ready
/// ```
#[allow(clippy::unused_async)]
pub async fn readiness_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ready")
}
