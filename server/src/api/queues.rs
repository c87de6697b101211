//! Queue API endpoints.
//!
//! - POST /api/queues/:doctor_id/tickets - Book a ticket
//! - POST /api/queues/:doctor_id/advance - Call the next patient (staff)
//! - GET /api/queues/:doctor_id/status - Serving position + own ticket

use super::TicketResponse;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use cliniq_core::{Disposition, DoctorId, QueueState};
use cliniq_web::{AppError, CallerIdentity, CorrelationId};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to book a ticket.
#[derive(Debug, Deserialize)]
pub struct BookTicketRequest {
    /// Day to book for; today when absent
    pub date: Option<NaiveDate>,
    /// Visit reason
    pub reason: String,
}

/// Request to advance the queue.
#[derive(Debug, Default, Deserialize)]
pub struct AdvanceRequest {
    /// Day of the queue; today when absent
    pub date: Option<NaiveDate>,
    /// Closing status for the ticket being served (default completed)
    pub disposition: Option<Disposition>,
}

/// Response after advancing a queue.
#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    /// New serving position
    pub current_number: u32,
    /// High-water mark of issued tickets
    pub last_assigned: u32,
    /// The ticket now being served, absent when the queue ran out with
    /// every remaining ticket already resolved
    pub serving: Option<TicketResponse>,
    /// The previously served ticket this advance closed
    pub closed: Option<TicketResponse>,
}

/// Query parameters for the status endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Day of the queue; today when absent
    pub date: Option<NaiveDate>,
}

/// Current queue status for a waiting client.
#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    /// Derived serving state
    pub state: QueueState,
    /// Ticket currently being served (0 = none yet)
    pub current_number: u32,
    /// High-water mark of issued tickets (0 = nobody booked yet)
    pub last_assigned: u32,
    /// The caller's own ticket, if any
    pub your_ticket: Option<TicketResponse>,
    /// Scheduled tickets still ahead of the caller's
    pub tickets_ahead: Option<u32>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Book a ticket in the doctor's queue.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/queues/<doctor_id>/tickets \
///   -H "X-Account-Id: <account>" \
///   -H "Content-Type: application/json" \
///   -d '{ "reason": "persistent cough" }'
/// ```
pub async fn book_ticket(
    identity: CallerIdentity,
    correlation_id: CorrelationId,
    Path(doctor_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(request): Json<BookTicketRequest>,
) -> Result<(StatusCode, Json<TicketResponse>), AppError> {
    if request.reason.trim().is_empty() {
        return Err(AppError::validation("reason must not be empty"));
    }

    info!(
        correlation_id = %correlation_id.0,
        doctor_id = %doctor_id,
        "booking requested"
    );

    let ticket = state
        .service
        .book_ticket(
            identity.caller(),
            DoctorId::from_uuid(doctor_id),
            request.date,
            request.reason,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ticket.into())))
}

/// Close the current ticket and call the next eligible one.
///
/// Requires the staff or doctor role. Returns `409 QUEUE_EXHAUSTED` once
/// no further advance is possible.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/queues/<doctor_id>/advance \
///   -H "X-Account-Id: <account>" -H "X-Caller-Role: staff" \
///   -H "Content-Type: application/json" \
///   -d '{ "disposition": "missed" }'
/// ```
pub async fn advance_queue(
    identity: CallerIdentity,
    Path(doctor_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(request): Json<AdvanceRequest>,
) -> Result<Json<AdvanceResponse>, AppError> {
    let outcome = state
        .service
        .advance_queue(
            identity.caller(),
            DoctorId::from_uuid(doctor_id),
            request.date,
            request.disposition,
        )
        .await?;

    Ok(Json(AdvanceResponse {
        current_number: outcome.current_number,
        last_assigned: outcome.last_assigned,
        serving: outcome.serving.map(Into::into),
        closed: outcome.closed.map(Into::into),
    }))
}

/// Current serving position plus the caller's own ticket.
///
/// A day nobody has booked yet returns the idle snapshot rather than an
/// error.
///
/// # Example
///
/// ```bash
/// curl "http://localhost:8080/api/queues/<doctor_id>/status?date=2025-06-02" \
///   -H "X-Account-Id: <account>"
/// ```
pub async fn queue_status(
    identity: CallerIdentity,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
    State(state): State<AppState>,
) -> Result<Json<QueueStatusResponse>, AppError> {
    let status = state
        .service
        .queue_status(identity.caller(), DoctorId::from_uuid(doctor_id), query.date)
        .await?;

    Ok(Json(QueueStatusResponse {
        state: status.state,
        current_number: status.current_number,
        last_assigned: status.last_assigned,
        your_ticket: status.your_ticket.map(Into::into),
        tickets_ahead: status.tickets_ahead,
    }))
}
