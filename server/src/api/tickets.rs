//! Ticket API endpoints.
//!
//! - POST /api/tickets/:ticket_id/status - Close a ticket out-of-band (staff)
//! - DELETE /api/tickets/:ticket_id - Cancel a ticket (holder or staff)

use super::TicketResponse;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use cliniq_core::{Disposition, TicketId};
use cliniq_web::{AppError, CallerIdentity};
use serde::Deserialize;
use uuid::Uuid;

/// Request to close a ticket out-of-band.
#[derive(Debug, Deserialize)]
pub struct MarkTicketRequest {
    /// Terminal status to apply
    pub disposition: Disposition,
}

/// Close a ticket without moving the serving counter.
///
/// Requires the staff or doctor role; rejected with `409` once the ticket
/// is already terminal.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/tickets/<ticket_id>/status \
///   -H "X-Account-Id: <account>" -H "X-Caller-Role: staff" \
///   -H "Content-Type: application/json" \
///   -d '{ "disposition": "completed" }'
/// ```
pub async fn mark_ticket(
    identity: CallerIdentity,
    Path(ticket_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(request): Json<MarkTicketRequest>,
) -> Result<Json<TicketResponse>, AppError> {
    let ticket = state
        .service
        .mark_ticket(
            identity.caller(),
            TicketId::from_uuid(ticket_id),
            request.disposition,
        )
        .await?;
    Ok(Json(ticket.into()))
}

/// Cancel a ticket before it is served.
///
/// Holders may cancel their own tickets; staff may cancel any. The number
/// is never reissued — a later advance simply skips the cancelled slot.
///
/// # Example
///
/// ```bash
/// curl -X DELETE http://localhost:8080/api/tickets/<ticket_id> \
///   -H "X-Account-Id: <account>"
/// ```
pub async fn cancel_ticket(
    identity: CallerIdentity,
    Path(ticket_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<TicketResponse>, AppError> {
    let ticket = state
        .service
        .cancel_ticket(identity.caller(), TicketId::from_uuid(ticket_id))
        .await?;
    Ok(Json(ticket.into()))
}
