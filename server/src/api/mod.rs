//! API endpoints, organized by resource.

pub mod hospitals;
pub mod push;
pub mod queues;
pub mod tickets;

use chrono::{DateTime, NaiveDate, Utc};
use cliniq_core::{Ticket, TicketStatus};
use serde::Serialize;
use uuid::Uuid;

/// Outward-facing ticket representation shared by several endpoints.
#[derive(Debug, Serialize)]
pub struct TicketResponse {
    /// Ticket identity
    pub id: Uuid,
    /// Doctor whose queue the ticket is in
    pub doctor_id: Uuid,
    /// Calendar day of the queue
    pub date: NaiveDate,
    /// Position in the queue (1-based)
    pub number: u32,
    /// Lifecycle status
    pub status: TicketStatus,
    /// Visit reason given at booking
    pub reason: String,
    /// When the ticket was booked
    pub booked_at: DateTime<Utc>,
    /// When the ticket was resolved, if it has been
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<Ticket> for TicketResponse {
    fn from(ticket: Ticket) -> Self {
        Self {
            id: *ticket.id.as_uuid(),
            doctor_id: *ticket.queue.doctor.as_uuid(),
            date: ticket.queue.date,
            number: ticket.number,
            status: ticket.status,
            reason: ticket.reason,
            booked_at: ticket.booked_at,
            resolved_at: ticket.resolved_at,
        }
    }
}
