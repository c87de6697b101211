//! Domain types for the clinic queue engine.
//!
//! This module contains the value objects and entities shared across the
//! workspace: identities, the per-doctor-day queue, tickets and their
//! lifecycle statuses, and the caller identity supplied by the external
//! authentication layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a doctor
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DoctorId(Uuid);

impl DoctorId {
    /// Creates a new random `DoctorId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `DoctorId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for DoctorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DoctorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an account (patient or staff member)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Creates a new random `AccountId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `AccountId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a hospital
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HospitalId(Uuid);

impl HospitalId {
    /// Creates a new random `HospitalId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `HospitalId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for HospitalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HospitalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ticket
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Caller identity (supplied by the external auth layer)
// ============================================================================

/// Role of an authenticated caller.
///
/// Roles arrive from the external identity service; the engine trusts them
/// and performs no credential checks of its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A patient booking and tracking their own tickets
    Patient,
    /// Hospital staff operating queues on behalf of doctors
    Staff,
    /// A doctor operating their own queue
    Doctor,
}

impl Role {
    /// Whether this role may advance queues and mark tickets.
    #[must_use]
    pub const fn can_manage_queue(self) -> bool {
        matches!(self, Self::Staff | Self::Doctor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patient => write!(f, "patient"),
            Self::Staff => write!(f, "staff"),
            Self::Doctor => write!(f, "doctor"),
        }
    }
}

/// An authenticated caller, as asserted by the external identity service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller {
    /// The caller's account
    pub account: AccountId,
    /// The caller's role
    pub role: Role,
}

impl Caller {
    /// Creates a new caller identity
    #[must_use]
    pub const fn new(account: AccountId, role: Role) -> Self {
        Self { account, role }
    }
}

// ============================================================================
// Queue identity
// ============================================================================

/// Identity of a queue: one doctor on one calendar day.
///
/// At most one queue exists per key. Queues are created lazily on the first
/// booking of the day and are never deleted, only superseded by the next
/// day's queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueKey {
    /// The doctor whose line this is
    pub doctor: DoctorId,
    /// The calendar day of the line
    pub date: NaiveDate,
}

impl QueueKey {
    /// Creates a new queue key
    #[must_use]
    pub const fn new(doctor: DoctorId, date: NaiveDate) -> Self {
        Self { doctor, date }
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doctor, self.date)
    }
}

// ============================================================================
// Ticket lifecycle
// ============================================================================

/// Lifecycle status of a ticket.
///
/// A ticket is created `Scheduled` and only ever moves forward: once it
/// reaches a terminal status it never returns to `Scheduled`. A reschedule
/// issues a brand-new ticket instead of resurrecting an old number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Booked and waiting to be served
    Scheduled,
    /// The visit happened
    Completed,
    /// The holder cancelled before being served
    Cancelled,
    /// The holder did not show up when called
    Missed,
}

impl TicketStatus {
    /// Whether this status is terminal (no further transitions allowed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Scheduled)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Missed => write!(f, "missed"),
        }
    }
}

/// The closing status an advance or an explicit mark applies to a ticket.
///
/// Cancellation is a separate operation and is not a disposition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// The visit took place
    Completed,
    /// The holder was called but did not appear
    Missed,
}

impl From<Disposition> for TicketStatus {
    fn from(disposition: Disposition) -> Self {
        match disposition {
            Disposition::Completed => Self::Completed,
            Disposition::Missed => Self::Missed,
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A single booked visit slot in a queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identity
    pub id: TicketId,
    /// The queue this ticket belongs to
    pub queue: QueueKey,
    /// 1-based sequence number, unique within the queue, immutable once assigned
    pub number: u32,
    /// The account holding this ticket
    pub holder: AccountId,
    /// Free-form visit reason given at booking time
    pub reason: String,
    /// Current lifecycle status
    pub status: TicketStatus,
    /// When the ticket was booked
    pub booked_at: DateTime<Utc>,
    /// When the ticket reached a terminal status, if it has
    pub resolved_at: Option<DateTime<Utc>>,
}

/// The ordered ticket line for one doctor on one calendar day.
///
/// Invariant: `0 <= current_number <= last_assigned`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    /// Queue identity
    pub key: QueueKey,
    /// Ticket currently being served (0 = none called yet)
    pub current_number: u32,
    /// High-water mark of issued ticket numbers
    pub last_assigned: u32,
    /// When the queue was lazily created
    pub created_at: DateTime<Utc>,
}

impl Queue {
    /// Derived serving state of the queue.
    #[must_use]
    pub const fn state(&self) -> QueueState {
        if self.current_number == 0 {
            QueueState::Idle
        } else if self.current_number >= self.last_assigned {
            QueueState::Exhausted
        } else {
            QueueState::Serving(self.current_number)
        }
    }

    /// Whether a further advance is possible.
    #[must_use]
    pub const fn can_advance(&self) -> bool {
        self.current_number < self.last_assigned
    }
}

/// Derived classification of a queue's serving position.
///
/// `Exhausted` means no further advance is possible; the final ticket may
/// still be actively served when this state is reached. The state is
/// computed from the counters, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "number", rename_all = "snake_case")]
pub enum QueueState {
    /// No ticket has been called yet
    Idle,
    /// The given ticket number is being served and more are waiting
    Serving(u32),
    /// The serving counter reached the last assigned number
    Exhausted,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn queue_with(current: u32, last: u32) -> Queue {
        Queue {
            key: QueueKey::new(DoctorId::new(), NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()),
            current_number: current,
            last_assigned: last,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn queue_state_classification() {
        assert_eq!(queue_with(0, 0).state(), QueueState::Idle);
        assert_eq!(queue_with(0, 5).state(), QueueState::Idle);
        assert_eq!(queue_with(2, 5).state(), QueueState::Serving(2));
        assert_eq!(queue_with(5, 5).state(), QueueState::Exhausted);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TicketStatus::Scheduled.is_terminal());
        assert!(TicketStatus::Completed.is_terminal());
        assert!(TicketStatus::Cancelled.is_terminal());
        assert!(TicketStatus::Missed.is_terminal());
    }

    #[test]
    fn disposition_maps_to_status() {
        assert_eq!(TicketStatus::from(Disposition::Completed), TicketStatus::Completed);
        assert_eq!(TicketStatus::from(Disposition::Missed), TicketStatus::Missed);
    }

    #[test]
    fn queue_key_display_includes_date() {
        let doctor = DoctorId::new();
        let key = QueueKey::new(doctor, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(key.to_string(), format!("{doctor}:2025-03-14"));
    }
}
