//! Record store trait for queue and ticket persistence.
//!
//! This module defines the core abstraction over the durable document
//! store holding [`Queue`] and [`Ticket`] records. The trait is
//! deliberately minimal: create-or-fetch for lazy queue creation, an
//! atomic ticket allocation, indexed lookups, and two conditional updates
//! (compare-and-set) for the mutable counters.
//!
//! # Atomicity contract
//!
//! Implementations must guarantee, per queue identity:
//!
//! - [`RecordStore::create_or_fetch_queue`] creates at most one queue row
//!   per key even under concurrent first bookings. A racing create resolves
//!   internally by fetching the winner's row; the conflict never surfaces.
//! - [`RecordStore::allocate_ticket`] performs the increment of
//!   `last_assigned` and the insertion of the ticket record atomically
//!   with respect to other allocations on the same queue, so concurrent
//!   bookings always receive a contiguous ascending sequence without
//!   duplicates.
//! - [`RecordStore::close_ticket`] and [`RecordStore::set_current_number`]
//!   apply only when the stored value still matches the expectation and
//!   report whether they applied.
//!
//! # Implementations
//!
//! - `PostgresRecordStore` (in `cliniq-postgres`): production store using
//!   single-statement atomic updates keyed by queue identity
//! - `InMemoryRecordStore` (in `cliniq-testing`): deterministic in-memory
//!   store for tests
//!
//! # Dyn Compatibility
//!
//! This trait uses explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` to enable trait object usage (`Arc<dyn RecordStore>`), which
//! the engine needs to inject storage via its environment.

use crate::error::QueueError;
use crate::types::{AccountId, Queue, QueueKey, Ticket, TicketId, TicketStatus};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`RecordStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueueError>> + Send + 'a>>;

/// Durable storage for queues and tickets.
pub trait RecordStore: Send + Sync {
    /// Fetch the queue for `key`, creating it (with zeroed counters) if it
    /// does not exist yet.
    ///
    /// Concurrent callers for the same key must all observe the same single
    /// queue row.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if the store fails.
    fn create_or_fetch_queue(&self, key: QueueKey, now: DateTime<Utc>) -> StoreFuture<'_, Queue>;

    /// Fetch the queue for `key`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if the store fails.
    fn queue(&self, key: QueueKey) -> StoreFuture<'_, Option<Queue>>;

    /// Atomically increment the queue's `last_assigned` counter and insert
    /// a `Scheduled` ticket carrying the new number.
    ///
    /// The queue must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the queue does not exist, or
    /// [`QueueError::Storage`] if the store fails.
    fn allocate_ticket(
        &self,
        key: QueueKey,
        holder: AccountId,
        reason: String,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Ticket>;

    /// Fetch a ticket by identity.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if the store fails.
    fn ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>>;

    /// Fetch the ticket holding `number` in the given queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if the store fails.
    fn ticket_by_number(&self, key: QueueKey, number: u32) -> StoreFuture<'_, Option<Ticket>>;

    /// Fetch all tickets of the queue with `number >= from_number`, ordered
    /// by ascending number.
    ///
    /// This is the scan the state machine uses to skip non-scheduled
    /// tickets when advancing.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if the store fails.
    fn tickets_from(&self, key: QueueKey, from_number: u32) -> StoreFuture<'_, Vec<Ticket>>;

    /// Fetch the holder's most relevant ticket in the queue: the
    /// lowest-numbered `Scheduled` ticket, falling back to the
    /// highest-numbered resolved one.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if the store fails.
    fn ticket_for_holder(&self, key: QueueKey, holder: AccountId) -> StoreFuture<'_, Option<Ticket>>;

    /// Compare-and-set close: move the ticket to `status` and stamp
    /// `resolved_at`, but only if its stored status is still `Scheduled`.
    ///
    /// Returns `true` if the transition applied, `false` if the ticket was
    /// already terminal (in which case nothing changed).
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the ticket does not exist, or
    /// [`QueueError::Storage`] if the store fails.
    fn close_ticket(
        &self,
        id: TicketId,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, bool>;

    /// Compare-and-set the queue's serving counter from `expected` to
    /// `new`.
    ///
    /// Returns `true` if the counter was updated, `false` if the stored
    /// value no longer matched `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::NotFound`] if the queue does not exist, or
    /// [`QueueError::Storage`] if the store fails.
    fn set_current_number(
        &self,
        key: QueueKey,
        expected: u32,
        new: u32,
    ) -> StoreFuture<'_, bool>;
}
