//! In-memory record store.
//!
//! All tables live behind one `std::sync::Mutex`, which makes every store
//! operation atomic with respect to every other — the same guarantee the
//! production store gets from single-statement conditional updates. Fast,
//! deterministic, and suitable for concurrency tests (the lock is held
//! only for synchronous map work, never across an await).

use chrono::{DateTime, Utc};
use cliniq_core::store::{RecordStore, StoreFuture};
use cliniq_core::{AccountId, Queue, QueueError, QueueKey, Ticket, TicketId, TicketStatus};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Default)]
struct Tables {
    queues: HashMap<QueueKey, Queue>,
    tickets: HashMap<TicketId, Ticket>,
}

/// Deterministic in-memory implementation of [`RecordStore`].
#[derive(Default)]
pub struct InMemoryRecordStore {
    inner: Mutex<Tables>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of queue rows currently stored (test assertion helper).
    #[must_use]
    pub fn queue_count(&self) -> usize {
        self.tables().queues.len()
    }

    /// All tickets of a queue ordered by number (test assertion helper).
    #[must_use]
    pub fn tickets_of(&self, key: QueueKey) -> Vec<Ticket> {
        let mut tickets: Vec<Ticket> = self
            .tables()
            .tickets
            .values()
            .filter(|t| t.queue == key)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.number);
        tickets
    }
}

impl RecordStore for InMemoryRecordStore {
    fn create_or_fetch_queue(&self, key: QueueKey, now: DateTime<Utc>) -> StoreFuture<'_, Queue> {
        let queue = *self.tables().queues.entry(key).or_insert(Queue {
            key,
            current_number: 0,
            last_assigned: 0,
            created_at: now,
        });
        Box::pin(async move { Ok(queue) })
    }

    fn queue(&self, key: QueueKey) -> StoreFuture<'_, Option<Queue>> {
        let queue = self.tables().queues.get(&key).copied();
        Box::pin(async move { Ok(queue) })
    }

    fn allocate_ticket(
        &self,
        key: QueueKey,
        holder: AccountId,
        reason: String,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, Ticket> {
        let result = {
            let mut tables = self.tables();
            match tables.queues.get_mut(&key) {
                Some(queue) => {
                    queue.last_assigned += 1;
                    let ticket = Ticket {
                        id: TicketId::new(),
                        queue: key,
                        number: queue.last_assigned,
                        holder,
                        reason,
                        status: TicketStatus::Scheduled,
                        booked_at: now,
                        resolved_at: None,
                    };
                    tables.tickets.insert(ticket.id, ticket.clone());
                    Ok(ticket)
                }
                None => Err(QueueError::not_found("queue", key)),
            }
        };
        Box::pin(async move { result })
    }

    fn ticket(&self, id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        let ticket = self.tables().tickets.get(&id).cloned();
        Box::pin(async move { Ok(ticket) })
    }

    fn ticket_by_number(&self, key: QueueKey, number: u32) -> StoreFuture<'_, Option<Ticket>> {
        let ticket = self
            .tables()
            .tickets
            .values()
            .find(|t| t.queue == key && t.number == number)
            .cloned();
        Box::pin(async move { Ok(ticket) })
    }

    fn tickets_from(&self, key: QueueKey, from_number: u32) -> StoreFuture<'_, Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tables()
            .tickets
            .values()
            .filter(|t| t.queue == key && t.number >= from_number)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.number);
        Box::pin(async move { Ok(tickets) })
    }

    fn ticket_for_holder(&self, key: QueueKey, holder: AccountId) -> StoreFuture<'_, Option<Ticket>> {
        let tables = self.tables();
        let mut held: Vec<&Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.queue == key && t.holder == holder)
            .collect();
        held.sort_by_key(|t| t.number);
        let ticket = held
            .iter()
            .find(|t| t.status == TicketStatus::Scheduled)
            .or(held.last())
            .map(|t| (*t).clone());
        drop(tables);
        Box::pin(async move { Ok(ticket) })
    }

    fn close_ticket(
        &self,
        id: TicketId,
        status: TicketStatus,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, bool> {
        let result = {
            let mut tables = self.tables();
            match tables.tickets.get_mut(&id) {
                Some(ticket) if ticket.status == TicketStatus::Scheduled => {
                    ticket.status = status;
                    ticket.resolved_at = Some(now);
                    Ok(true)
                }
                Some(_) => Ok(false),
                None => Err(QueueError::not_found("ticket", id)),
            }
        };
        Box::pin(async move { result })
    }

    fn set_current_number(&self, key: QueueKey, expected: u32, new: u32) -> StoreFuture<'_, bool> {
        let result = {
            let mut tables = self.tables();
            match tables.queues.get_mut(&key) {
                Some(queue) if queue.current_number == expected => {
                    queue.current_number = new;
                    Ok(true)
                }
                Some(_) => Ok(false),
                None => Err(QueueError::not_found("queue", key)),
            }
        };
        Box::pin(async move { result })
    }
}
