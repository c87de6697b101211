//! The queue engine: ticket allocation, the serving state machine, and
//! event/push fan-out.
//!
//! Every mutating operation on a queue — booking, advancing, marking,
//! cancelling — takes that queue's async lock, so operations on one
//! doctor-day line serialize while different lines run fully in parallel.
//! The record store additionally enforces storage-level atomicity
//! (conditional updates keyed by queue identity), which keeps the counters
//! correct even if several service instances share one database.
//!
//! Push dispatch is detached: it runs on a spawned task after the state
//! mutation and the notifier publish have completed, so an unreachable
//! push endpoint can never delay the response to the staff client.

use crate::clock::Clock;
use crate::error::QueueError;
use crate::notify::{ChangeNotifier, LiveEvent, Topic};
use crate::push::{MessageKind, PushSender};
use crate::store::RecordStore;
use crate::types::{
    Caller, Disposition, DoctorId, HospitalId, Queue, QueueKey, QueueState, Ticket, TicketId,
    TicketStatus,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// How many tickets ahead of their turn holders still get an
/// approaching-turn push.
pub const DEFAULT_LOOKAHEAD: u32 = 3;

/// Result of one advance operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdvanceOutcome {
    /// The queue that advanced
    pub queue: QueueKey,
    /// New serving position
    pub current_number: u32,
    /// High-water mark of issued tickets
    pub last_assigned: u32,
    /// The ticket now being served; `None` when every remaining ticket was
    /// already resolved and the queue reached its end with nobody served
    pub serving: Option<Ticket>,
    /// The previously served ticket this advance closed, if any
    pub closed: Option<Ticket>,
}

/// Snapshot returned to a waiting client.
///
/// Only the caller's own ticket is included, so "tickets ahead of me" can
/// be shown without exposing other holders' identities.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueStatus {
    /// The queried queue
    pub queue: QueueKey,
    /// Derived serving state
    pub state: QueueState,
    /// Ticket currently being served (0 = none yet)
    pub current_number: u32,
    /// High-water mark of issued tickets (0 = nobody booked yet)
    pub last_assigned: u32,
    /// The caller's own ticket in this queue, if any
    pub your_ticket: Option<Ticket>,
    /// Scheduled tickets between the serving position and the caller's
    /// ticket; present only while the caller's ticket is still scheduled
    pub tickets_ahead: Option<u32>,
}

/// The Queue Ticketing & Real-Time Notification engine.
///
/// Owns the per-queue serialization discipline and drives the record
/// store, the change notifier, and the push dispatcher through their
/// trait seams.
pub struct QueueService {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn ChangeNotifier>,
    push: Arc<dyn PushSender>,
    clock: Arc<dyn Clock>,
    /// One async lock per queue identity; entries are tiny and one per
    /// doctor-day, so the map is left to grow for the process lifetime.
    locks: StdMutex<HashMap<QueueKey, Arc<AsyncMutex<()>>>>,
    lookahead: u32,
}

impl QueueService {
    /// Creates a new queue service.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn ChangeNotifier>,
        push: Arc<dyn PushSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            notifier,
            push,
            clock,
            locks: StdMutex::new(HashMap::new()),
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }

    /// Override the approaching-turn lookahead window.
    #[must_use]
    pub fn with_lookahead(mut self, lookahead: u32) -> Self {
        self.lookahead = lookahead;
        self
    }

    fn queue_lock(&self, key: QueueKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key).or_default())
    }

    fn resolve_date(&self, date: Option<NaiveDate>) -> NaiveDate {
        date.unwrap_or_else(|| self.clock.now().date_naive())
    }

    // ========================================================================
    // Booking (ticket allocator)
    // ========================================================================

    /// Book a ticket in the doctor's queue for `date` (today when absent).
    ///
    /// Lazily creates the queue — exactly once even under concurrent first
    /// bookings — and issues the next number of the contiguous ascending
    /// sequence. Broadcasts the roster change on the queue topic.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if the record store fails.
    pub async fn book_ticket(
        &self,
        caller: &Caller,
        doctor: DoctorId,
        date: Option<NaiveDate>,
        reason: String,
    ) -> Result<Ticket, QueueError> {
        let key = QueueKey::new(doctor, self.resolve_date(date));
        let lock = self.queue_lock(key);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        self.store.create_or_fetch_queue(key, now).await?;
        let ticket = self
            .store
            .allocate_ticket(key, caller.account, reason, now)
            .await?;

        info!(
            queue = %key,
            ticket = %ticket.id,
            number = ticket.number,
            holder = %ticket.holder,
            "ticket booked"
        );
        metrics::counter!("cliniq_tickets_issued_total").increment(1);

        self.notifier
            .publish(
                Topic::Queue(key),
                LiveEvent::TicketBooked {
                    queue: key,
                    number: ticket.number,
                    last_assigned: ticket.number,
                },
            )
            .await;

        Ok(ticket)
    }

    // ========================================================================
    // Advancing (queue state machine)
    // ========================================================================

    /// Close the currently served ticket and move serving to the next
    /// eligible one.
    ///
    /// The scan-forward-skip rule: cancelled or otherwise resolved tickets
    /// never block advancement and are never re-served. When every
    /// remaining ticket is already resolved the counter lands on
    /// `last_assigned` with nobody served — a valid terminal condition.
    ///
    /// Emits one now-serving event on the queue topic, a personal status
    /// event to the closed holder, and then dispatches push messages on a
    /// detached task.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Unauthorized`] unless the caller is staff or doctor
    /// - [`QueueError::NotFound`] if no queue exists for the day
    /// - [`QueueError::QueueExhausted`] when no further advance is possible
    /// - [`QueueError::Storage`] if the record store fails
    pub async fn advance_queue(
        &self,
        caller: &Caller,
        doctor: DoctorId,
        date: Option<NaiveDate>,
        prior: Option<Disposition>,
    ) -> Result<AdvanceOutcome, QueueError> {
        if !caller.role.can_manage_queue() {
            return Err(QueueError::Unauthorized(format!(
                "role {} cannot advance queues",
                caller.role
            )));
        }

        let key = QueueKey::new(doctor, self.resolve_date(date));
        let lock = self.queue_lock(key);
        let _guard = lock.lock().await;

        let queue = self
            .store
            .queue(key)
            .await?
            .ok_or_else(|| QueueError::not_found("queue", key))?;

        if !queue.can_advance() {
            return Err(QueueError::QueueExhausted {
                current: queue.current_number,
                last_assigned: queue.last_assigned,
            });
        }

        let now = self.clock.now();
        let closed = self.close_current(&queue, prior.unwrap_or(Disposition::Completed), now).await?;

        // Scan forward for the first still-scheduled ticket.
        let upcoming = self.store.tickets_from(key, queue.current_number + 1).await?;
        let serving = upcoming
            .iter()
            .find(|t| t.status == TicketStatus::Scheduled)
            .cloned();
        let new_current = serving
            .as_ref()
            .map_or(queue.last_assigned, |t| t.number);

        let applied = self
            .store
            .set_current_number(key, queue.current_number, new_current)
            .await?;
        if !applied {
            return Err(QueueError::Conflict(format!(
                "queue {key} was advanced concurrently"
            )));
        }

        info!(
            queue = %key,
            from = queue.current_number,
            to = new_current,
            serving = serving.is_some(),
            "queue advanced"
        );
        metrics::counter!("cliniq_queue_advances_total").increment(1);

        self.notifier
            .publish(
                Topic::Queue(key),
                LiveEvent::NowServing {
                    queue: key,
                    current_number: new_current,
                    serving: serving.as_ref().map(|t| t.id),
                },
            )
            .await;
        if let Some(ticket) = &closed {
            self.notifier
                .publish(
                    Topic::Account(ticket.holder),
                    LiveEvent::TicketStatusChanged {
                        ticket: ticket.id,
                        queue: key,
                        number: ticket.number,
                        status: ticket.status,
                    },
                )
                .await;
        }

        // Holders just behind the new serving position, nearest first.
        let approaching: Vec<Ticket> = upcoming
            .iter()
            .filter(|t| t.status == TicketStatus::Scheduled && t.number > new_current)
            .take(self.lookahead as usize)
            .cloned()
            .collect();
        self.dispatch_after_advance(key, new_current, serving.clone(), approaching, closed.clone());

        Ok(AdvanceOutcome {
            queue: key,
            current_number: new_current,
            last_assigned: queue.last_assigned,
            serving,
            closed,
        })
    }

    /// Close the ticket at the queue's serving position, if it is still
    /// scheduled. Already-terminal tickets (e.g. cancelled while being
    /// served) are left untouched.
    async fn close_current(
        &self,
        queue: &Queue,
        disposition: Disposition,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<Ticket>, QueueError> {
        if queue.current_number == 0 {
            return Ok(None);
        }
        let Some(mut ticket) = self
            .store
            .ticket_by_number(queue.key, queue.current_number)
            .await?
        else {
            return Ok(None);
        };
        if ticket.status != TicketStatus::Scheduled {
            return Ok(None);
        }

        let status = TicketStatus::from(disposition);
        let applied = self.store.close_ticket(ticket.id, status, now).await?;
        if !applied {
            return Ok(None);
        }
        ticket.status = status;
        ticket.resolved_at = Some(now);
        metrics::counter!("cliniq_tickets_resolved_total", "status" => status.to_string())
            .increment(1);
        Ok(Some(ticket))
    }

    // ========================================================================
    // Out-of-band status changes
    // ========================================================================

    /// Close a ticket out-of-band (completed early, or recorded as a
    /// no-show) without moving the serving counter.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Unauthorized`] unless the caller is staff or doctor
    /// - [`QueueError::NotFound`] if the ticket does not exist
    /// - [`QueueError::Conflict`] if the ticket is already terminal
    /// - [`QueueError::Storage`] if the record store fails
    pub async fn mark_ticket(
        &self,
        caller: &Caller,
        ticket_id: TicketId,
        disposition: Disposition,
    ) -> Result<Ticket, QueueError> {
        if !caller.role.can_manage_queue() {
            return Err(QueueError::Unauthorized(format!(
                "role {} cannot mark tickets",
                caller.role
            )));
        }

        let ticket = self
            .store
            .ticket(ticket_id)
            .await?
            .ok_or_else(|| QueueError::not_found("ticket", ticket_id))?;
        self.close_out_of_band(ticket, TicketStatus::from(disposition))
            .await
    }

    /// Cancel a ticket before it is completed.
    ///
    /// Holders may cancel their own tickets; staff may cancel any. A
    /// cancelled ticket keeps its number and is skipped by every later
    /// advance.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Unauthorized`] if the caller is neither the holder
    ///   nor staff
    /// - [`QueueError::NotFound`] if the ticket does not exist
    /// - [`QueueError::Conflict`] if the ticket is already terminal
    /// - [`QueueError::Storage`] if the record store fails
    pub async fn cancel_ticket(
        &self,
        caller: &Caller,
        ticket_id: TicketId,
    ) -> Result<Ticket, QueueError> {
        let ticket = self
            .store
            .ticket(ticket_id)
            .await?
            .ok_or_else(|| QueueError::not_found("ticket", ticket_id))?;
        if ticket.holder != caller.account && !caller.role.can_manage_queue() {
            return Err(QueueError::Unauthorized(
                "only the ticket holder or staff may cancel".to_string(),
            ));
        }
        self.close_out_of_band(ticket, TicketStatus::Cancelled).await
    }

    async fn close_out_of_band(
        &self,
        mut ticket: Ticket,
        status: TicketStatus,
    ) -> Result<Ticket, QueueError> {
        let key = ticket.queue;
        let lock = self.queue_lock(key);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let applied = self.store.close_ticket(ticket.id, status, now).await?;
        if !applied {
            return Err(QueueError::Conflict(format!(
                "ticket {} is already resolved",
                ticket.id
            )));
        }
        ticket.status = status;
        ticket.resolved_at = Some(now);

        info!(queue = %key, ticket = %ticket.id, %status, "ticket closed out-of-band");
        metrics::counter!("cliniq_tickets_resolved_total", "status" => status.to_string())
            .increment(1);

        let event = LiveEvent::TicketStatusChanged {
            ticket: ticket.id,
            queue: key,
            number: ticket.number,
            status,
        };
        self.notifier.publish(Topic::Queue(key), event.clone()).await;
        self.notifier.publish(Topic::Account(ticket.holder), event).await;

        // Cancellation is holder-initiated (or staff housekeeping); only
        // completed/missed closures push to the holder's devices.
        if status != TicketStatus::Cancelled {
            self.dispatch_resolution(ticket.clone());
        }

        Ok(ticket)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current serving position plus the caller's own ticket.
    ///
    /// A missing queue is not an error — it means nobody has booked yet
    /// that day, and the empty idle snapshot is returned.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] if the record store fails.
    pub async fn queue_status(
        &self,
        caller: &Caller,
        doctor: DoctorId,
        date: Option<NaiveDate>,
    ) -> Result<QueueStatus, QueueError> {
        let key = QueueKey::new(doctor, self.resolve_date(date));
        let Some(queue) = self.store.queue(key).await? else {
            return Ok(QueueStatus {
                queue: key,
                state: QueueState::Idle,
                current_number: 0,
                last_assigned: 0,
                your_ticket: None,
                tickets_ahead: None,
            });
        };

        let your_ticket = self.store.ticket_for_holder(key, caller.account).await?;
        let tickets_ahead = match &your_ticket {
            Some(t) if t.status == TicketStatus::Scheduled && t.number > queue.current_number => {
                let between = self
                    .store
                    .tickets_from(key, queue.current_number + 1)
                    .await?
                    .iter()
                    .filter(|other| {
                        other.status == TicketStatus::Scheduled && other.number < t.number
                    })
                    .count();
                #[allow(clippy::cast_possible_truncation)]
                let between = between as u32;
                Some(between)
            }
            _ => None,
        };

        Ok(QueueStatus {
            queue: key,
            state: queue.state(),
            current_number: queue.current_number,
            last_assigned: queue.last_assigned,
            your_ticket,
            tickets_ahead,
        })
    }

    // ========================================================================
    // Hospital alerts
    // ========================================================================

    /// Broadcast an alert to every live subscriber of the hospital topic.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Unauthorized`] unless the caller is staff or
    /// doctor.
    pub async fn hospital_alert(
        &self,
        caller: &Caller,
        hospital: HospitalId,
        message: String,
    ) -> Result<(), QueueError> {
        if !caller.role.can_manage_queue() {
            return Err(QueueError::Unauthorized(format!(
                "role {} cannot send hospital alerts",
                caller.role
            )));
        }
        metrics::counter!("cliniq_hospital_alerts_total").increment(1);
        self.notifier
            .publish(
                Topic::Hospital(hospital),
                LiveEvent::HospitalAlert { hospital, message },
            )
            .await;
        Ok(())
    }

    // ========================================================================
    // Detached push dispatch
    // ========================================================================

    fn dispatch_after_advance(
        &self,
        key: QueueKey,
        current_number: u32,
        serving: Option<Ticket>,
        approaching: Vec<Ticket>,
        closed: Option<Ticket>,
    ) {
        let push = Arc::clone(&self.push);
        tokio::spawn(async move {
            if let Some(ticket) = &serving {
                let report = push
                    .notify(
                        ticket.holder,
                        MessageKind::NowServing,
                        json!({
                            "queue": key,
                            "number": ticket.number,
                        }),
                    )
                    .await;
                debug!(holder = %ticket.holder, ?report, "now-serving push dispatched");
            }
            for (ahead, ticket) in approaching.iter().enumerate() {
                let report = push
                    .notify(
                        ticket.holder,
                        MessageKind::ApproachingTurn,
                        json!({
                            "queue": key,
                            "number": ticket.number,
                            "current_number": current_number,
                            "tickets_ahead": ahead + 1,
                        }),
                    )
                    .await;
                if !report.is_clean() {
                    warn!(holder = %ticket.holder, ?report, "approaching-turn push degraded");
                }
            }
            if let Some(ticket) = closed {
                dispatch_resolved(push.as_ref(), &ticket).await;
            }
        });
    }

    fn dispatch_resolution(&self, ticket: Ticket) {
        let push = Arc::clone(&self.push);
        tokio::spawn(async move {
            dispatch_resolved(push.as_ref(), &ticket).await;
        });
    }
}

/// Ticket-resolved pushes, plus feedback eligibility for completed visits.
async fn dispatch_resolved(push: &dyn PushSender, ticket: &Ticket) {
    let params = json!({
        "queue": ticket.queue,
        "number": ticket.number,
        "status": ticket.status,
    });
    let report = push
        .notify(ticket.holder, MessageKind::TicketResolved, params.clone())
        .await;
    debug!(holder = %ticket.holder, ?report, "ticket-resolved push dispatched");

    if ticket.status == TicketStatus::Completed {
        let report = push
            .notify(ticket.holder, MessageKind::FeedbackEligible, params)
            .await;
        debug!(holder = %ticket.holder, ?report, "feedback-eligible push dispatched");
    }
}
