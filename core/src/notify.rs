//! Live change notification: topics, events, and the notifier seam.
//!
//! Every queue-state and ticket-status transition fans out to the
//! subscribers of a topic. Delivery is fire-and-forget with no
//! acknowledgment and no replay: a subscriber connecting after an event was
//! published never sees it, so clients re-fetch current state on
//! (re)connect. There is no durable event log behind this module by
//! design; that is an accepted limitation, not a bug.
//!
//! # Topics
//!
//! A topic is an ephemeral routing key with current membership only:
//!
//! - `queue:{doctor}:{date}` — roster and current-number changes of one
//!   doctor-day line
//! - `account:{id}` — personal ticket-status changes
//! - `hospital:{id}` — hospital-wide alerts
//!
//! # Ordering
//!
//! Events published by a single sequential caller are delivered to each
//! subscriber in publish order (per-queue operations are serialized, which
//! makes this trivial). Nothing is guaranteed across different queues or
//! across reconnects.

use crate::types::{AccountId, HospitalId, QueueKey, TicketId, TicketStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Routing key live subscribers join to receive events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// One doctor-day queue
    Queue(QueueKey),
    /// One account's personal channel
    Account(AccountId),
    /// One hospital's alert channel
    Hospital(HospitalId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue(key) => write!(f, "queue:{key}"),
            Self::Account(id) => write!(f, "account:{id}"),
            Self::Hospital(id) => write!(f, "hospital:{id}"),
        }
    }
}

/// A state-change event broadcast to live subscribers.
///
/// The serde tag doubles as the wire-level event type, so subscribers can
/// dispatch on `type` without knowing the Rust enum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// A new ticket joined the roster
    TicketBooked {
        /// Queue the ticket was issued in
        queue: QueueKey,
        /// The new ticket's number
        number: u32,
        /// High-water mark after the booking
        last_assigned: u32,
    },
    /// The serving counter moved
    NowServing {
        /// Queue that advanced
        queue: QueueKey,
        /// New serving position
        current_number: u32,
        /// Ticket actually being served, absent when the queue ran out
        /// with every remaining ticket already resolved
        serving: Option<TicketId>,
    },
    /// A ticket's lifecycle status changed
    TicketStatusChanged {
        /// The ticket that changed
        ticket: TicketId,
        /// Queue the ticket belongs to
        queue: QueueKey,
        /// The ticket's number
        number: u32,
        /// The new status
        status: TicketStatus,
    },
    /// A hospital-wide alert
    HospitalAlert {
        /// Hospital the alert addresses
        hospital: HospitalId,
        /// Alert text
        message: String,
    },
}

/// Trait for fan-out of live events to currently connected subscribers.
///
/// Publishing never fails and never blocks on slow subscribers: delivery
/// is best-effort to whoever is connected right now. Implementations must
/// preserve per-topic publish order for a single sequential publisher.
///
/// # Implementations
///
/// - `TopicBroadcaster` (in `cliniq-web`): per-topic broadcast channels
///   bridged to WebSocket clients
/// - `CapturingNotifier` (in `cliniq-testing`): records events for
///   assertions
///
/// # Dyn Compatibility
///
/// Explicit `Pin<Box<dyn Future>>` returns keep the trait usable as
/// `Arc<dyn ChangeNotifier>` inside the engine's environment.
pub trait ChangeNotifier: Send + Sync {
    /// Deliver `event` to every current subscriber of `topic`.
    fn publish(
        &self,
        topic: Topic,
        event: LiveEvent,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::DoctorId;
    use chrono::NaiveDate;

    #[test]
    fn topic_rendering() {
        let doctor = DoctorId::new();
        let key = QueueKey::new(doctor, NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        assert_eq!(
            Topic::Queue(key).to_string(),
            format!("queue:{doctor}:2025-06-02")
        );

        let account = AccountId::new();
        assert_eq!(Topic::Account(account).to_string(), format!("account:{account}"));
    }

    #[test]
    fn event_wire_tag() {
        let event = LiveEvent::NowServing {
            queue: QueueKey::new(DoctorId::new(), NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()),
            current_number: 3,
            serving: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "now_serving");
        assert_eq!(json["current_number"], 3);
    }
}
