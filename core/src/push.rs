//! Push delivery seam.
//!
//! Push is a best-effort convenience channel for holders who are not
//! live-connected; it is never a correctness dependency of the queue. The
//! engine hands a message kind plus template parameters to a
//! [`PushSender`] and moves on — delivery failures stay inside the
//! dispatcher and are reported only as an aggregate.

use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Kinds of push message the queue domain sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    /// The holder's number was just reached
    NowServing,
    /// The holder is within the lookahead window of being served
    ApproachingTurn,
    /// The holder's ticket reached a terminal status
    TicketResolved,
    /// The holder's completed visit is eligible for feedback
    FeedbackEligible,
}

impl MessageKind {
    /// Stable wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NowServing => "now-serving",
            Self::ApproachingTurn => "approaching-turn",
            Self::TicketResolved => "ticket-resolved",
            Self::FeedbackEligible => "feedback-eligible",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregated result of one fan-out to an account's registered devices.
///
/// Per-endpoint failures never surface as errors; they are counted here
/// and logged by the dispatcher. An account with zero active
/// subscriptions yields the all-zero report, which counts as success.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Endpoints a delivery was attempted to
    pub attempted: usize,
    /// Deliveries accepted by the delivery service
    pub delivered: usize,
    /// Endpoints permanently retired because the service reported them gone
    pub retired: usize,
    /// Transient failures (logged, not retried)
    pub failed: usize,
}

impl DispatchReport {
    /// Whether every attempted delivery succeeded (vacuously true for an
    /// account with no active subscriptions).
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.retired == 0 && self.failed == 0
    }
}

/// Trait for best-effort push notification of an account's devices.
///
/// # Dyn Compatibility
///
/// Explicit `Pin<Box<dyn Future>>` returns keep the trait usable as
/// `Arc<dyn PushSender>` inside the engine's environment.
pub trait PushSender: Send + Sync {
    /// Attempt delivery of `kind` with `params` to every active
    /// subscription of `account`.
    ///
    /// Infallible by contract: partial failure is expressed in the
    /// returned [`DispatchReport`], never as an error.
    fn notify(
        &self,
        account: AccountId,
        kind: MessageKind,
        params: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = DispatchReport> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names() {
        assert_eq!(MessageKind::NowServing.as_str(), "now-serving");
        assert_eq!(MessageKind::ApproachingTurn.as_str(), "approaching-turn");
    }

    #[test]
    fn empty_report_is_clean() {
        assert!(DispatchReport::default().is_clean());
        let partial = DispatchReport {
            attempted: 2,
            delivered: 1,
            retired: 1,
            failed: 0,
        };
        assert!(!partial.is_clean());
    }
}
