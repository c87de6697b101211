//! Push-side errors.
//!
//! Nothing in this module ever reaches the caller of a queue operation:
//! subscription-store failures are logged and swallowed by the
//! dispatcher, and per-endpoint delivery failures are aggregated into the
//! dispatch report.

use thiserror::Error;

/// Errors internal to the push dispatcher.
#[derive(Error, Debug)]
pub enum PushError {
    /// The subscription store failed.
    #[error("subscription storage error: {0}")]
    Storage(String),
}

/// Failure modes of one delivery attempt, as reported by the delivery
/// service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The endpoint no longer exists; the subscription must be retired.
    #[error("endpoint gone")]
    EndpointGone,

    /// A transient failure; the attempt is logged and not retried.
    #[error("transient delivery failure: {0}")]
    Transient(String),
}
