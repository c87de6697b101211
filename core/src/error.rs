//! Error taxonomy for queue operations.
//!
//! Allocator and state-machine errors abort the triggering request and are
//! returned to the caller. Notifier and push-dispatcher failures are
//! deliberately NOT part of this enum: they are isolated inside their
//! components and can never fail a queue mutation.

use thiserror::Error;

/// Errors that can occur during queue operations.
#[derive(Error, Debug)]
pub enum QueueError {
    /// A queue, ticket, or account was not found. Surfaced, never retried.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was missing
        entity: &'static str,
        /// Identity that was looked up
        id: String,
    },

    /// A state transition or unique constraint was violated.
    ///
    /// The create-or-fetch race on queue creation is resolved internally
    /// (fetch after conflict) and never surfaces as this variant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An advance was requested past the end of the queue.
    ///
    /// This is a normal terminal condition of the day's line, not a system
    /// fault.
    #[error("queue exhausted: serving {current} of {last_assigned}")]
    QueueExhausted {
        /// Ticket currently being served
        current: u32,
        /// High-water mark of issued tickets
        last_assigned: u32,
    },

    /// The caller's role does not permit the operation. Never retried.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The record store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl QueueError {
    /// Convenience constructor for [`QueueError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let err = QueueError::not_found("ticket", "abc");
        assert_eq!(err.to_string(), "ticket not found: abc");

        let err = QueueError::QueueExhausted {
            current: 4,
            last_assigned: 4,
        };
        assert_eq!(err.to_string(), "queue exhausted: serving 4 of 4");
    }
}
