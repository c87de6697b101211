//! # Cliniq Testing
//!
//! In-memory test doubles for the Cliniq workspace:
//!
//! - [`InMemoryRecordStore`]: deterministic queue/ticket storage
//! - [`CapturingNotifier`]: records every published live event
//! - [`InMemorySubscriptionStore`] / [`ScriptedPushGateway`] /
//!   [`RecordingPushSender`]: push-side doubles
//! - [`FixedClock`] / [`test_clock`]: deterministic time

pub mod notifier;
pub mod push;
pub mod store;

use chrono::{DateTime, Utc};
use cliniq_core::Clock;

pub use notifier::CapturingNotifier;
pub use push::{
    InMemorySubscriptionStore, RecordingPushSender, ScriptedOutcome, ScriptedPushGateway,
};
pub use store::InMemoryRecordStore;

/// Fixed clock for deterministic tests.
///
/// Always returns the same time, making tests reproducible.
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-06-02 09:00:00 UTC).
///
/// # Panics
///
/// Panics if the hardcoded timestamp fails to parse, which cannot happen.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-06-02T09:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_fixed() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }
}
