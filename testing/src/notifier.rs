//! Capture-all change notifier.

use cliniq_core::{ChangeNotifier, LiveEvent, Topic};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

/// Notifier that records every published event for assertions.
///
/// Events are stored in publish order together with the rendered topic
/// string, mirroring what a live subscriber of that topic would see.
#[derive(Default)]
pub struct CapturingNotifier {
    events: Mutex<Vec<(String, LiveEvent)>>,
}

impl CapturingNotifier {
    /// Creates an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every captured `(topic, event)` pair, in publish order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, LiveEvent)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events published on one topic, in publish order.
    #[must_use]
    pub fn for_topic(&self, topic: &str) -> Vec<LiveEvent> {
        self.events()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, event)| event)
            .collect()
    }
}

impl ChangeNotifier for CapturingNotifier {
    fn publish(
        &self,
        topic: Topic,
        event: LiveEvent,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_string(), event));
        Box::pin(async {})
    }
}
