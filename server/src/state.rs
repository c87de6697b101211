//! Application state for the Cliniq HTTP server.
//!
//! Contains the shared resources handlers need: the queue engine, the
//! topic broadcaster backing the WebSocket surface, the push subscription
//! store for device registration, and the clock.

use axum::extract::FromRef;
use cliniq_core::{Clock, QueueService};
use cliniq_push::SubscriptionStore;
use cliniq_web::TopicBroadcaster;
use std::sync::Arc;

/// Shared state cloned (cheaply, via Arcs) into every handler.
#[derive(Clone)]
pub struct AppState {
    /// The queue ticketing engine
    pub service: Arc<QueueService>,

    /// Live-event fan-out backing `/ws`
    pub broadcaster: TopicBroadcaster,

    /// Push subscription storage for device registration
    pub subscriptions: Arc<dyn SubscriptionStore>,

    /// Clock for registration timestamps
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        service: Arc<QueueService>,
        broadcaster: TopicBroadcaster,
        subscriptions: Arc<dyn SubscriptionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service,
            broadcaster,
            subscriptions,
            clock,
        }
    }
}

// Lets the WebSocket handler extract the broadcaster directly.
impl FromRef<AppState> for TopicBroadcaster {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.broadcaster.clone()
    }
}
