//! Push-side test doubles: subscription store, scripted gateway, and a
//! recording sender for engine tests that don't need the real dispatcher.

use chrono::{DateTime, Utc};
use cliniq_core::{AccountId, DispatchReport, MessageKind, PushSender};
use cliniq_push::error::DeliveryError;
use cliniq_push::gateway::{DeliveryFuture, PushGateway};
use cliniq_push::subscription::{Subscription, SubscriptionFuture, SubscriptionStore};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

// ============================================================================
// Subscription store
// ============================================================================

/// In-memory implementation of [`SubscriptionStore`], keyed by endpoint.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    inner: Mutex<HashMap<String, Subscription>>,
}

impl InMemorySubscriptionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Subscription>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch one subscription by endpoint (test assertion helper).
    #[must_use]
    pub fn get(&self, endpoint: &str) -> Option<Subscription> {
        self.map().get(endpoint).cloned()
    }
}

impl SubscriptionStore for InMemorySubscriptionStore {
    fn register(&self, subscription: Subscription) -> SubscriptionFuture<'_, ()> {
        self.map()
            .insert(subscription.endpoint.clone(), subscription);
        Box::pin(async { Ok(()) })
    }

    fn deactivate(&self, endpoint: &str) -> SubscriptionFuture<'_, bool> {
        let existed = match self.map().get_mut(endpoint) {
            Some(subscription) => {
                subscription.is_active = false;
                true
            }
            None => false,
        };
        Box::pin(async move { Ok(existed) })
    }

    fn active_for_account(&self, account: AccountId) -> SubscriptionFuture<'_, Vec<Subscription>> {
        let mut subscriptions: Vec<Subscription> = self
            .map()
            .values()
            .filter(|s| s.account == account && s.is_active)
            .cloned()
            .collect();
        subscriptions.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        Box::pin(async move { Ok(subscriptions) })
    }

    fn mark_delivered(&self, endpoint: &str, at: DateTime<Utc>) -> SubscriptionFuture<'_, ()> {
        if let Some(subscription) = self.map().get_mut(endpoint) {
            subscription.last_used = Some(at);
        }
        Box::pin(async { Ok(()) })
    }
}

// ============================================================================
// Delivery gateway
// ============================================================================

/// Scripted per-endpoint delivery behavior.
#[derive(Clone, Debug)]
pub enum ScriptedOutcome {
    /// The delivery service accepts the payload
    Accept,
    /// The endpoint is permanently gone
    Gone,
    /// A transient failure with the given reason
    Transient(String),
    /// The delivery service never answers (exercises dispatcher timeouts)
    Hang,
}

/// Gateway whose outcome per endpoint is scripted ahead of the test.
///
/// Unscripted endpoints accept deliveries. Every accepted payload is
/// recorded for assertions.
#[derive(Default)]
pub struct ScriptedPushGateway {
    outcomes: Mutex<HashMap<String, ScriptedOutcome>>,
    delivered: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ScriptedPushGateway {
    /// Creates a gateway that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome for one endpoint.
    pub fn script(&self, endpoint: impl Into<String>, outcome: ScriptedOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(endpoint.into(), outcome);
    }

    /// Every accepted `(endpoint, payload)` pair, in delivery order.
    #[must_use]
    pub fn deliveries(&self) -> Vec<(String, Vec<u8>)> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PushGateway for ScriptedPushGateway {
    fn deliver<'a>(
        &'a self,
        subscription: &'a Subscription,
        payload: &'a [u8],
    ) -> DeliveryFuture<'a> {
        let outcome = self
            .outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&subscription.endpoint)
            .cloned()
            .unwrap_or(ScriptedOutcome::Accept);
        Box::pin(async move {
            match outcome {
                ScriptedOutcome::Accept => {
                    self.delivered
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((subscription.endpoint.clone(), payload.to_vec()));
                    Ok(())
                }
                ScriptedOutcome::Gone => Err(DeliveryError::EndpointGone),
                ScriptedOutcome::Transient(reason) => Err(DeliveryError::Transient(reason)),
                ScriptedOutcome::Hang => {
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                    Err(DeliveryError::Transient("unreachable".to_string()))
                }
            }
        })
    }
}

// ============================================================================
// Recording sender
// ============================================================================

/// [`PushSender`] double that records every notify call and reports a
/// clean dispatch, for engine tests that don't exercise the dispatcher.
#[derive(Default)]
pub struct RecordingPushSender {
    notifications: Mutex<Vec<(AccountId, MessageKind, serde_json::Value)>>,
}

impl RecordingPushSender {
    /// Creates an empty sender.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded `(account, kind, params)` triple, in call order.
    #[must_use]
    pub fn notifications(&self) -> Vec<(AccountId, MessageKind, serde_json::Value)> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded kinds sent to one account, in call order.
    #[must_use]
    pub fn kinds_for(&self, account: AccountId) -> Vec<MessageKind> {
        self.notifications()
            .into_iter()
            .filter(|(a, _, _)| *a == account)
            .map(|(_, kind, _)| kind)
            .collect()
    }
}

impl PushSender for RecordingPushSender {
    fn notify(
        &self,
        account: AccountId,
        kind: MessageKind,
        params: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = DispatchReport> + Send + '_>> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((account, kind, params));
        Box::pin(async { DispatchReport::default() })
    }
}
