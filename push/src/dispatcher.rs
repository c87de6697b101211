//! Fan-out of one push message to every registered device of an account.
//!
//! Endpoint attempts are independent and concurrent: one dead or slow
//! endpoint never blocks the rest of the fan-out. A permanent failure
//! retires the endpoint on the spot (no backoff, no retry); a transient
//! failure is logged and counted. The aggregate partial-success result is
//! all the engine ever sees — push can degrade, the queue cannot.

use crate::error::DeliveryError;
use crate::gateway::PushGateway;
use crate::subscription::{Subscription, SubscriptionStore};
use cliniq_core::{AccountId, Clock, DispatchReport, MessageKind, PushSender};
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on a single endpoint delivery attempt.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

enum AttemptOutcome {
    Delivered,
    Retired,
    Failed,
}

/// Best-effort push dispatcher over a subscription store and a delivery
/// gateway.
pub struct PushDispatcher {
    subscriptions: Arc<dyn SubscriptionStore>,
    gateway: Arc<dyn PushGateway>,
    clock: Arc<dyn Clock>,
    delivery_timeout: Duration,
}

impl PushDispatcher {
    /// Creates a new dispatcher.
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        gateway: Arc<dyn PushGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            gateway,
            clock,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    /// Override the per-endpoint delivery timeout.
    #[must_use]
    pub const fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    async fn attempt(&self, subscription: &Subscription, payload: &[u8]) -> AttemptOutcome {
        let delivery = self.gateway.deliver(subscription, payload);
        match tokio::time::timeout(self.delivery_timeout, delivery).await {
            Ok(Ok(())) => {
                if let Err(e) = self
                    .subscriptions
                    .mark_delivered(&subscription.endpoint, self.clock.now())
                    .await
                {
                    warn!(endpoint = %subscription.endpoint, error = %e, "failed to stamp delivery");
                }
                AttemptOutcome::Delivered
            }
            Ok(Err(DeliveryError::EndpointGone)) => {
                warn!(
                    endpoint = %subscription.endpoint,
                    account = %subscription.account,
                    "endpoint gone, retiring subscription"
                );
                if let Err(e) = self.subscriptions.deactivate(&subscription.endpoint).await {
                    warn!(endpoint = %subscription.endpoint, error = %e, "failed to retire endpoint");
                }
                AttemptOutcome::Retired
            }
            Ok(Err(DeliveryError::Transient(reason))) => {
                warn!(
                    endpoint = %subscription.endpoint,
                    %reason,
                    "transient push delivery failure"
                );
                AttemptOutcome::Failed
            }
            Err(_elapsed) => {
                warn!(
                    endpoint = %subscription.endpoint,
                    timeout = ?self.delivery_timeout,
                    "push delivery timed out"
                );
                AttemptOutcome::Failed
            }
        }
    }
}

impl PushSender for PushDispatcher {
    fn notify(
        &self,
        account: AccountId,
        kind: MessageKind,
        params: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = DispatchReport> + Send + '_>> {
        Box::pin(async move {
            let subscriptions = match self.subscriptions.active_for_account(account).await {
                Ok(subscriptions) => subscriptions,
                Err(e) => {
                    warn!(%account, error = %e, "could not load subscriptions, skipping push");
                    return DispatchReport::default();
                }
            };
            // No devices registered: push is a convenience channel, so this
            // is a trivially successful no-op.
            if subscriptions.is_empty() {
                return DispatchReport::default();
            }

            let payload = match serde_json::to_vec(&json!({
                "kind": kind.as_str(),
                "params": params,
            })) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(%account, %kind, error = %e, "unserializable push payload, skipping");
                    return DispatchReport::default();
                }
            };

            let attempts = subscriptions
                .iter()
                .map(|subscription| self.attempt(subscription, &payload));
            let outcomes = futures::future::join_all(attempts).await;

            let mut report = DispatchReport {
                attempted: subscriptions.len(),
                ..DispatchReport::default()
            };
            for outcome in outcomes {
                match outcome {
                    AttemptOutcome::Delivered => report.delivered += 1,
                    AttemptOutcome::Retired => report.retired += 1,
                    AttemptOutcome::Failed => report.failed += 1,
                }
            }

            metrics::counter!("cliniq_push_deliveries_total", "outcome" => "delivered")
                .increment(report.delivered as u64);
            metrics::counter!("cliniq_push_deliveries_total", "outcome" => "retired")
                .increment(report.retired as u64);
            metrics::counter!("cliniq_push_deliveries_total", "outcome" => "failed")
                .increment(report.failed as u64);

            debug!(%account, %kind, ?report, "push fan-out complete");
            report
        })
    }
}
