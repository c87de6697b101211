//! Delivery gateway: the opaque "send to endpoint with payload" boundary.
//!
//! The dispatcher only needs three answers from the delivery service:
//! accepted, endpoint permanently gone, or a transient failure. Everything
//! else about the provider stays behind this trait.

use crate::error::DeliveryError;
use crate::subscription::Subscription;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

/// Boxed future returned by [`PushGateway::deliver`].
pub type DeliveryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;

/// Trait for the outbound push delivery service.
///
/// # Implementations
///
/// - [`HttpPushGateway`]: posts to Web Push endpoints over HTTPS
/// - `ScriptedPushGateway` (in `cliniq-testing`): per-endpoint scripted
///   outcomes for tests
pub trait PushGateway: Send + Sync {
    /// Attempt a single delivery of `payload` to the subscription's
    /// endpoint.
    ///
    /// # Errors
    ///
    /// - [`DeliveryError::EndpointGone`] when the service reports the
    ///   endpoint no longer exists
    /// - [`DeliveryError::Transient`] for any other failure
    fn deliver<'a>(&'a self, subscription: &'a Subscription, payload: &'a [u8])
        -> DeliveryFuture<'a>;
}

/// Default time-to-live the push service holds undelivered messages for.
const PUSH_TTL_SECONDS: u32 = 300;

/// HTTP gateway speaking the delivery side of the Web Push protocol.
///
/// Payloads are posted to the subscription endpoint with `TTL` and
/// `Urgency` headers. A `404` or `410` response means the browser vendor
/// discarded the endpoint, which the dispatcher treats as a permanent
/// retirement; every other failure is transient.
#[derive(Clone)]
pub struct HttpPushGateway {
    client: Client,
}

impl HttpPushGateway {
    /// Create a gateway whose individual requests time out after
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Transient`] if the HTTP client cannot be
    /// constructed.
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;
        Ok(Self { client })
    }
}

impl PushGateway for HttpPushGateway {
    fn deliver<'a>(
        &'a self,
        subscription: &'a Subscription,
        payload: &'a [u8],
    ) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let response = self
                .client
                .post(&subscription.endpoint)
                .header("TTL", PUSH_TTL_SECONDS)
                .header("Urgency", "normal")
                .header("Content-Type", "application/octet-stream")
                .body(payload.to_vec())
                .send()
                .await
                .map_err(|e| DeliveryError::Transient(e.to_string()))?;

            match response.status() {
                status if status.is_success() => {
                    debug!(endpoint = %subscription.endpoint, "push delivery accepted");
                    Ok(())
                }
                StatusCode::NOT_FOUND | StatusCode::GONE => Err(DeliveryError::EndpointGone),
                status => {
                    let body = response.text().await.unwrap_or_default();
                    Err(DeliveryError::Transient(format!(
                        "push service returned {status}: {body}"
                    )))
                }
            }
        })
    }
}
