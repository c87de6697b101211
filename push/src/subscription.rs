//! Push subscription entity and storage seam.
//!
//! A subscription is one registered device endpoint for one account, in
//! the Web Push shape: the delivery URL plus the client's `p256dh` and
//! `auth` keys. Endpoints are globally unique. A subscription whose
//! endpoint the delivery service reports as gone is marked inactive —
//! never deleted — and stays retired until the client re-registers.

use crate::error::PushError;
use chrono::{DateTime, Utc};
use cliniq_core::AccountId;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Client-side encryption keys accompanying a Web Push subscription.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// Client public key (P-256, base64url)
    pub p256dh: String,
    /// Client auth secret (base64url)
    pub auth: String,
}

/// One registered device endpoint owned by one account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Delivery endpoint URL; globally unique
    pub endpoint: String,
    /// Owning account
    pub account: AccountId,
    /// Delivery keys
    pub keys: SubscriptionKeys,
    /// Whether deliveries are still attempted to this endpoint
    pub is_active: bool,
    /// When the subscription was registered
    pub created_at: DateTime<Utc>,
    /// Last successful delivery, if any
    pub last_used: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Creates a new active subscription.
    #[must_use]
    pub const fn new(
        endpoint: String,
        account: AccountId,
        keys: SubscriptionKeys,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            endpoint,
            account,
            keys,
            is_active: true,
            created_at,
            last_used: None,
        }
    }
}

/// Boxed future returned by [`SubscriptionStore`] methods.
pub type SubscriptionFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, PushError>> + Send + 'a>>;

/// Durable storage for push subscriptions, keyed by endpoint.
///
/// # Implementations
///
/// - `PostgresSubscriptionStore` (in `cliniq-postgres`)
/// - `InMemorySubscriptionStore` (in `cliniq-testing`)
pub trait SubscriptionStore: Send + Sync {
    /// Upsert by endpoint: a re-registered endpoint is reactivated and
    /// adopts the registering account as its owner.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Storage`] if the store fails.
    fn register(&self, subscription: Subscription) -> SubscriptionFuture<'_, ()>;

    /// Flip the endpoint's `is_active` off. Returns whether the endpoint
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Storage`] if the store fails.
    fn deactivate(&self, endpoint: &str) -> SubscriptionFuture<'_, bool>;

    /// All active subscriptions owned by the account.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Storage`] if the store fails.
    fn active_for_account(&self, account: AccountId) -> SubscriptionFuture<'_, Vec<Subscription>>;

    /// Refresh the endpoint's `last_used` stamp after a successful
    /// delivery.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Storage`] if the store fails.
    fn mark_delivered(&self, endpoint: &str, at: DateTime<Utc>) -> SubscriptionFuture<'_, ()>;
}
