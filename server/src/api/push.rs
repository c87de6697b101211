//! Push subscription API endpoints.
//!
//! - PUT /api/push/subscriptions - Register a device endpoint
//! - DELETE /api/push/subscriptions - Deactivate a device endpoint
//!
//! Knowledge of the (long, random) endpoint URL is the deactivation
//! credential, as is conventional for Web Push.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use cliniq_core::Clock;
use cliniq_push::{Subscription, SubscriptionKeys};
use cliniq_web::{AppError, CallerIdentity};
use serde::Deserialize;
use tracing::info;

/// Request to register a device endpoint.
#[derive(Debug, Deserialize)]
pub struct RegisterSubscriptionRequest {
    /// Delivery endpoint URL
    pub endpoint: String,
    /// Delivery keys from the browser's subscription object
    pub keys: SubscriptionKeysRequest,
}

/// Delivery keys as sent by the client.
#[derive(Debug, Deserialize)]
pub struct SubscriptionKeysRequest {
    /// Client public key
    pub p256dh: String,
    /// Client auth secret
    pub auth: String,
}

/// Request to deactivate a device endpoint.
#[derive(Debug, Deserialize)]
pub struct DeactivateSubscriptionRequest {
    /// Delivery endpoint URL to retire
    pub endpoint: String,
}

/// Register (or reactivate) a device endpoint for the caller's account.
///
/// # Example
///
/// ```bash
/// curl -X PUT http://localhost:8080/api/push/subscriptions \
///   -H "X-Account-Id: <account>" \
///   -H "Content-Type: application/json" \
///   -d '{ "endpoint": "https://fcm.googleapis.com/...", "keys": { "p256dh": "...", "auth": "..." } }'
/// ```
pub async fn register_subscription(
    identity: CallerIdentity,
    State(state): State<AppState>,
    Json(request): Json<RegisterSubscriptionRequest>,
) -> Result<StatusCode, AppError> {
    if request.endpoint.trim().is_empty() {
        return Err(AppError::validation("endpoint must not be empty"));
    }

    let account = identity.caller().account;
    let subscription = Subscription::new(
        request.endpoint,
        account,
        SubscriptionKeys {
            p256dh: request.keys.p256dh,
            auth: request.keys.auth,
        },
        state.clock.now(),
    );

    state
        .subscriptions
        .register(subscription)
        .await
        .map_err(|e| AppError::internal("could not store subscription").with_source(e.into()))?;

    info!(%account, "push subscription registered");
    Ok(StatusCode::NO_CONTENT)
}

/// Deactivate a device endpoint.
pub async fn deactivate_subscription(
    _identity: CallerIdentity,
    State(state): State<AppState>,
    Json(request): Json<DeactivateSubscriptionRequest>,
) -> Result<StatusCode, AppError> {
    let existed = state
        .subscriptions
        .deactivate(&request.endpoint)
        .await
        .map_err(|e| AppError::internal("could not update subscription").with_source(e.into()))?;

    if existed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("subscription", request.endpoint))
    }
}
