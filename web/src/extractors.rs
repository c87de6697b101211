//! Custom Axum extractors.
//!
//! - [`CallerIdentity`]: the authenticated caller asserted by the external
//!   identity layer
//! - [`CorrelationId`]: extract or generate request correlation IDs

use crate::error::AppError;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use cliniq_core::{AccountId, Caller, Role};
use uuid::Uuid;

/// The authenticated caller, extracted from trusted gateway headers.
///
/// Authentication itself is an external collaborator: an upstream gateway
/// validates credentials and forwards the asserted identity as
/// `X-Account-Id` (a UUID) and `X-Caller-Role` (`patient`, `staff`, or
/// `doctor`). The engine trusts these headers and does no credential
/// checks of its own.
///
/// # Example
///
/// ```ignore
/// async fn handler(identity: CallerIdentity) -> Result<Json<Response>, AppError> {
///     let caller = identity.caller();
///     // ...
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity(pub Caller);

impl CallerIdentity {
    /// The extracted caller.
    #[must_use]
    pub const fn caller(&self) -> &Caller {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account = parts
            .headers
            .get("X-Account-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(AccountId::from_uuid)
            .ok_or_else(|| AppError::unauthorized("missing or invalid X-Account-Id header"))?;

        let role = match parts
            .headers
            .get("X-Caller-Role")
            .and_then(|v| v.to_str().ok())
        {
            Some("patient") | None => Role::Patient,
            Some("staff") => Role::Staff,
            Some("doctor") => Role::Doctor,
            Some(other) => {
                return Err(AppError::unauthorized(format!("unknown role '{other}'")));
            }
        };

        Ok(Self(Caller::new(account, role)))
    }
}

/// Correlation ID for request tracing.
///
/// Extracts the correlation ID from the `X-Correlation-ID` header,
/// or generates a new UUID v4 if not present.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .headers
            .get("X-Correlation-ID")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract_caller(request: Request<()>) -> Result<CallerIdentity, AppError> {
        let (mut parts, ()) = request.into_parts();
        CallerIdentity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn extracts_account_and_role() {
        let account = Uuid::new_v4();
        let request = Request::builder()
            .header("X-Account-Id", account.to_string())
            .header("X-Caller-Role", "staff")
            .body(())
            .unwrap();

        let identity = extract_caller(request).await.unwrap();
        assert_eq!(identity.caller().account, AccountId::from_uuid(account));
        assert_eq!(identity.caller().role, Role::Staff);
    }

    #[tokio::test]
    async fn role_defaults_to_patient() {
        let request = Request::builder()
            .header("X-Account-Id", Uuid::new_v4().to_string())
            .body(())
            .unwrap();

        let identity = extract_caller(request).await.unwrap();
        assert_eq!(identity.caller().role, Role::Patient);
    }

    #[tokio::test]
    async fn missing_account_is_rejected() {
        let request = Request::builder().body(()).unwrap();
        assert!(extract_caller(request).await.is_err());
    }
}
