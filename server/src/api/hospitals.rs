//! Hospital alert API endpoints.
//!
//! - POST /api/hospitals/:hospital_id/alerts - Broadcast an alert (staff)

use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use cliniq_core::HospitalId;
use cliniq_web::{AppError, CallerIdentity};
use serde::Deserialize;
use uuid::Uuid;

/// Request to broadcast a hospital-wide alert.
#[derive(Debug, Deserialize)]
pub struct AlertRequest {
    /// Alert text
    pub message: String,
}

/// Broadcast an alert to every live subscriber of the hospital topic.
///
/// Fire-and-forget: subscribers connected right now receive it, nobody
/// else ever will.
pub async fn send_alert(
    identity: CallerIdentity,
    Path(hospital_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(request): Json<AlertRequest>,
) -> Result<StatusCode, AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::validation("message must not be empty"));
    }

    state
        .service
        .hospital_alert(
            identity.caller(),
            HospitalId::from_uuid(hospital_id),
            request.message,
        )
        .await?;

    Ok(StatusCode::ACCEPTED)
}
