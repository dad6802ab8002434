//! Gatekeeper: entry validation and guest arrival notifications.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use gatehouse_common::id::{prefix, prefixed_ulid};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::identity::GatekeeperUser;
use crate::db::store::StoreError;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::events::GuestArrival;
use crate::models::access_log::{AccessLog, EventType};
use crate::oracle::{EntryMatch, OracleError};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/gatekeeper/validate", post(validate))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateRequest {
    /// Base64 face sample from the gate camera.
    pub face_image: String,
    /// Base64 plate sample from the gate camera.
    pub plate_image: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Guest,
    Resident,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateResponse {
    pub status: EntryStatus,
    /// Correlates the response with its access log entry.
    pub validation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntryKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resident_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    /// Resident channels that received the arrival notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notified: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidateResponse {
    fn denied(validation_id: String, reason: &str, plate: Option<String>) -> Self {
        Self {
            status: EntryStatus::Denied,
            validation_id,
            kind: None,
            resident_id: None,
            guest_id: None,
            plate,
            notified: None,
            reason: Some(reason.to_string()),
        }
    }

    fn granted(validation_id: String, kind: EntryKind, resident_id: i64, plate: String) -> Self {
        Self {
            status: EntryStatus::Granted,
            validation_id,
            kind: Some(kind),
            resident_id: Some(resident_id),
            guest_id: None,
            plate: Some(plate),
            notified: None,
            reason: None,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/gatekeeper/validate",
    tag = "Gatekeeper",
    security(("bearer" = [])),
    request_body = ValidateRequest,
    responses(
        (status = 200, description = "Entry granted or denied", body = ValidateResponse),
        (status = 400, description = "Samples are not valid base64", body = ApiErrorBody),
        (status = 403, description = "Not a gatekeeper", body = ApiErrorBody),
        (status = 500, description = "Storage failure; audited as a denial", body = ApiErrorBody),
    ),
)]
pub async fn validate(
    State(state): State<AppState>,
    GatekeeperUser { user_id }: GatekeeperUser,
    Json(body): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let mut errors = Vec::new();
    let face = decode_sample(&body.face_image, "face_image", &mut errors);
    let plate = decode_sample(&body.plate_image, "plate_image", &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let validation_id = prefixed_ulid(prefix::VALIDATION);
    let now = Utc::now();

    // A store failure while deciding is audited as a denial before the 500.
    let (response, failure) = match decide(&state, &face, &plate, validation_id.clone(), now).await {
        Ok(response) => (response, None),
        Err(err) => (ValidateResponse::denied(validation_id, "internal_error", None), Some(err)),
    };

    record_validation(&state, user_id, &response, now).await;

    tracing::info!(
        validation_id = %response.validation_id,
        gatekeeper_id = user_id,
        status = ?response.status,
        reason = response.reason.as_deref().unwrap_or("-"),
        "entry validated"
    );

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(Json(response)),
    }
}

/// Match the samples, admit a matched guest and notify their resident.
async fn decide(
    state: &AppState,
    face: &[u8],
    plate: &[u8],
    validation_id: String,
    now: DateTime<Utc>,
) -> Result<ValidateResponse, StoreError> {
    let matched = match state.oracle.validate(face, plate).await {
        Ok(EntryMatch::Resident { resident_id, plate }) => {
            return Ok(ValidateResponse::granted(
                validation_id,
                EntryKind::Resident,
                resident_id,
                plate.to_string(),
            ));
        }
        Ok(EntryMatch::Guest(matched)) => matched,
        Err(OracleError::NoMatch(no_match)) => {
            return Ok(ValidateResponse::denied(
                validation_id,
                no_match.reason(),
                no_match.plate().map(ToString::to_string),
            ));
        }
        Err(OracleError::Store(err)) => return Err(err),
    };

    if state.store.mark_guest_arrived(matched.guest_id, now).await?.is_none() {
        // Another gate admitted this guest between match and update.
        return Ok(ValidateResponse::denied(
            validation_id,
            "already_admitted",
            Some(matched.plate.to_string()),
        ));
    }

    let mut response = ValidateResponse::granted(
        validation_id,
        EntryKind::Guest,
        matched.resident_id,
        matched.plate.to_string(),
    );
    response.guest_id = Some(matched.guest_id);

    let report = state
        .events
        .route(GuestArrival {
            guest_id: matched.guest_id,
            resident_id: matched.resident_id,
            plate: matched.plate,
            occurred_at: now,
        })
        .await;
    response.notified = Some(report.delivered);
    Ok(response)
}

/// Write the validation's audit entry. A failed write is logged, never
/// surfaced, so the gate still shows the decision that was taken.
async fn record_validation(state: &AppState, gatekeeper_id: i64, response: &ValidateResponse, at: DateTime<Utc>) {
    let entry = AccessLog {
        id: state.snowflake.generate(),
        user_id: Some(gatekeeper_id),
        event_type: EventType::ENTRY_VERIFICATION.to_string(),
        details: serde_json::to_value(response).unwrap_or_default(),
        log_time: at,
    };
    if let Err(err) = state.store.append_log(entry).await {
        tracing::error!(
            validation_id = %response.validation_id,
            error = %err,
            "failed to write access log entry"
        );
    }
}

fn decode_sample(encoded: &str, field: &str, errors: &mut Vec<FieldError>) -> Vec<u8> {
    match STANDARD.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(_) => {
            errors.push(FieldError::new(field, "must be base64"));
            Vec::new()
        }
    }
}
