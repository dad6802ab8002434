//! Resident dashboard: guest registration.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use gatehouse_common::Plate;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::identity::ResidentUser;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::guest::{Guest, GuestResponse, GuestStatus};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/resident/guests", get(list_guests).post(register_guest))
}

#[utoipa::path(
    get,
    path = "/api/v1/resident/guests",
    tag = "Resident",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The resident's guests", body = Vec<GuestResponse>),
        (status = 403, description = "Not a resident", body = ApiErrorBody),
    ),
)]
pub async fn list_guests(
    State(state): State<AppState>,
    ResidentUser { resident_id }: ResidentUser,
) -> Result<Json<Vec<GuestResponse>>, ApiError> {
    let guests = state.store.guests_for_resident(resident_id).await?;
    Ok(Json(guests.into_iter().map(GuestResponse::from).collect()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterGuestRequest {
    pub license_plate: String,
    pub invitation_start: Option<DateTime<Utc>>,
    /// Base64 face sample. When present the guest must match it at the gate.
    pub face_image: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/resident/guests",
    tag = "Resident",
    security(("bearer" = [])),
    request_body = RegisterGuestRequest,
    responses(
        (status = 201, description = "Guest registered", body = GuestResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Not a resident", body = ApiErrorBody),
    ),
)]
pub async fn register_guest(
    State(state): State<AppState>,
    ResidentUser { resident_id }: ResidentUser,
    Json(body): Json<RegisterGuestRequest>,
) -> Result<(StatusCode, Json<GuestResponse>), ApiError> {
    let mut errors = Vec::new();

    let plate = Plate::parse(&body.license_plate);
    if plate.is_none() {
        errors.push(FieldError::new("license_plate", "is not a valid plate"));
    }

    let face_ref = match body.face_image.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(encoded) => match STANDARD.decode(encoded) {
            Ok(sample) if !sample.is_empty() => Some(state.oracle.enroll_face(&sample)),
            _ => {
                errors.push(FieldError::new("face_image", "must be non-empty base64"));
                None
            }
        },
    };

    let plate = match plate {
        Some(plate) if errors.is_empty() => plate,
        _ => return Err(ApiError::validation(errors)),
    };

    let guest = Guest {
        id: state.snowflake.generate(),
        resident_id,
        license_plate: plate.to_string(),
        face_ref,
        invitation_start: body.invitation_start,
        status: GuestStatus::Pending,
        arrival_time: None,
        created_at: Utc::now(),
    };
    let guest = state.store.insert_guest(guest).await?;

    tracing::info!(resident_id, guest_id = guest.id, plate = %plate, "guest registered");

    Ok((StatusCode::CREATED, Json(guest.into())))
}
