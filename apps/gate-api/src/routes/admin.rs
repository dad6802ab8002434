//! Admin dashboard: user management, guest overview, access log.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use gatehouse_common::Plate;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::identity::AdminUser;
use crate::auth::password;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::access_log::{AccessLog, EventType};
use crate::models::car::Car;
use crate::models::guest::GuestResponse;
use crate::models::user::{Role, User, UserResponse};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users).post(create_user))
        .route("/admin/users/{user_id}/face", post(enroll_face))
        .route("/admin/guests", get(list_guests))
        .route("/admin/logs", get(list_logs))
}

const MIN_PASSWORD_LEN: usize = 8;

// ---------------------------------------------------------------------------
// POST /api/v1/admin/users
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    /// The resident's own car. Residents only.
    pub license_plate: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users",
    tag = "Admin",
    security(("bearer" = [])),
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Not an admin", body = ApiErrorBody),
        (status = 409, description = "Email or plate already registered", body = ApiErrorBody),
    ),
)]
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser { user_id: admin_id }: AdminUser,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let name = body.name.trim().to_string();
    let email = body.email.trim().to_lowercase();

    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push(FieldError::new("name", "is required"));
    }
    if !email.contains('@') {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    let plate = match body.license_plate.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) if body.role != Role::Resident => {
            errors.push(FieldError::new("license_plate", "only residents register a car"));
            Plate::parse(raw)
        }
        Some(raw) => {
            let plate = Plate::parse(raw);
            if plate.is_none() {
                errors.push(FieldError::new("license_plate", "is not a valid plate"));
            }
            plate
        }
    };
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let raw_password = body.password;
    let password_hash = tokio::task::spawn_blocking(move || password::hash_password(&raw_password))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "hashing task failed");
            ApiError::internal("An internal error occurred")
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            ApiError::internal("An internal error occurred")
        })?;

    let now = Utc::now();
    let user = User {
        id: state.snowflake.generate(),
        name,
        email,
        role: body.role,
        password_hash,
        face_ref: None,
        created_at: now,
    };
    let car = plate.map(|plate| Car {
        id: state.snowflake.generate(),
        resident_id: user.id,
        license_plate: plate.to_string(),
        created_at: now,
    });

    let user = state.store.insert_user(user, car).await?;

    state
        .store
        .append_log(AccessLog {
            id: state.snowflake.generate(),
            user_id: Some(admin_id),
            event_type: EventType::USER_CREATED.to_string(),
            details: serde_json::json!({
                "created_user_id": user.id,
                "role": user.role,
            }),
            log_time: now,
        })
        .await?;

    tracing::info!(admin_id, user_id = user.id, role = %user.role, "user created");

    Ok((StatusCode::CREATED, Json(user.into())))
}

// ---------------------------------------------------------------------------
// GET /api/v1/admin/users
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All users", body = Vec<UserResponse>),
        (status = 403, description = "Not an admin", body = ApiErrorBody),
    ),
)]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.store.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

// ---------------------------------------------------------------------------
// POST /api/v1/admin/users/{user_id}/face
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnrollFaceRequest {
    /// Base64 face sample. Replaces any earlier enrolment.
    pub face_image: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{user_id}/face",
    tag = "Admin",
    security(("bearer" = [])),
    params(("user_id" = i64, Path, description = "Resident to enrol")),
    request_body = EnrollFaceRequest,
    responses(
        (status = 200, description = "Face enrolled", body = UserResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Not an admin", body = ApiErrorBody),
        (status = 404, description = "User not found", body = ApiErrorBody),
    ),
)]
pub async fn enroll_face(
    State(state): State<AppState>,
    AdminUser { user_id: admin_id }: AdminUser,
    Path(user_id): Path<i64>,
    Json(body): Json<EnrollFaceRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .store
        .user_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    if user.role != Role::Resident {
        return Err(ApiError::validation(vec![FieldError::new(
            "user_id",
            "only residents enrol a face",
        )]));
    }

    let sample = match STANDARD.decode(body.face_image.trim()) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => {
            return Err(ApiError::validation(vec![FieldError::new(
                "face_image",
                "must be non-empty base64",
            )]))
        }
    };

    let reference = state.oracle.enroll_face(&sample);
    let user = state
        .store
        .set_user_face(user_id, &reference)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    state
        .store
        .append_log(AccessLog {
            id: state.snowflake.generate(),
            user_id: Some(admin_id),
            event_type: EventType::FACE_ENROLLED.to_string(),
            details: serde_json::json!({ "resident_id": user.id }),
            log_time: Utc::now(),
        })
        .await?;

    tracing::info!(admin_id, resident_id = user.id, "resident face enrolled");

    Ok(Json(user.into()))
}

// ---------------------------------------------------------------------------
// GET /api/v1/admin/guests
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/admin/guests",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All guests", body = Vec<GuestResponse>),
        (status = 403, description = "Not an admin", body = ApiErrorBody),
    ),
)]
pub async fn list_guests(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<GuestResponse>>, ApiError> {
    let guests = state.store.list_guests().await?;
    Ok(Json(guests.into_iter().map(GuestResponse::from).collect()))
}

// ---------------------------------------------------------------------------
// GET /api/v1/admin/logs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LogParams {
    pub limit: Option<usize>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/logs",
    tag = "Admin",
    security(("bearer" = [])),
    params(
        ("limit" = Option<usize>, Query, description = "Number of entries (1-200, default 50)"),
    ),
    responses(
        (status = 200, description = "Access log, newest first", body = Vec<AccessLog>),
        (status = 403, description = "Not an admin", body = ApiErrorBody),
    ),
)]
pub async fn list_logs(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<LogParams>,
) -> Result<Json<Vec<AccessLog>>, ApiError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    Ok(Json(state.store.recent_logs(limit).await?))
}
