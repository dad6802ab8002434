//! Auth routes: password login, logout, current user, gateway tickets.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::identity::{AuthError, ResidentUser};
use crate::auth::middleware::AuthSession;
use crate::auth::tokens::{self, SessionData};
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::models::user::{Role, UserResponse};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/@me", get(me))
        .route("/auth/ws-ticket", post(ws_ticket))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/login
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    /// Gateway ticket. Issued to residents only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_ticket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    pub user: UserResponse,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Missing email or password", body = ApiErrorBody),
        (status = 401, description = "Invalid credentials", body = ApiErrorBody),
    ),
)]
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut errors = Vec::new();
    if body.email.trim().is_empty() {
        errors.push(FieldError::new("email", "is required"));
    }
    if body.password.is_empty() {
        errors.push(FieldError::new("password", "is required"));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let user = state
        .identity
        .authenticate(&body.email, &body.password)
        .await
        .map_err(|e| match e {
            AuthError::Unavailable(reason) => {
                tracing::error!(%reason, "login lookup failed");
                ApiError::internal("An internal error occurred")
            }
            other => {
                tracing::info!(email = %body.email.trim(), "login rejected");
                ApiError::unauthorized(other.to_string())
            }
        })?;

    let session = SessionData {
        user_id: user.id,
        role: user.role,
    };
    let kv = state.kv.as_ref();

    let access_token = tokens::generate_session_token();
    tokens::store_session(kv, &access_token, &session, state.config.session_ttl_secs).await?;

    let (ws_ticket, ws_url) = if user.role == Role::Resident {
        let ticket = tokens::issue_ws_ticket(kv, &session).await?;
        (Some(ticket), Some(state.config.ws_url()))
    } else {
        (None, None)
    };

    tracing::info!(user_id = user.id, role = %user.role, "user logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.session_ttl_secs,
        ws_ticket,
        ws_url,
        user: user.into(),
    }))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/logout
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn logout(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<StatusCode, ApiError> {
    tokens::revoke_session(state.kv.as_ref(), &session.token).await?;
    tracing::info!(user_id = session.identity.user_id, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// GET /api/v1/auth/@me
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/auth/@me",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "User no longer exists", body = ApiErrorBody),
    ),
)]
pub async fn me(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .store
        .user_by_id(session.identity.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user.into()))
}

// ---------------------------------------------------------------------------
// POST /api/v1/auth/ws-ticket
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct WsTicketResponse {
    pub ticket: String,
    pub ws_url: String,
    pub expires_in: u64,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/ws-ticket",
    tag = "Auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Fresh gateway ticket", body = WsTicketResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not a resident", body = ApiErrorBody),
    ),
)]
pub async fn ws_ticket(
    State(state): State<AppState>,
    ResidentUser { resident_id }: ResidentUser,
) -> Result<Json<WsTicketResponse>, ApiError> {
    let ticket = tokens::issue_ws_ticket(
        state.kv.as_ref(),
        &SessionData {
            user_id: resident_id,
            role: Role::Resident,
        },
    )
    .await?;

    Ok(Json(WsTicketResponse {
        ticket,
        ws_url: state.config.ws_url(),
        expires_in: tokens::WS_TICKET_TTL_SECS,
    }))
}
