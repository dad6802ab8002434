//! Bearer-token extraction and role gates.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::AppState;

use super::identity::{
    AdminUser, AuthError, Capability, Credential, GatekeeperUser, Identity, ResidentUser,
};

/// Authenticated session extracted from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub identity: Identity,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;

        let identity = state
            .identity
            .resolve(Credential::SessionToken(token))
            .await
            .map_err(|e| match e {
                AuthError::Unavailable(reason) => {
                    tracing::error!(%reason, "session lookup failed");
                    ApiError::internal("Token lookup failed")
                }
                other => ApiError::unauthorized(other.to_string()),
            })?;

        Ok(AuthSession {
            identity,
            token: token.to_string(),
        })
    }
}

fn wrong_role(expected: &str) -> ApiError {
    ApiError::forbidden(format!("This action requires the {expected} role"))
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        match AuthSession::from_request_parts(parts, state).await?.identity.capability() {
            Capability::Admin(admin) => Ok(admin),
            _ => Err(wrong_role("admin")),
        }
    }
}

impl FromRequestParts<AppState> for ResidentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        match AuthSession::from_request_parts(parts, state).await?.identity.capability() {
            Capability::Resident(resident) => Ok(resident),
            _ => Err(wrong_role("resident")),
        }
    }
}

impl FromRequestParts<AppState> for GatekeeperUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        match AuthSession::from_request_parts(parts, state).await?.identity.capability() {
            Capability::Gatekeeper(gatekeeper) => Ok(gatekeeper),
            _ => Err(wrong_role("gatekeeper")),
        }
    }
}
