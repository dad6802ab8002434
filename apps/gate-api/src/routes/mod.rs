pub mod admin;
pub mod auth;
pub mod gatekeeper;
pub mod health;
pub mod resident;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest(
            "/api/v1",
            auth::router()
                .merge(admin::router())
                .merge(resident::router())
                .merge(gatekeeper::router()),
        )
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login,
        auth::logout,
        auth::me,
        auth::ws_ticket,
        admin::create_user,
        admin::list_users,
        admin::enroll_face,
        admin::list_guests,
        admin::list_logs,
        resident::list_guests,
        resident::register_guest,
        gatekeeper::validate,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::models::user::Role,
            crate::models::user::UserResponse,
            crate::models::guest::GuestStatus,
            crate::models::guest::GuestResponse,
            crate::models::access_log::AccessLog,
            // Route request/response types
            health::HealthResponse,
            auth::LoginRequest,
            auth::LoginResponse,
            auth::WsTicketResponse,
            admin::CreateUserRequest,
            admin::EnrollFaceRequest,
            resident::RegisterGuestRequest,
            gatekeeper::ValidateRequest,
            gatekeeper::ValidateResponse,
            gatekeeper::EntryStatus,
            gatekeeper::EntryKind,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Auth", description = "Authentication"),
        (name = "Admin", description = "User management and access log"),
        (name = "Resident", description = "Guest registration"),
        (name = "Gatekeeper", description = "Entry validation"),
    )
)]
pub struct ApiDoc;
