use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::db::schema::access_logs;

/// Event types written to the access log.
pub struct EventType;

impl EventType {
    pub const ENTRY_VERIFICATION: &'static str = "entry_verification";
    pub const USER_CREATED: &'static str = "user_created";
    pub const FACE_ENROLLED: &'static str = "face_enrolled";
}

/// One audit entry. Every validation attempt writes exactly one.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, ToSchema)]
#[diesel(table_name = access_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AccessLog {
    pub id: i64,
    /// The acting user (the gatekeeper for validations).
    pub user_id: Option<i64>,
    pub event_type: String,
    #[schema(value_type = Object)]
    pub details: Value,
    pub log_time: DateTime<Utc>,
}
