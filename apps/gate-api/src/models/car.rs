use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::cars;

/// A resident's own vehicle. Its plate grants the resident entry.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, ToSchema)]
#[diesel(table_name = cars)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Car {
    pub id: i64,
    pub resident_id: i64,
    pub license_plate: String,
    pub created_at: DateTime<Utc>,
}
