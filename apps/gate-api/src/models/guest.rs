use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::schema::guests;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum GuestStatus {
    /// Registered by a resident, not yet admitted.
    Pending,
    /// Admitted by a gatekeeper. Terminal.
    Arrived,
}

impl GuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuestStatus::Pending => "pending",
            GuestStatus::Arrived => "arrived",
        }
    }
}

impl ToSql<Text, Pg> for GuestStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        <str as ToSql<Text, Pg>>::to_sql(self.as_str(), out)
    }
}

impl FromSql<Text, Pg> for GuestStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "pending" => Ok(GuestStatus::Pending),
            "arrived" => Ok(GuestStatus::Arrived),
            other => Err(format!("unknown guest status: {other}").into()),
        }
    }
}

/// A guest registered by a resident.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, ToSchema)]
#[diesel(table_name = guests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Guest {
    pub id: i64,
    pub resident_id: i64,
    pub license_plate: String,
    /// Hex SHA-256 of the enrolled face sample.
    #[serde(skip_serializing)]
    pub face_ref: Option<String>,
    pub invitation_start: Option<DateTime<Utc>>,
    pub status: GuestStatus,
    pub arrival_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Guest {
    pub fn is_pending(&self) -> bool {
        self.status == GuestStatus::Pending
    }
}

/// Guest as listed on the dashboards.
#[derive(Debug, Serialize, ToSchema)]
pub struct GuestResponse {
    pub id: i64,
    pub resident_id: i64,
    pub license_plate: String,
    pub has_face: bool,
    pub invitation_start: Option<DateTime<Utc>>,
    pub status: GuestStatus,
    pub arrival_time: Option<DateTime<Utc>>,
}

impl From<Guest> for GuestResponse {
    fn from(g: Guest) -> Self {
        Self {
            id: g.id,
            resident_id: g.resident_id,
            license_plate: g.license_plate,
            has_face: g.face_ref.is_some(),
            invitation_start: g.invitation_start,
            status: g.status,
            arrival_time: g.arrival_time,
        }
    }
}
