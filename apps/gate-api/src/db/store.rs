//! Relational storage boundary for users, cars, guests and the access log.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::access_log::AccessLog;
use crate::models::car::Car;
use crate::models::guest::Guest;
use crate::models::user::User;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint was violated; carries the offending field.
    Conflict(&'static str),
    /// The backend failed (connection, query, corrupt row).
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict(what) => write!(f, "{what} already exists"),
            StoreError::Backend(reason) => write!(f, "storage backend error: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Everything the HTTP layer and the validation oracle need from storage.
///
/// IDs and timestamps are assigned by the caller, so implementations only
/// persist what they are given.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a user and, for residents, their car in one unit.
    async fn insert_user(&self, user: User, car: Option<Car>) -> Result<User, StoreError>;
    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    /// Lookup by lower-cased email.
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    /// Replace a user's enrolled face reference. `None` when the user does
    /// not exist.
    async fn set_user_face(&self, user_id: i64, face_ref: &str) -> Result<Option<User>, StoreError>;

    async fn car_by_plate(&self, plate: &str) -> Result<Option<Car>, StoreError>;

    async fn insert_guest(&self, guest: Guest) -> Result<Guest, StoreError>;
    async fn guests_for_resident(&self, resident_id: i64) -> Result<Vec<Guest>, StoreError>;
    async fn list_guests(&self) -> Result<Vec<Guest>, StoreError>;
    /// The oldest pending guest registered under `plate`.
    async fn pending_guest_by_plate(&self, plate: &str) -> Result<Option<Guest>, StoreError>;
    /// Transition a guest from pending to arrived. Returns `None` when the
    /// guest is unknown or was already admitted, so concurrent validations
    /// admit a guest at most once.
    async fn mark_guest_arrived(
        &self,
        guest_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Guest>, StoreError>;

    async fn append_log(&self, entry: AccessLog) -> Result<(), StoreError>;
    /// Newest first.
    async fn recent_logs(&self, limit: usize) -> Result<Vec<AccessLog>, StoreError>;
}
