//! PostgreSQL `Store` on diesel-async.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::AsyncConnection;
use scoped_futures::ScopedFutureExt;

use crate::models::access_log::AccessLog;
use crate::models::car::Car;
use crate::models::guest::{Guest, GuestStatus};
use crate::models::user::User;

use super::pool::DbPool;
use super::schema::{access_logs, cars, guests, users};
use super::store::{Store, StoreError};

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn backend(err: impl fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info) => {
                let constraint = info.constraint_name().unwrap_or("");
                if constraint.contains("email") {
                    StoreError::Conflict("email")
                } else if constraint.contains("plate") {
                    StoreError::Conflict("license plate")
                } else {
                    StoreError::Conflict("record")
                }
            }
            other => backend(other),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: User, car: Option<Car>) -> Result<User, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;

        let user = conn
            .transaction::<_, DieselError, _>(|conn| {
                async move {
                    let user: User = diesel_async::RunQueryDsl::get_result(
                        diesel::insert_into(users::table)
                            .values(&user)
                            .returning(User::as_returning()),
                        conn,
                    )
                    .await?;

                    if let Some(car) = car {
                        diesel_async::RunQueryDsl::execute(
                            diesel::insert_into(cars::table).values(&car),
                            conn,
                        )
                        .await?;
                    }

                    Ok(user)
                }
                .scope_boxed()
            })
            .await?;

        Ok(user)
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        let user = diesel_async::RunQueryDsl::get_result(
            users::table.find(id).select(User::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        let user = diesel_async::RunQueryDsl::first(
            users::table
                .filter(users::email.eq(email))
                .select(User::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        let rows = diesel_async::RunQueryDsl::load(
            users::table.order(users::id.asc()).select(User::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows)
    }

    async fn set_user_face(&self, user_id: i64, face_ref: &str) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        let user = diesel_async::RunQueryDsl::get_result(
            diesel::update(users::table.find(user_id))
                .set(users::face_ref.eq(Some(face_ref)))
                .returning(User::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(user)
    }

    async fn car_by_plate(&self, plate: &str) -> Result<Option<Car>, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        let car = diesel_async::RunQueryDsl::first(
            cars::table
                .filter(cars::license_plate.eq(plate))
                .select(Car::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(car)
    }

    async fn insert_guest(&self, guest: Guest) -> Result<Guest, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        let guest = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(guests::table)
                .values(&guest)
                .returning(Guest::as_returning()),
            &mut conn,
        )
        .await?;
        Ok(guest)
    }

    async fn guests_for_resident(&self, resident_id: i64) -> Result<Vec<Guest>, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        let rows = diesel_async::RunQueryDsl::load(
            guests::table
                .filter(guests::resident_id.eq(resident_id))
                .order(guests::id.asc())
                .select(Guest::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows)
    }

    async fn list_guests(&self) -> Result<Vec<Guest>, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        let rows = diesel_async::RunQueryDsl::load(
            guests::table.order(guests::id.asc()).select(Guest::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows)
    }

    async fn pending_guest_by_plate(&self, plate: &str) -> Result<Option<Guest>, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        let guest = diesel_async::RunQueryDsl::first(
            guests::table
                .filter(guests::license_plate.eq(plate))
                .filter(guests::status.eq(GuestStatus::Pending))
                .order(guests::id.asc())
                .select(Guest::as_select()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(guest)
    }

    async fn mark_guest_arrived(
        &self,
        guest_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Guest>, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        // The status filter makes the transition a compare-and-set.
        let guest = diesel_async::RunQueryDsl::get_result(
            diesel::update(
                guests::table
                    .filter(guests::id.eq(guest_id))
                    .filter(guests::status.eq(GuestStatus::Pending)),
            )
            .set((
                guests::status.eq(GuestStatus::Arrived),
                guests::arrival_time.eq(Some(at)),
            ))
            .returning(Guest::as_returning()),
            &mut conn,
        )
        .await
        .optional()?;
        Ok(guest)
    }

    async fn append_log(&self, entry: AccessLog) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        diesel_async::RunQueryDsl::execute(
            diesel::insert_into(access_logs::table).values(&entry),
            &mut conn,
        )
        .await?;
        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<AccessLog>, StoreError> {
        let mut conn = self.pool.get().await.map_err(backend)?;
        let rows = diesel_async::RunQueryDsl::load(
            access_logs::table
                .order(access_logs::id.desc())
                .limit(limit as i64)
                .select(AccessLog::as_select()),
            &mut conn,
        )
        .await?;
        Ok(rows)
    }
}
