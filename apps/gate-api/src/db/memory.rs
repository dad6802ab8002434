//! In-memory `Store` used when no database is configured, and by tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::models::access_log::AccessLog;
use crate::models::car::Car;
use crate::models::guest::{Guest, GuestStatus};
use crate::models::user::User;

use super::store::{Store, StoreError};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    cars: BTreeMap<i64, Car>,
    guests: BTreeMap<i64, Guest>,
    logs: Vec<AccessLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: User, car: Option<Car>) -> Result<User, StoreError> {
        let mut t = self.tables.write();
        if t.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("email"));
        }
        if let Some(ref car) = car {
            if t.cars.values().any(|c| c.license_plate == car.license_plate) {
                return Err(StoreError::Conflict("license plate"));
            }
        }
        t.users.insert(user.id, user.clone());
        if let Some(car) = car {
            t.cars.insert(car.id, car);
        }
        Ok(user)
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.read();
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.tables.read().users.values().cloned().collect())
    }

    async fn set_user_face(&self, user_id: i64, face_ref: &str) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.write();
        Ok(t.users.get_mut(&user_id).map(|u| {
            u.face_ref = Some(face_ref.to_string());
            u.clone()
        }))
    }

    async fn car_by_plate(&self, plate: &str) -> Result<Option<Car>, StoreError> {
        let t = self.tables.read();
        Ok(t.cars.values().find(|c| c.license_plate == plate).cloned())
    }

    async fn insert_guest(&self, guest: Guest) -> Result<Guest, StoreError> {
        self.tables.write().guests.insert(guest.id, guest.clone());
        Ok(guest)
    }

    async fn guests_for_resident(&self, resident_id: i64) -> Result<Vec<Guest>, StoreError> {
        let t = self.tables.read();
        Ok(t.guests
            .values()
            .filter(|g| g.resident_id == resident_id)
            .cloned()
            .collect())
    }

    async fn list_guests(&self) -> Result<Vec<Guest>, StoreError> {
        Ok(self.tables.read().guests.values().cloned().collect())
    }

    async fn pending_guest_by_plate(&self, plate: &str) -> Result<Option<Guest>, StoreError> {
        let t = self.tables.read();
        // BTreeMap iterates in id order and ids are time-ordered.
        Ok(t.guests
            .values()
            .find(|g| g.is_pending() && g.license_plate == plate)
            .cloned())
    }

    async fn mark_guest_arrived(
        &self,
        guest_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Guest>, StoreError> {
        let mut t = self.tables.write();
        match t.guests.get_mut(&guest_id) {
            Some(g) if g.is_pending() => {
                g.status = GuestStatus::Arrived;
                g.arrival_time = Some(at);
                Ok(Some(g.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn append_log(&self, entry: AccessLog) -> Result<(), StoreError> {
        self.tables.write().logs.push(entry);
        Ok(())
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<AccessLog>, StoreError> {
        let t = self.tables.read();
        Ok(t.logs.iter().rev().take(limit).cloned().collect())
    }
}
