#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Barrier};

use gate_api::auth::password;
use gate_api::config::Config;
use gate_api::db::kv::MemoryKv;
use gate_api::db::memory::MemoryStore;
use gate_api::db::store::{Store, StoreError};
use gate_api::gateway::channel::Channel;
use gate_api::gateway::events::GuestArrival;
use gate_api::gateway::registry::ChannelHandle;
use gate_api::gateway::transport::QueueSink;
use gate_api::models::access_log::AccessLog;
use gate_api::models::car::Car;
use gate_api::models::guest::{Guest, GuestStatus};
use gate_api::models::user::{Role, User};
use gate_api::oracle::{DigestFaceMatcher, FaceMatcher};
use gate_api::AppState;

/// Password shared by every seeded user.
pub const PASSWORD: &str = "correct-horse-battery";

/// Argon2 is slow in debug builds; hash the shared password once.
fn password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| password::hash_password(PASSWORD).expect("hash test password"))
        .clone()
}

/// Build a test AppState on the in-memory store and KV.
pub fn test_state() -> AppState {
    test_state_with_store(Arc::new(MemoryStore::new()))
}

pub fn test_state_with_store(store: Arc<dyn Store>) -> AppState {
    AppState::new(Config::default(), store, Arc::new(MemoryKv::new()))
}

/// Build the full application router wired to a fresh test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = gate_api::routes::router().with_state(state.clone());
    (app, state)
}

pub fn test_server() -> (TestServer, AppState) {
    let (app, state) = test_app();
    (TestServer::new(app).unwrap(), state)
}

pub fn test_server_with_store(store: Arc<dyn Store>) -> (TestServer, AppState) {
    let state = test_state_with_store(store);
    let app = gate_api::routes::router().with_state(state.clone());
    (TestServer::new(app).unwrap(), state)
}

pub async fn seed_user(state: &AppState, id: i64, role: Role, email: &str) -> User {
    seed_user_with_car(state, id, role, email, None).await
}

pub async fn seed_user_with_car(
    state: &AppState,
    id: i64,
    role: Role,
    email: &str,
    plate: Option<&str>,
) -> User {
    let user = User {
        id,
        name: format!("User {id}"),
        email: email.to_string(),
        role,
        password_hash: password_hash(),
        face_ref: None,
        created_at: Utc::now(),
    };
    let car = plate.map(|plate| Car {
        id: state.snowflake.generate(),
        resident_id: id,
        license_plate: plate.to_string(),
        created_at: Utc::now(),
    });
    state.store.insert_user(user, car).await.expect("seed user")
}

pub async fn seed_guest(
    state: &AppState,
    resident_id: i64,
    plate: &str,
    face: Option<&[u8]>,
) -> Guest {
    let guest = Guest {
        id: state.snowflake.generate(),
        resident_id,
        license_plate: plate.to_string(),
        face_ref: face.map(|sample| DigestFaceMatcher.enroll(sample)),
        invitation_start: None,
        status: GuestStatus::Pending,
        arrival_time: None,
        created_at: Utc::now(),
    };
    state.store.insert_guest(guest).await.expect("seed guest")
}

/// Log in a seeded user and return the full login response body.
pub async fn login(server: &TestServer, email: &str) -> serde_json::Value {
    let resp = server
        .post("/api/v1/auth/login")
        .json(&serde_json::json!({ "email": email, "password": PASSWORD }))
        .await;
    resp.assert_status_ok();
    resp.json()
}

/// Log in a seeded user and return their access token.
pub async fn login_token(server: &TestServer, email: &str) -> String {
    login(server, email).await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Register an in-process channel for `resident_id`, as the gateway does
/// after IDENTIFY.
pub fn open_channel(
    state: &AppState,
    resident_id: i64,
) -> (ChannelHandle, mpsc::Receiver<Arc<GuestArrival>>) {
    let (sink, rx) = QueueSink::bounded(8);
    let channel = Arc::new(Channel::open(resident_id, Arc::new(sink)));
    (state.registry.register(channel), rx)
}

/// `MemoryStore` with switchable write failures and an optional rendezvous
/// on pending-guest lookup, so concurrent validations can be lined up.
#[derive(Default)]
pub struct HookedStore {
    inner: MemoryStore,
    pub fail_logs: AtomicBool,
    pub fail_admission: AtomicBool,
    lookup_barrier: Option<Barrier>,
}

impl HookedStore {
    /// Hold every pending-guest lookup until `parties` lookups are waiting.
    pub fn with_lookup_barrier(parties: usize) -> Self {
        Self {
            lookup_barrier: Some(Barrier::new(parties)),
            ..Self::default()
        }
    }

    fn fail_if(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("{what} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for HookedStore {
    async fn insert_user(&self, user: User, car: Option<Car>) -> Result<User, StoreError> {
        self.inner.insert_user(user, car).await
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.inner.user_by_id(id).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.inner.user_by_email(email).await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.inner.list_users().await
    }

    async fn set_user_face(&self, user_id: i64, face_ref: &str) -> Result<Option<User>, StoreError> {
        self.inner.set_user_face(user_id, face_ref).await
    }

    async fn car_by_plate(&self, plate: &str) -> Result<Option<Car>, StoreError> {
        self.inner.car_by_plate(plate).await
    }

    async fn insert_guest(&self, guest: Guest) -> Result<Guest, StoreError> {
        self.inner.insert_guest(guest).await
    }

    async fn guests_for_resident(&self, resident_id: i64) -> Result<Vec<Guest>, StoreError> {
        self.inner.guests_for_resident(resident_id).await
    }

    async fn list_guests(&self) -> Result<Vec<Guest>, StoreError> {
        self.inner.list_guests().await
    }

    async fn pending_guest_by_plate(&self, plate: &str) -> Result<Option<Guest>, StoreError> {
        if let Some(barrier) = &self.lookup_barrier {
            barrier.wait().await;
        }
        self.inner.pending_guest_by_plate(plate).await
    }

    async fn mark_guest_arrived(
        &self,
        guest_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Option<Guest>, StoreError> {
        Self::fail_if(&self.fail_admission, "guest table")?;
        self.inner.mark_guest_arrived(guest_id, at).await
    }

    async fn append_log(&self, entry: AccessLog) -> Result<(), StoreError> {
        Self::fail_if(&self.fail_logs, "access log")?;
        self.inner.append_log(entry).await
    }

    async fn recent_logs(&self, limit: usize) -> Result<Vec<AccessLog>, StoreError> {
        self.inner.recent_logs(limit).await
    }
}
