pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod models;
pub mod oracle;
pub mod routes;

use std::sync::Arc;

use auth::identity::IdentityResolver;
use config::Config;
use db::kv::KeyValueStore;
use db::store::Store;
use gatehouse_common::SnowflakeGenerator;
use gateway::registry::ConnectionRegistry;
use gateway::router::EventRouter;
use oracle::{GuestValidationOracle, StoreOracle};

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub kv: Arc<dyn KeyValueStore>,
    pub identity: IdentityResolver,
    pub oracle: Arc<dyn GuestValidationOracle>,
    /// Live delivery channels. Process-owned, never persisted.
    pub registry: Arc<ConnectionRegistry>,
    pub events: EventRouter,
    pub config: Arc<Config>,
    pub snowflake: Arc<SnowflakeGenerator>,
}

impl AppState {
    /// Wire the default collaborators around a store and a KV backend.
    pub fn new(config: Config, store: Arc<dyn Store>, kv: Arc<dyn KeyValueStore>) -> Self {
        let registry = ConnectionRegistry::new();
        let events = EventRouter::new(registry.clone(), config.push_timeout());
        Self {
            identity: IdentityResolver::new(store.clone(), kv.clone()),
            oracle: Arc::new(StoreOracle::new(store.clone())),
            store,
            kv,
            registry,
            events,
            config: Arc::new(config),
            snowflake: Arc::new(SnowflakeGenerator::new(0)),
        }
    }
}
