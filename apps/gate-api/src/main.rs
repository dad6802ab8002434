use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use gate_api::config::Config;
use gate_api::db::kv::{KeyValueStore, MemoryKv};
use gate_api::db::memory::MemoryStore;
use gate_api::db::pg::PgStore;
use gate_api::db::store::Store;
use gate_api::routes::ApiDoc;
use gate_api::AppState;

/// How often the sweeper looks for stale channels and expired tokens.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    // Load .env file (silently skipped when missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = gate_api::db::pool::connect(url)
                .expect("failed to create database pool");
            tracing::info!("using PostgreSQL store");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is lost on exit)");
            Arc::new(MemoryStore::new())
        }
    };

    // Session tokens and gateway tickets are process-local.
    let kv = Arc::new(MemoryKv::new());
    let state = AppState::new(config, store, kv.clone() as Arc<dyn KeyValueStore>);

    spawn_sweeper(state.clone(), kv);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(gate_api::routes::router())
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "gate-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let closed = state.registry.clear();
    tracing::info!(closed, "gate-api stopped");
}

fn spawn_sweeper(state: AppState, kv: Arc<MemoryKv>) {
    let max_idle = state.config.stale_channel_after();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let channels = state.registry.sweep_stale(max_idle);
            let keys = kv.purge_expired();
            if channels > 0 || keys > 0 {
                tracing::info!(channels, keys, "swept stale channels and expired tokens");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
