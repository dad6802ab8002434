//! Migration runner for gate-api.
//!
//! Usage:
//!   cargo run -p gate-api --bin gate-migrate              apply pending migrations
//!   cargo run -p gate-api --bin gate-migrate -- --pending list pending migrations
//!   cargo run -p gate-api --bin gate-migrate -- --revert  roll back the latest migration
//!   cargo run -p gate-api --bin gate-migrate -- --test    target the `_test` database
//!
//! Reads DATABASE_URL from the environment (or .env via dotenvy).

use std::path::Path;

use diesel::pg::PgConnection;
use diesel::Connection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

enum Action {
    Apply,
    Pending,
    Revert,
}

fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let has = |flag: &str| args.iter().any(|arg| arg == flag);

    let action = if has("--revert") {
        Action::Revert
    } else if has("--pending") {
        Action::Pending
    } else {
        Action::Apply
    };

    let mut database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL env var is required");
    if has("--test") {
        database_url = test_database_url(&database_url);
    }

    let mut conn =
        PgConnection::establish(&database_url).expect("failed to connect to database");

    match action {
        Action::Apply => {
            let applied = conn
                .run_pending_migrations(MIGRATIONS)
                .expect("failed to run migrations");
            if applied.is_empty() {
                println!("No pending migrations.");
            }
            for migration in &applied {
                println!("  Applied: {migration}");
            }
        }
        Action::Pending => {
            let pending = conn
                .pending_migrations(MIGRATIONS)
                .expect("failed to list migrations");
            println!("{} pending migration(s).", pending.len());
            for migration in &pending {
                println!("  {}", migration.name());
            }
        }
        Action::Revert => {
            let reverted = conn
                .revert_last_migration(MIGRATIONS)
                .expect("failed to revert migration");
            println!("  Reverted: {reverted}");
        }
    }
}

/// `postgres://.../gatehouse?x=y` → `postgres://.../gatehouse_test?x=y`.
fn test_database_url(database_url: &str) -> String {
    let (base, query) = match database_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (database_url, None),
    };
    let Some((prefix, db_name)) = base.rsplit_once('/') else {
        return database_url.to_string();
    };
    if db_name.is_empty() || db_name.ends_with("_test") {
        return database_url.to_string();
    }

    match query {
        Some(query) => format!("{prefix}/{db_name}_test?{query}"),
        None => format!("{prefix}/{db_name}_test"),
    }
}
