//! Interactive bootstrap: creates the first admin account.
//!
//! Usage:
//!   cargo run -p gate-api --bin gate-setup
//!
//! Needs a migrated PostgreSQL database (see `gate-migrate`). The database
//! URL defaults to `DATABASE_URL` from `.env` and is written back there if
//! changed.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use gatehouse_common::SnowflakeGenerator;

use gate_api::auth::password;
use gate_api::db::pg::PgStore;
use gate_api::db::store::{Store, StoreError};
use gate_api::models::user::{Role, User};

fn prompt(label: &str, default: Option<&str>) -> String {
    match default {
        Some(d) => print!("{} [{}]: ", label, d),
        None => print!("{}: ", label),
    }
    io::stdout().flush().expect("flush stdout");
    let mut input = String::new();
    io::stdin().read_line(&mut input).expect("read stdin");
    let input = input.trim().to_string();
    if input.is_empty() {
        default.unwrap_or("").to_string()
    } else {
        input
    }
}

fn prompt_password(label: &str) -> String {
    print!("{}: ", label);
    io::stdout().flush().expect("flush stdout");
    rpassword::read_password().expect("Failed to read password")
}

fn read_env_file(path: &Path) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Ok(content) = std::fs::read_to_string(path) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                map.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    map
}

/// Rewrite `updates` into the env file, keeping every other line as is.
fn write_env_file(path: &Path, updates: &HashMap<String, String>) {
    let mut lines: Vec<String> = Vec::new();
    let mut written: HashSet<String> = HashSet::new();

    if let Ok(content) = std::fs::read_to_string(path) {
        for line in content.lines() {
            match line.trim().split_once('=') {
                Some((key, _)) if updates.contains_key(key.trim()) => {
                    let key = key.trim();
                    lines.push(format!("{}={}", key, updates[key]));
                    written.insert(key.to_string());
                }
                _ => lines.push(line.to_string()),
            }
        }
    }

    for (key, value) in updates {
        if !written.contains(key) {
            lines.push(format!("{}={}", key, value));
        }
    }

    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content).expect("Failed to write .env file");
}

#[tokio::main]
async fn main() {
    println!("=== Gatehouse Setup ===\n");

    let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let env_vars = read_env_file(&env_path);
    let current_url = env_vars
        .get("DATABASE_URL")
        .cloned()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let database_url = prompt("Database URL", current_url.as_deref());
    if database_url.is_empty() {
        eprintln!("A database URL is required.");
        std::process::exit(1);
    }

    let name = prompt("Admin name", Some("Administrator"));
    let email = prompt("Admin email", None).to_lowercase();
    if !email.contains('@') {
        eprintln!("Not a valid email address.");
        std::process::exit(1);
    }

    let password = prompt_password("Admin password");
    if password.chars().count() < 8 {
        eprintln!("Password must be at least 8 characters.");
        std::process::exit(1);
    }
    if prompt_password("Repeat password") != password {
        eprintln!("Passwords do not match.");
        std::process::exit(1);
    }

    println!("\nConnecting to database...");
    let pool = gate_api::db::pool::connect(&database_url)
        .expect("failed to create database pool");
    let store = PgStore::new(pool);

    let password_hash = password::hash_password(&password).expect("failed to hash password");
    let admin = User {
        id: SnowflakeGenerator::new(0).generate(),
        name,
        email,
        role: Role::Admin,
        password_hash,
        face_ref: None,
        created_at: Utc::now(),
    };

    match store.insert_user(admin, None).await {
        Ok(user) => {
            println!("\n=== Admin created ===");
            println!("  id:    {}", user.id);
            println!("  email: {}", user.email);
        }
        Err(StoreError::Conflict(what)) => {
            eprintln!("An account with that {what} already exists.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to create admin: {e}");
            std::process::exit(1);
        }
    }

    if current_url.as_deref() != Some(database_url.as_str()) {
        let mut updates = HashMap::new();
        updates.insert("DATABASE_URL".to_string(), database_url);
        write_env_file(&env_path, &updates);
        println!("\nDATABASE_URL written to .env");
    }
    println!("Start the server with: cargo run -p gate-api");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_file_updates_keep_other_lines() {
        let path = std::env::temp_dir().join(format!("gate-setup-{}.env", std::process::id()));
        std::fs::write(&path, "# local\nDATABASE_URL=postgres://old\nPORT=5000\n").unwrap();

        let mut updates = HashMap::new();
        updates.insert("DATABASE_URL".to_string(), "postgres://new".to_string());
        updates.insert("RUST_LOG".to_string(), "info".to_string());
        write_env_file(&path, &updates);

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            written,
            "# local\nDATABASE_URL=postgres://new\nPORT=5000\nRUST_LOG=info\n"
        );
    }
}
