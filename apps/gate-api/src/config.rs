use std::time::Duration;

/// Gate API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. When unset the in-memory store is used.
    pub database_url: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Gateway URL advertised to residents at login. Derived from `port`
    /// when unset.
    pub public_ws_url: Option<String>,
    /// Lifetime of a login session token.
    pub session_ttl_secs: u64,
    /// Upper bound on a single push into a channel's delivery queue.
    pub push_timeout_ms: u64,
    /// Per-channel delivery queue depth.
    pub push_queue_capacity: usize,
    /// Channels without a heartbeat for this long are swept.
    pub stale_channel_secs: u64,
}

impl Config {
    /// Load configuration from environment variables, applying defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            port: parsed_var("PORT").unwrap_or(5000),
            public_ws_url: std::env::var("PUBLIC_WS_URL").ok().filter(|s| !s.is_empty()),
            session_ttl_secs: parsed_var("SESSION_TTL_SECS").unwrap_or(24 * 3600),
            push_timeout_ms: parsed_var("PUSH_TIMEOUT_MS").unwrap_or(250),
            push_queue_capacity: parsed_var::<usize>("PUSH_QUEUE_CAPACITY")
                .unwrap_or(64)
                .max(1),
            stale_channel_secs: parsed_var("STALE_CHANNEL_SECS").unwrap_or(120),
        }
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }

    pub fn stale_channel_after(&self) -> Duration {
        Duration::from_secs(self.stale_channel_secs)
    }

    /// The gateway URL handed to clients alongside a ws ticket.
    pub fn ws_url(&self) -> String {
        self.public_ws_url
            .clone()
            .unwrap_or_else(|| format!("ws://localhost:{}/gateway", self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 5000,
            public_ws_url: None,
            session_ttl_secs: 24 * 3600,
            push_timeout_ms: 250,
            push_queue_capacity: 64,
            stale_channel_secs: 120,
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
