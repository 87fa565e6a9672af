use std::time::Duration;

/// Realtime API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Name of the cookie carrying the member session token.
    pub session_cookie: String,
    /// How long a typing indicator lives without a fresh `typing:start`.
    pub typing_timeout: Duration,
    /// Interval between server-sent WebSocket pings.
    pub keepalive_interval: Duration,
    /// Connections silent for longer than this are closed.
    pub idle_timeout: Duration,
    /// Capacity of the in-process fan-out channel.
    pub broadcast_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            port: parsed_var("PORT").unwrap_or(4003),
            session_cookie: std::env::var("SESSION_COOKIE")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "member_session".to_string()),
            typing_timeout: millis_var("TYPING_TIMEOUT_MS", 5_000),
            keepalive_interval: millis_var("KEEPALIVE_INTERVAL_MS", 25_000),
            idle_timeout: millis_var("IDLE_TIMEOUT_MS", 60_000),
            broadcast_capacity: parsed_var("BROADCAST_CAPACITY").unwrap_or(4096),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn millis_var(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(parsed_var(name).unwrap_or(default_ms))
}
