// Runtime configuration, read once at startup
use std::env;

/// Backend settings sourced from environment variables. Every field has a
/// default so a bare `shardfallserv` starts up for local development.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path (DATABASE_URL).
    pub database_url: String,
    /// Listen address, host:port (BIND_ADDR).
    pub bind_addr: String,
    /// Serve HTTPS with cert.pem/key.pem when true (USE_TLS).
    pub use_tls: bool,
    /// JWT signing secret (JWT_SECRET). None means an ephemeral secret is
    /// generated at boot and sessions do not survive a restart.
    pub jwt_secret: Option<String>,
    /// Password for the bootstrap admin account (ADMIN_PASSWORD). None means
    /// a random one is generated and logged once.
    pub admin_password: Option<String>,
    /// Lifetime of an issued join token in seconds (JOIN_TOKEN_TTL).
    pub join_token_ttl_secs: i64,
    /// How recent a heartbeat must be for a server to count as online,
    /// in seconds (HEARTBEAT_TTL).
    pub heartbeat_ttl_secs: i64,
    /// How often the expired/used token sweep runs, in seconds
    /// (TOKEN_SWEEP_INTERVAL).
    pub token_sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "shardfall.db".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            use_tls: env::var("USE_TLS").unwrap_or_default() == "true",
            jwt_secret: env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|s| !s.is_empty()),
            join_token_ttl_secs: parse_var("JOIN_TOKEN_TTL", 60),
            heartbeat_ttl_secs: parse_var("HEARTBEAT_TTL", 30),
            token_sweep_interval_secs: parse_var("TOKEN_SWEEP_INTERVAL", 60),
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    match env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring unparsable {}={:?}, using default {}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
