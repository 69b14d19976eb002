//! Server configuration
//!
//! All settings come from `ORDER_STREAM_*` environment variables:
//!
//! ```bash
//! ORDER_STREAM_BIND=0.0.0.0:5000
//! ORDER_STREAM_JWT_SECRET=your-super-secret-key-at-least-32-chars
//! ORDER_STREAM_USERS=alice:password123:operator,bob:secret456:viewer
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::MIN_SECRET_LEN;
use crate::error::ConfigError;
use crate::types::Role;

/// Longest accepted credential lifetime (ten years)
pub const MAX_TOKEN_TTL: i64 = 10 * 365 * 86_400;

/// A user to seed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedUser {
    pub username: String,
    pub password: String,
    pub role: Role,
}

/// Configuration for the order stream server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Path of the WebSocket endpoint.
    pub ws_path: String,
    /// Signing secret for session credentials; generated per process if unset.
    pub jwt_secret: Option<String>,
    /// Credential lifetime in seconds.
    pub token_ttl: i64,
    /// Users seeded into the identity store.
    pub users: Vec<SeedUser>,
    /// Outbound frames buffered per subscriber before drops begin.
    pub subscriber_buffer: usize,
    /// Interval between server heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Disconnect subscribers whose buffer overflows instead of dropping frames.
    pub evict_slow_consumers: bool,
    /// Name of the session cookie.
    pub cookie_name: String,
    /// bcrypt work factor for stored passwords.
    pub bcrypt_cost: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            ws_path: "/ws".to_string(),
            jwt_secret: None,
            token_ttl: 86_400,
            users: Vec::new(),
            subscriber_buffer: 64,
            heartbeat_interval: Duration::from_secs(30),
            evict_slow_consumers: false,
            cookie_name: "order_session".to_string(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::invalid(key, e.to_string())),
        None => Ok(None),
    }
}

/// Parse `user:password[:role]` entries separated by commas
pub fn parse_users(spec: &str) -> Result<Vec<SeedUser>, ConfigError> {
    spec.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let parts: Vec<&str> = entry.split(':').collect();
            if parts.len() < 2 || parts[0].is_empty() || parts[1].is_empty() {
                return Err(ConfigError::invalid(
                    "ORDER_STREAM_USERS",
                    format!("entry '{}' must be user:password[:role]", parts[0]),
                ));
            }
            let role = match parts.get(2) {
                Some(raw) => Role::parse(raw).ok_or_else(|| {
                    ConfigError::invalid("ORDER_STREAM_USERS", format!("unknown role '{}'", raw))
                })?,
                None => Role::Viewer,
            };
            Ok(SeedUser {
                username: parts[0].to_string(),
                password: parts[1].to_string(),
                role,
            })
        })
        .collect()
}

impl ServerConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = parse_var::<SocketAddr>("ORDER_STREAM_BIND", &lookup)? {
            config.bind_addr = addr;
        }
        if let Some(path) = lookup("ORDER_STREAM_WS_PATH") {
            config.ws_path = path.trim().to_string();
        }
        config.jwt_secret = lookup("ORDER_STREAM_JWT_SECRET");
        if let Some(ttl) = parse_var::<i64>("ORDER_STREAM_TOKEN_TTL", &lookup)? {
            config.token_ttl = ttl;
        }
        if let Some(users) = lookup("ORDER_STREAM_USERS") {
            config.users = parse_users(&users)?;
        }
        if let Some(size) = parse_var::<usize>("ORDER_STREAM_SUBSCRIBER_BUFFER", &lookup)? {
            config.subscriber_buffer = size;
        }
        if let Some(secs) = parse_var::<u64>("ORDER_STREAM_HEARTBEAT_SECS", &lookup)? {
            config.heartbeat_interval = Duration::from_secs(secs);
        }
        if let Some(evict) = parse_var::<bool>("ORDER_STREAM_EVICT_SLOW", &lookup)? {
            config.evict_slow_consumers = evict;
        }
        if let Some(name) = lookup("ORDER_STREAM_COOKIE") {
            config.cookie_name = name.trim().to_string();
        }

        if let Some(cost) = parse_var::<u32>("ORDER_STREAM_BCRYPT_COST", &lookup)? {
            config.bcrypt_cost = cost;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::invalid("ORDER_STREAM_WS_PATH", "must start with '/'"));
        }
        if let Some(ref secret) = self.jwt_secret {
            if secret.len() < MIN_SECRET_LEN {
                return Err(ConfigError::invalid(
                    "ORDER_STREAM_JWT_SECRET",
                    format!("must be at least {} characters", MIN_SECRET_LEN),
                ));
            }
        }
        if self.token_ttl <= 0 || self.token_ttl > MAX_TOKEN_TTL {
            return Err(ConfigError::invalid(
                "ORDER_STREAM_TOKEN_TTL",
                format!("must be between 1 and {} seconds", MAX_TOKEN_TTL),
            ));
        }
        if self.subscriber_buffer == 0 {
            return Err(ConfigError::invalid(
                "ORDER_STREAM_SUBSCRIBER_BUFFER",
                "must be non-zero",
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::invalid("ORDER_STREAM_HEARTBEAT_SECS", "must be non-zero"));
        }
        if self.cookie_name.is_empty() || self.cookie_name.contains([';', '=', ' ']) {
            return Err(ConfigError::invalid("ORDER_STREAM_COOKIE", "not a valid cookie name"));
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::invalid("ORDER_STREAM_BCRYPT_COST", "must be between 4 and 31"));
        }
        Ok(())
    }
}
