use std::time::Duration;

use crate::auth::jwt::JwtConfig;

/// Log output format, selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines (default).
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    fn from_env_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Tuning for the realtime hub.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Per-client outbound buffer; a client whose buffer fills is evicted.
    pub client_buffer: usize,
    /// Interval between server pings.
    pub heartbeat_interval: Duration,
    /// A client that sends nothing (not even a pong) for this long is dropped.
    pub read_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            client_buffer: 256,
            heartbeat_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(90),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on each background component's shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Outbox polling interval (default: 1 s).
    pub outbox_poll_interval: Duration,
    pub realtime: RealtimeConfig,
    pub log_format: LogFormat,
    /// JWT token configuration (secret, expiry).
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `3000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                    |
    /// | `OUTBOX_POLL_INTERVAL_MS`  | `1000`                  |
    /// | `WS_CLIENT_BUFFER`         | `256`                   |
    /// | `WS_HEARTBEAT_SECS`        | `30`                    |
    /// | `WS_READ_TIMEOUT_SECS`     | `90`                    |
    /// | `LOG_FORMAT`               | `pretty` (or `json`)    |
    ///
    /// See [`JwtConfig::from_env`] for the JWT variables.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let outbox_poll_interval_ms: u64 = std::env::var("OUTBOX_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("OUTBOX_POLL_INTERVAL_MS must be a valid u64");

        let defaults = RealtimeConfig::default();
        let client_buffer: usize = std::env::var("WS_CLIENT_BUFFER")
            .map(|v| v.parse().expect("WS_CLIENT_BUFFER must be a valid usize"))
            .unwrap_or(defaults.client_buffer);
        assert!(client_buffer > 0, "WS_CLIENT_BUFFER must be at least 1");

        let heartbeat_secs: u64 = std::env::var("WS_HEARTBEAT_SECS")
            .map(|v| v.parse().expect("WS_HEARTBEAT_SECS must be a valid u64"))
            .unwrap_or(defaults.heartbeat_interval.as_secs());

        let read_timeout_secs: u64 = std::env::var("WS_READ_TIMEOUT_SECS")
            .map(|v| v.parse().expect("WS_READ_TIMEOUT_SECS must be a valid u64"))
            .unwrap_or(defaults.read_timeout.as_secs());

        let log_format = std::env::var("LOG_FORMAT")
            .map(|v| LogFormat::from_env_value(&v))
            .unwrap_or(LogFormat::Pretty);

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            outbox_poll_interval: Duration::from_millis(outbox_poll_interval_ms),
            realtime: RealtimeConfig {
                client_buffer,
                heartbeat_interval: Duration::from_secs(heartbeat_secs),
                read_timeout: Duration::from_secs(read_timeout_secs),
            },
            log_format,
            jwt,
        }
    }
}
