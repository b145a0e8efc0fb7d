//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the API server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings (bind address, environment, timeouts).
    pub server: ServerConfig,

    /// Database connection pool settings.
    pub db: DbConfig,

    /// Per-client rate limiting settings.
    pub limiter: LimiterConfig,

    /// Token lifetime per scope.
    pub tokens: TokenTtlConfig,

    /// Outbound SMTP settings.
    pub smtp: SmtpConfig,

    /// Cross-origin resource sharing settings.
    pub cors: CorsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    pub bind_address: String,

    /// Operating environment (development|staging|production).
    pub env: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4000".to_string(),
            env: "development".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Database connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DbConfig {
    /// Postgres DSN.
    pub dsn: String,

    /// Maximum open connections in the pool.
    pub max_connections: u32,

    /// Connection acquire timeout in seconds.
    pub acquire_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            dsn: String::new(),
            max_connections: 25,
            acquire_timeout_secs: 5,
        }
    }
}

/// Per-client rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained refill rate per client, in requests per second.
    pub requests_per_second: f64,

    /// Burst capacity per client.
    pub burst: u32,

    /// Evict a client after this much inactivity, in seconds.
    pub idle_after_secs: u64,

    /// Interval between eviction sweeps, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 2.0,
            burst: 4,
            idle_after_secs: 180,
            sweep_interval_secs: 60,
        }
    }
}

/// Token lifetime per scope.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenTtlConfig {
    /// Authentication token lifetime in hours.
    pub authentication_hours: i64,

    /// Activation token lifetime in hours.
    pub activation_hours: i64,

    /// Password-reset token lifetime in minutes.
    pub password_reset_minutes: i64,
}

impl Default for TokenTtlConfig {
    fn default() -> Self {
        Self {
            authentication_hours: 24,
            activation_hours: 72,
            password_reset_minutes: 45,
        }
    }
}

impl TokenTtlConfig {
    pub fn authentication(&self) -> chrono::Duration {
        chrono::Duration::hours(self.authentication_hours)
    }

    pub fn activation(&self) -> chrono::Duration {
        chrono::Duration::hours(self.activation_hours)
    }

    pub fn password_reset(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.password_reset_minutes)
    }
}

/// Outbound SMTP configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,

    /// Sender line used in the From header.
    pub sender: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2525,
            username: String::new(),
            password: String::new(),
            sender: "Marquee <no-reply@marquee.example>".to_string(),
        }
    }
}

/// Cross-origin resource sharing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to make cross-origin requests, matched exactly
    /// (e.g., "https://app.example.com"). Empty means no origin is trusted.
    pub trusted_origins: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
