//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! CLI flags (clap) ──┐
//!                    ├─▶ AppConfig ─▶ validation ─▶ accepted into the app
//! TOML file ─────────┘
//! ```
//!
//! # Design Decisions
//! - Serde handles syntax; `validation` handles semantics
//! - Every section has a `Default` so a bare binary runs locally
//! - CLI flags override file values, mirroring the original flag surface

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AppConfig, CorsConfig, DbConfig, LimiterConfig, ObservabilityConfig, ServerConfig,
    SmtpConfig, TokenTtlConfig,
};
