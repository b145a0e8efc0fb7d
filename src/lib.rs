//! Marquee: an authenticated, rate-limited movie catalog API.

pub mod config;
pub mod data;
pub mod http;
pub mod lifecycle;
pub mod mail;
pub mod observability;
pub mod pipeline;

pub use config::schema::AppConfig;
pub use http::server::ApiServer;
pub use lifecycle::Shutdown;
