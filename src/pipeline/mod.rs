//! Request-processing pipeline.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs   (per-client admission, 429 on rejection)
//!     → authenticate.rs (bearer token → Identity, 401 on bad credentials)
//!     → authorize.rs    (per-route policy checks, 401/403 on denial)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Each stage terminates the request early with its own failure class
//! - Policy checks are an explicit ordered list, not nested closures
//! - Identity travels in request extensions; handlers never re-authenticate

pub mod authenticate;
pub mod authorize;
pub mod rate_limit;
