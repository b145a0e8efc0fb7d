//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline stages produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters for admission, auth outcomes, conflicts)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments), recorded from the hot path
//! - Credential material never appears in log fields

pub mod logging;
pub mod metrics;
