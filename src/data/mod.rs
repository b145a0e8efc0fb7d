//! Data access boundary.
//!
//! # Data Flow
//! ```text
//! handlers / pipeline
//!     → Stores (trait objects, one per aggregate)
//!         → pg.rs  (sqlx/Postgres, production)
//!         → mem.rs (in-process, tests and local development)
//! ```
//!
//! # Design Decisions
//! - Traits at the store seam so tests run without Postgres
//! - Every store call is bounded by a 3-second timeout; a timeout is an
//!   infrastructure failure, never a domain error
//! - Optimistic locking lives behind `update`: id match, version match and
//!   version increment are one atomic statement on the store side

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub mod mem;
pub mod movies;
pub mod permissions;
pub mod pg;
pub mod tokens;
pub mod users;

pub use movies::{Filters, Metadata, Movie, MovieStore};
pub use permissions::{PermissionStore, Permissions};
pub use tokens::{Token, TokenScope, TokenStore};
pub use users::{AuthenticatedUser, Identity, User, UserStore};

/// Upper bound on any single request-scoped store call.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors that can occur at the store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record matched the lookup.
    #[error("record not found")]
    NotFound,

    /// A conditional update matched zero rows: the record vanished or its
    /// version moved. The caller cannot tell which, and must not retry
    /// automatically.
    #[error("edit conflict: the record was modified or deleted concurrently")]
    EditConflict,

    /// A user row with this email address already exists.
    #[error("duplicate email")]
    DuplicateEmail,

    /// The store did not answer within [`CALL_TIMEOUT`].
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// Unexpected database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Run a store future under the request-scoped call timeout.
pub(crate) async fn bounded<T, F>(fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(CALL_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(CALL_TIMEOUT)),
    }
}

/// The set of store handles handed to the HTTP layer.
#[derive(Clone)]
pub struct Stores {
    pub movies: Arc<dyn MovieStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

impl Stores {
    /// Postgres-backed stores sharing one connection pool.
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            movies: Arc::new(pg::PgMovieStore::new(pool.clone())),
            users: Arc::new(pg::PgUserStore::new(pool.clone())),
            tokens: Arc::new(pg::PgTokenStore::new(pool.clone())),
            permissions: Arc::new(pg::PgPermissionStore::new(pool)),
        }
    }

    /// In-memory stores sharing one state table.
    pub fn in_memory() -> Self {
        let store = Arc::new(mem::MemStore::new());
        Self {
            movies: store.clone(),
            users: store.clone(),
            tokens: store.clone(),
            permissions: store,
        }
    }
}
