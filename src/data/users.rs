//! User accounts and request identity.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::permissions::Permissions;
use crate::data::tokens::TokenScope;
use crate::data::StoreError;

/// A registered account. Users carry a version and update through the same
/// conditional-update discipline as movies.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip_serializing)]
    pub version: i32,
}

/// The identity resolved for a request.
///
/// `Anonymous` is the sentinel for requests presenting no credential: it
/// carries no permissions and can never pass an activation check.
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    Known(AuthenticatedUser),
}

/// A concrete user with their permission set, resolved once at
/// authentication time so later checks are pure in-memory.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: User,
    pub permissions: Permissions,
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::Known(auth) => Some(&auth.user),
        }
    }

    pub fn permissions(&self) -> Option<&Permissions> {
        match self {
            Identity::Anonymous => None,
            Identity::Known(auth) => Some(&auth.permissions),
        }
    }
}

/// Hash a plaintext password with argon2id and a fresh salt.
pub fn hash_password(plaintext: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)?
        .to_string())
}

/// Check a plaintext password against a stored argon2id hash.
pub fn verify_password(hash: &str, plaintext: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Store contract for users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new account; fills in id, created_at and version (1).
    /// A taken email address is [`StoreError::DuplicateEmail`].
    async fn insert(&self, user: &mut User) -> Result<(), StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// Conditional update keyed on (id, version); bumps `user.version` on
    /// success.
    async fn update(&self, user: &mut User) -> Result<(), StoreError>;

    /// Resolve a token hash to its user, scoped and expiry-checked in the
    /// same lookup. A miss and an expired token are indistinguishable.
    async fn get_for_token(&self, scope: TokenScope, hash: &str) -> Result<User, StoreError>;
}
