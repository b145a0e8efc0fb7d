//! Flat per-user permission codes.

use async_trait::async_trait;
use serde::Serialize;

use crate::data::StoreError;

/// The permission codes held by one user. No hierarchy: membership is the
/// whole model.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn new(codes: Vec<String>) -> Self {
        Self(codes)
    }

    pub fn includes(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Store contract for permissions. Read-only at request time; `add_for_user`
/// only runs during registration.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn permissions_for(&self, user_id: i64) -> Result<Permissions, StoreError>;

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError>;
}
