//! Policy-based authorization.
//!
//! A [`Policy`] is an explicit ordered list of named checks evaluated
//! against the identity the authenticator resolved. Ordering is fixed by
//! construction: permission-gated routes always require activation first,
//! and activation always requires a concrete identity, so a denial reason
//! tells the client exactly which rung they fell off.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};

use crate::data::users::Identity;
use crate::http::errors::ApiError;

/// A single named authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    /// The request must carry a concrete (non-anonymous) identity.
    Authenticated,
    /// The account must have been activated.
    Activated,
    /// The permission set must contain this code.
    Permission(&'static str),
}

/// An ordered list of checks applied before a handler runs.
#[derive(Debug, Clone)]
pub struct Policy {
    checks: Vec<Check>,
}

impl Policy {
    /// Requires a concrete, activated user. Used by health/status routes.
    pub fn activated() -> Self {
        Self {
            checks: vec![Check::Authenticated, Check::Activated],
        }
    }

    /// Requires a concrete, activated user holding `code`. Used by the
    /// protected resource routes.
    pub fn permission(code: &'static str) -> Self {
        Self {
            checks: vec![Check::Authenticated, Check::Activated, Check::Permission(code)],
        }
    }

    /// Evaluate the checks in order, returning the first denial.
    pub fn evaluate(&self, identity: &Identity) -> Result<(), ApiError> {
        for check in &self.checks {
            match check {
                Check::Authenticated => {
                    if identity.is_anonymous() {
                        return Err(ApiError::AuthenticationRequired);
                    }
                }
                Check::Activated => match identity.user() {
                    Some(user) if user.activated => {}
                    _ => return Err(ApiError::AccountNotActivated),
                },
                Check::Permission(code) => match identity.permissions() {
                    Some(perms) if perms.includes(code) => {}
                    _ => return Err(ApiError::PermissionDenied),
                },
            }
        }
        Ok(())
    }
}

/// Route-level enforcement middleware; the route declaration supplies the
/// policy as state.
pub async fn enforce(
    State(policy): State<Policy>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = request
        .extensions()
        .get::<Identity>()
        // The authenticator always runs first; a missing identity means the
        // router was assembled wrong.
        .ok_or(ApiError::Infrastructure)?;

    policy.evaluate(identity)?;
    Ok(next.run(request).await)
}
