//! The request-level error taxonomy and its JSON rendering.
//!
//! Every pipeline stage and handler terminates a request through one of
//! these variants. Infrastructure details are logged server-side and never
//! leak into a response body.

use std::collections::BTreeMap;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::data::StoreError;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Transient; the client should back off. Never retried server-side.
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// The credential had the wrong shape (scheme, length, charset).
    #[error("invalid or missing authentication token")]
    MalformedCredential,

    /// The credential was well-formed but unknown or expired.
    #[error("invalid or missing authentication token")]
    InvalidCredential,

    /// The route requires a concrete identity.
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    /// The route requires an activated account.
    #[error("your user account must be activated to access this resource")]
    AccountNotActivated,

    /// The account lacks the required permission code.
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    PermissionDenied,

    /// An optimistic-lock loser. The remedy is caller-side: re-fetch and
    /// re-apply.
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("the requested resource could not be found")]
    NotFound,

    /// Per-field validation failures, rendered as a 422 with the map.
    #[error("the request contains invalid fields")]
    Validation(BTreeMap<String, String>),

    #[error("{0}")]
    BadRequest(String),

    /// Store timeout, unexpected database error, or a contained panic.
    #[error("the server encountered a problem and could not process your request")]
    Infrastructure,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::MalformedCredential
            | ApiError::InvalidCredential
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::AccountNotActivated | ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Validation(fields) => json!({ "error": fields }),
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::EditConflict => {
                metrics::record_edit_conflict();
                ApiError::EditConflict
            }
            StoreError::DuplicateEmail => {
                let mut fields = BTreeMap::new();
                fields.insert(
                    "email".to_string(),
                    "a user with this email address already exists".to_string(),
                );
                ApiError::Validation(fields)
            }
            err @ (StoreError::Timeout(_) | StoreError::Database(_)) => {
                tracing::error!(error = %err, "Store failure");
                ApiError::Infrastructure
            }
        }
    }
}

/// Shorthand for handler validation results.
pub fn validation(fields: BTreeMap<String, String>) -> ApiError {
    ApiError::Validation(fields)
}

/// Single-field validation error.
pub fn field_error(field: &str, message: &str) -> ApiError {
    let mut fields = BTreeMap::new();
    fields.insert(field.to_string(), message.to_string());
    ApiError::Validation(fields)
}
