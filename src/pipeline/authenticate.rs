//! Bearer-token authentication.
//!
//! Resolves the `Authorization` header to an [`Identity`] and stores it in
//! the request extensions. Absence of the header is not a failure: the
//! request proceeds as anonymous and downstream policy decides what that is
//! allowed to do. Permissions are loaded here, once, so authorization is a
//! pure in-memory check.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::data::tokens::{self, Token, TokenScope};
use crate::data::users::{AuthenticatedUser, Identity};
use crate::data::StoreError;
use crate::http::errors::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Authentication middleware.
pub async fn authenticate_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = match request.headers().get(header::AUTHORIZATION) {
        None => {
            metrics::record_auth_outcome("anonymous");
            Identity::Anonymous
        }
        Some(value) => {
            let header = value.to_str().map_err(|_| reject())?;
            let plaintext = parse_bearer(header).map_err(|e| {
                // The offending value is deliberately not logged.
                tracing::debug!("Malformed authorization header rejected");
                e
            })?;

            let hash = Token::hash_plaintext(plaintext);
            let user = state
                .stores
                .users
                .get_for_token(TokenScope::Authentication, &hash)
                .await
                .map_err(|e| match e {
                    StoreError::NotFound => {
                        metrics::record_auth_outcome("rejected");
                        ApiError::InvalidCredential
                    }
                    other => ApiError::from(other),
                })?;
            let permissions = state.stores.permissions.permissions_for(user.id).await?;

            metrics::record_auth_outcome("ok");
            Identity::Known(AuthenticatedUser { user, permissions })
        }
    };

    request.extensions_mut().insert(identity);

    let mut response = next.run(request).await;
    // Responses vary with the credential; make sure caches know.
    response
        .headers_mut()
        .append(header::VARY, header::HeaderValue::from_static("Authorization"));
    Ok(response)
}

/// Extract the opaque token from a `Bearer <token>` header value and check
/// it is structurally plausible. Purely local; no store access.
fn parse_bearer(header: &str) -> Result<&str, ApiError> {
    let parts: Vec<&str> = header.split(' ').collect();
    if parts.len() != 2 || parts[0] != "Bearer" {
        return Err(reject());
    }
    let plaintext = parts[1];
    if !tokens::plaintext_is_well_formed(plaintext) {
        return Err(reject());
    }
    Ok(plaintext)
}

fn reject() -> ApiError {
    metrics::record_auth_outcome("rejected");
    ApiError::MalformedCredential
}
