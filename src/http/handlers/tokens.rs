//! Token issuance handlers.
//!
//! Login issues an authentication token; the other two endpoints re-issue
//! activation and password-reset tokens by email. Only hashes are stored;
//! the plaintext leaves the process exactly once, in the response or the
//! outbound email.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::data::tokens::{Token, TokenScope};
use crate::data::users::verify_password;
use crate::data::StoreError;
use crate::http::errors::{field_error, ApiError};
use crate::http::server::AppState;
use crate::mail;

#[derive(Debug, Deserialize)]
pub struct CredentialsInput {
    pub email: String,
    pub password: String,
}

pub async fn create_authentication_token(
    State(state): State<AppState>,
    Json(input): Json<CredentialsInput>,
) -> Result<Response, ApiError> {
    let user = state
        .stores
        .users
        .get_by_email(&input.email)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => ApiError::InvalidCredential,
            other => other.into(),
        })?;

    if !verify_password(&user.password_hash, &input.password) {
        return Err(ApiError::InvalidCredential);
    }

    let token = Token::generate(
        user.id,
        state.config.tokens.authentication(),
        TokenScope::Authentication,
    );
    state.stores.tokens.insert(&token).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "authentication_token": {
                "token": token.plaintext,
                "expiry": token.expiry,
            },
        })),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct EmailInput {
    pub email: String,
}

pub async fn create_activation_token(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> Result<Response, ApiError> {
    let user = state
        .stores
        .users
        .get_by_email(&input.email)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => field_error("email", "no matching email address found"),
            other => other.into(),
        })?;

    if user.activated {
        return Err(field_error("email", "user has already been activated"));
    }

    let token = Token::generate(
        user.id,
        state.config.tokens.activation(),
        TokenScope::Activation,
    );
    state.stores.tokens.insert(&token).await?;

    mail::send_in_background(
        state.mailer.clone(),
        user.email,
        "token_activation",
        json!({ "activation_token": token.plaintext }),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "an email will be sent to you containing activation instructions",
        })),
    )
        .into_response())
}

pub async fn create_password_reset_token(
    State(state): State<AppState>,
    Json(input): Json<EmailInput>,
) -> Result<Response, ApiError> {
    let user = state
        .stores
        .users
        .get_by_email(&input.email)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => field_error("email", "no matching email address found"),
            other => other.into(),
        })?;

    if !user.activated {
        return Err(field_error("email", "user account must be activated"));
    }

    let token = Token::generate(
        user.id,
        state.config.tokens.password_reset(),
        TokenScope::PasswordReset,
    );
    state.stores.tokens.insert(&token).await?;

    mail::send_in_background(
        state.mailer.clone(),
        user.email,
        "token_password_reset",
        json!({ "password_reset_token": token.plaintext }),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "an email will be sent to you containing password reset instructions",
        })),
    )
        .into_response())
}
