//! Registration, activation and password-reset handlers.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::data::tokens::{self, Token, TokenScope};
use crate::data::users::{hash_password, User};
use crate::data::StoreError;
use crate::http::errors::{field_error, validation, ApiError};
use crate::http::server::AppState;
use crate::mail;

fn validate_email(errors: &mut BTreeMap<String, String>, email: &str) {
    if email.is_empty() {
        errors.insert("email".into(), "must be provided".into());
    } else if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        errors.insert("email".into(), "must be a valid email address".into());
    }
}

fn validate_password(errors: &mut BTreeMap<String, String>, password: &str) {
    if password.is_empty() {
        errors.insert("password".into(), "must be provided".into());
    } else if password.len() < 8 {
        errors.insert("password".into(), "must be at least 8 bytes long".into());
    } else if password.len() > 72 {
        errors.insert("password".into(), "must not be more than 72 bytes long".into());
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<Response, ApiError> {
    let mut errors = BTreeMap::new();
    if input.name.is_empty() {
        errors.insert("name".into(), "must be provided".into());
    } else if input.name.len() > 500 {
        errors.insert("name".into(), "must not be more than 500 bytes long".into());
    }
    validate_email(&mut errors, &input.email);
    validate_password(&mut errors, &input.password);
    if !errors.is_empty() {
        return Err(validation(errors));
    }

    let password_hash = hash_password(&input.password).map_err(|_| ApiError::Infrastructure)?;
    let mut user = User {
        id: 0,
        created_at: Utc::now(),
        name: input.name,
        email: input.email,
        password_hash,
        activated: false,
        version: 0,
    };
    state.stores.users.insert(&mut user).await?;

    // New accounts start with read access only.
    state
        .stores
        .permissions
        .add_for_user(user.id, &["movies:read"])
        .await?;

    let token = Token::generate(
        user.id,
        state.config.tokens.activation(),
        TokenScope::Activation,
    );
    state.stores.tokens.insert(&token).await?;

    mail::send_in_background(
        state.mailer.clone(),
        user.email.clone(),
        "user_welcome",
        json!({ "activation_token": token.plaintext, "user_id": user.id }),
    );

    Ok((StatusCode::ACCEPTED, Json(json!({ "user": user }))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ActivateInput {
    pub token: String,
}

pub async fn activate(
    State(state): State<AppState>,
    Json(input): Json<ActivateInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !tokens::plaintext_is_well_formed(&input.token) {
        return Err(field_error("token", "must be 26 bytes long"));
    }

    let hash = Token::hash_plaintext(&input.token);
    let mut user = state
        .stores
        .users
        .get_for_token(TokenScope::Activation, &hash)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => field_error("token", "invalid or expired activation token"),
            other => other.into(),
        })?;

    // Flips exactly once; a concurrent activation loses on the version.
    user.activated = true;
    state.stores.users.update(&mut user).await?;
    state
        .stores
        .tokens
        .delete_all_for_user(TokenScope::Activation, user.id)
        .await?;

    Ok(Json(json!({ "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordInput {
    pub password: String,
    pub token: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(input): Json<ResetPasswordInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut errors = BTreeMap::new();
    validate_password(&mut errors, &input.password);
    if !tokens::plaintext_is_well_formed(&input.token) {
        errors.insert("token".into(), "must be 26 bytes long".into());
    }
    if !errors.is_empty() {
        return Err(validation(errors));
    }

    let hash = Token::hash_plaintext(&input.token);
    let mut user = state
        .stores
        .users
        .get_for_token(TokenScope::PasswordReset, &hash)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => {
                field_error("token", "invalid or expired password reset token")
            }
            other => other.into(),
        })?;

    user.password_hash = hash_password(&input.password).map_err(|_| ApiError::Infrastructure)?;
    state.stores.users.update(&mut user).await?;
    state
        .stores
        .tokens
        .delete_all_for_user(TokenScope::PasswordReset, user.id)
        .await?;

    Ok(Json(json!({ "message": "your password was successfully reset" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        let mut errors = BTreeMap::new();
        validate_email(&mut errors, "alice@example.com");
        assert!(errors.is_empty());

        for bad in ["", "nope", "@example.com", "alice@"] {
            let mut errors = BTreeMap::new();
            validate_email(&mut errors, bad);
            assert!(errors.contains_key("email"), "should reject {bad:?}");
        }
    }

    #[test]
    fn password_length_bounds() {
        let mut errors = BTreeMap::new();
        validate_password(&mut errors, "pa55word1234");
        assert!(errors.is_empty());

        let mut errors = BTreeMap::new();
        validate_password(&mut errors, "short");
        assert!(errors.contains_key("password"));

        let mut errors = BTreeMap::new();
        validate_password(&mut errors, &"x".repeat(73));
        assert!(errors.contains_key("password"));
    }
}
