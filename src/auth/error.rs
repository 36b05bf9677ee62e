//! Auth error taxonomy and its HTTP mapping

use crate::auth::password::HashingFailure;
use crate::auth::user_store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Failures surfaced by the auth service and request gates.
///
/// Security-relevant variants carry no detail: callers cannot tell a wrong
/// password from an unknown account, or an expired token from a forged one.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered")]
    DuplicateEmail,
    #[error("authorization header required")]
    MissingCredential,
    #[error("invalid authorization format")]
    MalformedCredential,
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("insufficient permissions")]
    Forbidden,
    #[error("user not found")]
    NotFound,
    #[error("invalid request: {0}")]
    Validation(String),
    #[error(transparent)]
    HashingFailure(#[from] HashingFailure),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            StoreError::NotFound => AuthError::NotFound,
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials
            | AuthError::MissingCredential
            | AuthError::MalformedCredential
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::DuplicateEmail | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::HashingFailure(_) | AuthError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn public_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "Invalid credentials".to_string(),
            AuthError::DuplicateEmail => "Email already registered".to_string(),
            AuthError::MissingCredential => "Authorization header required".to_string(),
            AuthError::MalformedCredential => "Invalid authorization format".to_string(),
            AuthError::Unauthenticated => "Invalid token".to_string(),
            AuthError::Forbidden => "Insufficient permissions".to_string(),
            AuthError::NotFound => "User not found".to_string(),
            AuthError::Validation(msg) => msg.clone(),
            AuthError::HashingFailure(_) | AuthError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if matches!(self, AuthError::HashingFailure(_) | AuthError::Internal(_)) {
            error!("Auth request failed: {}", self);
        }

        let body = json!({ "error": self.public_message() });
        (self.status(), Json(body)).into_response()
    }
}
