//! Application error types.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::debug;
use warden_core::auth::AuthError;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Account locked")]
    AccountLocked,

    #[error("Too many {0} requests")]
    RateLimited(String),

    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// HTTP status, stable `kind` string and client-facing message.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.clone()),
            AppError::DuplicateEmail => (
                StatusCode::BAD_REQUEST,
                "duplicate_email",
                "Email already registered".into(),
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid email or password".into(),
            ),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "invalid_token", m.clone()),
            AppError::AccountLocked => (
                StatusCode::FORBIDDEN,
                "account_locked",
                "Account locked after repeated failed logins".into(),
            ),
            AppError::RateLimited(action) => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                format!("Too many {action} requests, try again later"),
            ),
            AppError::RepositoryUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "repository_unavailable",
                "Service temporarily unavailable".into(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".into(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = self.parts();
        let body = Json(ErrorResponse {
            kind: kind.to_string(),
            message,
        });
        (status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::DuplicateEmail => AppError::DuplicateEmail,
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::AccountLocked => AppError::AccountLocked,
            AuthError::InvalidToken(reason) => {
                debug!(%reason, "rejected token");
                AppError::Unauthorized("Invalid or expired token".into())
            }
            AuthError::RateLimited { action } => AppError::RateLimited(action),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::RepositoryUnavailable(msg) => AppError::RepositoryUnavailable(msg),
            AuthError::CorruptCredential(msg) | AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use warden_core::auth::TokenError;

    use super::*;

    fn status(e: AuthError) -> StatusCode {
        AppError::from(e).into_response().status()
    }

    #[test]
    fn auth_errors_map_to_statuses() {
        assert_eq!(status(AuthError::DuplicateEmail), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::InvalidToken(TokenError::Expired)), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::AccountLocked), StatusCode::FORBIDDEN);
        assert_eq!(
            status(AuthError::RateLimited { action: "login".into() }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status(AuthError::RepositoryUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(AuthError::CorruptCredential("bad hash".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let (_, _, message) = AppError::RepositoryUnavailable("pg at 10.0.0.5 refused".into()).parts();
        assert!(!message.contains("10.0.0.5"));
        let (_, _, message) = AppError::Internal("bcrypt blew up".into()).parts();
        assert!(!message.contains("bcrypt"));
    }
}
