//! Authentication logic.
//!
//! Provides password hashing, token management, failed-login tracking and the
//! session coordinator that drives register/login/refresh/logout against a
//! [`UserRepository`](crate::repo::UserRepository).

pub mod lockout;
pub mod password;
pub mod session;
pub mod token;
pub mod validation;
pub mod verifier;

use thiserror::Error;
use tracing::error;

use crate::repo::RepoError;
pub use token::TokenError;

/// Authentication errors.
///
/// `InvalidCredentials` covers both an unknown email and a wrong password so
/// responses never reveal whether an account exists.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked")]
    AccountLocked,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("Rate limit exceeded for {action}")]
    RateLimited { action: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    #[error("Corrupt credential: {0}")]
    CorruptCredential(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Log a repository failure with the operation that hit it and lift it into
/// the auth taxonomy.
pub(crate) fn repo_failure(op: &'static str, err: RepoError) -> AuthError {
    match err {
        RepoError::DuplicateEmail => AuthError::DuplicateEmail,
        RepoError::Unavailable(msg) => {
            error!(op, error = %msg, "user repository call failed");
            AuthError::RepositoryUnavailable(msg)
        }
    }
}
