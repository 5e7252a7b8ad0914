//! Authentication domain models.
//!
//! These are internal domain models. The credential record is owned by the
//! user repository; the core only reads it and issues atomic updates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two disjoint token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// JWT claims embedded in both access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: credential record ID (standard JWT `sub` claim).
    pub sub: String,
    /// Token kind, checked on every verification.
    pub kind: TokenKind,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Unique token ID, so two tokens minted in the same second differ.
    pub jti: String,
}

/// Credential record as stored by the user repository.
#[derive(Clone)]
pub struct CredentialRecord {
    pub id: String,
    /// Normalized (lower-cased) email.
    pub email: String,
    pub profile_name: String,
    pub password_hash: String,
    /// `false` blocks all authentication.
    pub is_active: bool,
    pub failed_attempts: u32,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    /// SHA-256 hex digest of the single valid refresh token, if any.
    pub current_refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// Public fields safe to return to the caller.
    pub fn summary(&self) -> SubjectSummary {
        SubjectSummary {
            id: self.id.clone(),
            email: self.email.clone(),
            profile_name: self.profile_name.clone(),
            created_at: self.created_at,
            last_login: self.last_login,
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("profile_name", &self.profile_name)
            .field("password_hash", &"<redacted>")
            .field("is_active", &self.is_active)
            .field("failed_attempts", &self.failed_attempts)
            .field("last_failed_at", &self.last_failed_at)
            .field("last_login", &self.last_login)
            .field(
                "current_refresh_token",
                &self.current_refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Fields required to create a credential record.
#[derive(Clone)]
pub struct NewCredential {
    pub email: String,
    pub profile_name: String,
    pub password_hash: String,
}

/// Public profile of an authenticated subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub id: String,
    pub email: String,
    pub profile_name: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// A freshly minted access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Result of a successful register, login or refresh.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub tokens: TokenPair,
    pub subject: SubjectSummary,
}
