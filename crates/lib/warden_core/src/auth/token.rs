//! Access/refresh token minting and verification (HS256 JWT).

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{TokenClaims, TokenKind, TokenPair};

/// Access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 30 days.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Longest configurable token lifetime: 10 years.
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Why a presented token was rejected.
///
/// Callers treat every variant as "unauthenticated"; the distinction exists
/// for logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("expected {expected} token, got {found}")]
    WrongKind { expected: TokenKind, found: TokenKind },

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token revoked")]
    Revoked,
}

/// Mints and verifies tokens with a single process-wide secret.
///
/// Verification is stateless: changing the secret invalidates every
/// outstanding token.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    /// Create a service with the default lifetimes (15 min / 30 days).
    pub fn new(secret: &[u8]) -> Self {
        Self::with_lifetimes(
            secret,
            Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            Duration::seconds(REFRESH_TOKEN_TTL_SECS),
        )
    }

    pub fn with_lifetimes(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint an access token for `subject_id`.
    pub fn issue_access(&self, subject_id: &str) -> Result<String, AuthError> {
        self.issue(subject_id, TokenKind::Access, self.access_ttl)
    }

    /// Mint a refresh token for `subject_id`.
    pub fn issue_refresh(&self, subject_id: &str) -> Result<String, AuthError> {
        self.issue(subject_id, TokenKind::Refresh, self.refresh_ttl)
    }

    /// Mint an access/refresh pair.
    pub fn issue_pair(&self, subject_id: &str) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue_access(subject_id)?,
            refresh_token: self.issue_refresh(subject_id)?,
            expires_in: self.access_ttl.num_seconds(),
        })
    }

    fn issue(&self, subject_id: &str, kind: TokenKind, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::Internal(format!("{kind} token lifetime overflows the clock")))?;
        let claims = TokenClaims {
            sub: subject_id.to_string(),
            kind,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify a token of the expected kind, returning its subject.
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<String, TokenError> {
        let claims = self.decode(token)?;
        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected,
                found: claims.kind,
            });
        }
        Ok(claims.sub)
    }

    /// Check signature, structure and expiry, returning the claims.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);
        decode::<TokenClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed(e.to_string()),
            })
    }
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Resolve the JWT secret: `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret(lookup: impl Fn(&str) -> Option<String>) -> String {
    resolve_jwt_secret_at(lookup, &jwt_secret_path())
}

/// Like [`resolve_jwt_secret`] with an explicit location for the persisted
/// secret.
pub fn resolve_jwt_secret_at(lookup: impl Fn(&str) -> Option<String>, secret_path: &Path) -> String {
    for key in ["JWT_SECRET", "AUTH_SECRET"] {
        if let Some(secret) = lookup(key)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    if let Ok(existing) = std::fs::read_to_string(secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(secret_path, &secret) {
        Ok(()) => info!(path = %secret_path.display(), "generated new JWT secret"),
        Err(e) => warn!(
            path = %secret_path.display(),
            error = %e,
            "could not persist generated JWT secret; tokens will not survive a restart"
        ),
    }
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("warden")
        .join("jwt-secret")
}
