//! User repository contract.
//!
//! The core never does read-modify-write on a credential record. Every
//! mutation goes through [`UserRepository::update_fields`] as one atomic
//! conditional write, so concurrent requests for the same subject cannot
//! interleave.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{CredentialRecord, NewCredential};

pub use memory::InMemoryUserRepository;
pub use postgres::PgUserRepository;

/// Repository errors.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e
            && db.is_unique_violation()
        {
            return RepoError::DuplicateEmail;
        }
        RepoError::Unavailable(e.to_string())
    }
}

/// How to change `failed_attempts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptCounter {
    /// Set to zero.
    Reset,
    /// Add one, and deactivate the record in the same write once the new
    /// value reaches `lock_at`.
    Increment { lock_at: u32 },
}

/// Partial update plus preconditions, applied atomically.
///
/// `None` fields are left untouched. For nullable columns the outer `Option`
/// selects whether to write and the inner one is the value.
#[derive(Debug, Clone, Default)]
pub struct CredentialUpdate {
    pub failed_attempts: Option<AttemptCounter>,
    pub last_failed_at: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
    pub current_refresh_token: Option<Option<String>>,
    pub last_login: Option<DateTime<Utc>>,

    /// Only apply while the record is active.
    pub require_active: bool,
    /// Only apply while `current_refresh_token` equals this value.
    pub expect_refresh_token: Option<String>,
}

impl CredentialUpdate {
    /// Count one failed login at `at`, locking at `lock_at`.
    pub fn record_failure(mut self, lock_at: u32, at: DateTime<Utc>) -> Self {
        self.failed_attempts = Some(AttemptCounter::Increment { lock_at });
        self.last_failed_at = Some(Some(at));
        self
    }

    /// Clear the failed-login counter.
    pub fn reset_failures(mut self) -> Self {
        self.failed_attempts = Some(AttemptCounter::Reset);
        self.last_failed_at = Some(None);
        self
    }

    /// Replace (or clear) the stored refresh token hash.
    pub fn refresh_token(mut self, token_hash: Option<String>) -> Self {
        self.current_refresh_token = Some(token_hash);
        self
    }

    pub fn touch_login(mut self, at: DateTime<Utc>) -> Self {
        self.last_login = Some(at);
        self
    }

    pub fn require_active(mut self) -> Self {
        self.require_active = true;
        self
    }

    /// Compare-and-set on the stored refresh token hash.
    pub fn expect_refresh_token(mut self, token_hash: String) -> Self {
        self.expect_refresh_token = Some(token_hash);
        self
    }

    /// Whether the preconditions hold for `record`.
    pub fn preconditions_hold(&self, record: &CredentialRecord) -> bool {
        if self.require_active && !record.is_active {
            return false;
        }
        match &self.expect_refresh_token {
            Some(expected) => record.current_refresh_token.as_deref() == Some(expected.as_str()),
            None => true,
        }
    }

    /// Apply the field assignments to an in-memory record.
    pub fn apply(&self, record: &mut CredentialRecord) {
        if let Some(active) = self.is_active {
            record.is_active = active;
        }
        match self.failed_attempts {
            Some(AttemptCounter::Reset) => record.failed_attempts = 0,
            Some(AttemptCounter::Increment { lock_at }) => {
                record.failed_attempts = record.failed_attempts.saturating_add(1);
                if record.failed_attempts >= lock_at {
                    record.is_active = false;
                }
            }
            None => {}
        }
        if let Some(at) = self.last_failed_at {
            record.last_failed_at = at;
        }
        if let Some(token) = &self.current_refresh_token {
            record.current_refresh_token = token.clone();
        }
        if let Some(at) = self.last_login {
            record.last_login = Some(at);
        }
    }
}

/// Storage for credential records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Look up by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<CredentialRecord>, RepoError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<CredentialRecord>, RepoError>;

    /// Create an active record with no failed attempts. Returns its ID.
    /// Fails with [`RepoError::DuplicateEmail`] if the email is taken.
    async fn insert(&self, credential: NewCredential) -> Result<String, RepoError>;

    /// Apply `update` atomically. Returns the updated record, or `None` if
    /// the record does not exist or a precondition failed.
    async fn update_fields(
        &self,
        id: &str,
        update: CredentialUpdate,
    ) -> Result<Option<CredentialRecord>, RepoError>;
}
