//! Failed-login tracking and account lockout.
//!
//! A record is `Active` with a failure count until the count reaches the
//! threshold, at which point the same write deactivates it. A successful
//! login resets the count. Only an administrative write reactivates a locked
//! record.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use super::{AuthError, repo_failure};
use crate::models::auth::CredentialRecord;
use crate::rate_limit::CounterStore;
use crate::repo::{CredentialUpdate, UserRepository};

/// Account state after recording a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Active { failed_attempts: u32 },
    Locked,
    /// The record disappeared between lookup and update.
    Missing,
}

/// Tracks failed logins per record, plus per-email counts for unknown emails.
#[derive(Clone)]
pub struct LoginAttemptTracker {
    repo: Arc<dyn UserRepository>,
    counters: Option<Arc<dyn CounterStore>>,
    threshold: u32,
    unknown_window: Duration,
}

impl LoginAttemptTracker {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        counters: Option<Arc<dyn CounterStore>>,
        threshold: u32,
        unknown_window: Duration,
    ) -> Self {
        Self {
            repo,
            counters,
            threshold,
            unknown_window,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Refuse authentication for a locked record.
    pub fn check(&self, record: &CredentialRecord) -> Result<(), AuthError> {
        if record.is_active {
            Ok(())
        } else {
            Err(AuthError::AccountLocked)
        }
    }

    /// Count a wrong password against `record`. The increment and the lock
    /// decision happen in one repository write.
    pub async fn record_failure(&self, record: &CredentialRecord) -> Result<AccountState, AuthError> {
        let update = CredentialUpdate::default().record_failure(self.threshold, Utc::now());
        let updated = self
            .repo
            .update_fields(&record.id, update)
            .await
            .map_err(|e| repo_failure("record_failure", e))?;

        let Some(updated) = updated else {
            return Ok(AccountState::Missing);
        };
        if updated.is_active {
            return Ok(AccountState::Active {
                failed_attempts: updated.failed_attempts,
            });
        }
        if record.is_active {
            warn!(
                subject_id = %updated.id,
                failed_attempts = updated.failed_attempts,
                "account locked after repeated failed logins"
            );
        }
        Ok(AccountState::Locked)
    }

    /// Clear the failure count after a correct password. Fails with
    /// [`AuthError::AccountLocked`] if the record was locked concurrently.
    pub async fn record_success(&self, record: &CredentialRecord) -> Result<(), AuthError> {
        if record.failed_attempts == 0 && record.last_failed_at.is_none() {
            return Ok(());
        }
        let update = CredentialUpdate::default().reset_failures().require_active();
        match self
            .repo
            .update_fields(&record.id, update)
            .await
            .map_err(|e| repo_failure("record_success", e))?
        {
            Some(_) => Ok(()),
            None => Err(AuthError::AccountLocked),
        }
    }

    /// Count a failed login for an email with no record. Never fails the
    /// caller; counter store problems are logged and dropped.
    pub async fn record_unknown(&self, email: &str) {
        let Some(counters) = &self.counters else {
            return;
        };
        let key = unknown_email_key(email);
        let count = match counters.increment_with_ttl(&key, self.unknown_window).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "failed to count login for unknown email");
                return;
            }
        };
        if count == u64::from(self.threshold) {
            warn!(email, attempts = count, "repeated failed logins for unknown email");
        }
    }
}

/// Counter key for failed logins against an unknown email.
pub fn unknown_email_key(email: &str) -> String {
    format!("login_failures:{email}")
}
