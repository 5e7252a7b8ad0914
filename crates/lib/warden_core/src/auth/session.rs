//! Register, login, refresh and logout.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::lockout::LoginAttemptTracker;
use super::password::PasswordHasher;
use super::token::{TokenError, TokenService, hash_refresh_token};
use super::validation::{normalize_email, validate_email, validate_password, validate_profile_name};
use super::{AuthError, repo_failure};
use crate::config::{AuthConfig, ConfigError, RateLimitTable};
use crate::models::auth::{AuthSession, NewCredential, SubjectSummary, TokenKind};
use crate::rate_limit::{ACTION_LOGIN, ACTION_REFRESH, ACTION_REGISTER, CounterStore, RateLimiter};
use crate::repo::{CredentialUpdate, UserRepository};

/// Per-request facts the coordinator needs besides the payload.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Untrusted client identifier used only for rate-limit bucketing.
    pub client_origin: String,
}

impl RequestContext {
    pub fn new(client_origin: impl Into<String>) -> Self {
        Self {
            client_origin: client_origin.into(),
        }
    }
}

/// Drives the credential lifecycle against the injected repository and
/// counter store.
#[derive(Clone)]
pub struct SessionCoordinator {
    repo: Arc<dyn UserRepository>,
    hasher: PasswordHasher,
    tokens: TokenService,
    limiter: RateLimiter,
    rate_limits: RateLimitTable,
    attempts: LoginAttemptTracker,
}

impl SessionCoordinator {
    pub fn new(
        config: &AuthConfig,
        repo: Arc<dyn UserRepository>,
        counters: Option<Arc<dyn CounterStore>>,
    ) -> Result<Self, ConfigError> {
        let tokens = TokenService::with_lifetimes(
            config.jwt_secret.as_bytes(),
            chrono_duration("ACCESS_TOKEN_TTL_SECS", config.access_token_ttl)?,
            chrono_duration("REFRESH_TOKEN_TTL_SECS", config.refresh_token_ttl)?,
        );
        Ok(Self {
            hasher: PasswordHasher::new(config.bcrypt_cost)?,
            tokens,
            limiter: RateLimiter::new(counters.clone()),
            rate_limits: config.rate_limits.clone(),
            attempts: LoginAttemptTracker::new(
                repo.clone(),
                counters,
                config.lockout_threshold,
                config.unknown_email_window,
            ),
            repo,
        })
    }

    /// The token service sessions are minted with.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Create an account and open its first session.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        email: &str,
        password: &str,
        profile_name: &str,
    ) -> Result<AuthSession, AuthError> {
        self.gate(ACTION_REGISTER, ctx).await?;

        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;
        let profile_name = validate_profile_name(profile_name)?;

        if self
            .repo
            .find_by_email(&email)
            .await
            .map_err(|e| repo_failure("find_by_email", e))?
            .is_some()
        {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = self.hasher.hash(password)?;
        let subject_id = self
            .repo
            .insert(NewCredential {
                email,
                profile_name,
                password_hash,
            })
            .await
            .map_err(|e| repo_failure("insert", e))?;

        let session = self
            .open_session(&subject_id, CredentialUpdate::default().require_active(), "register")
            .await?
            .ok_or_else(|| AuthError::Internal("new account vanished before its session was stored".into()))?;
        info!(subject_id = %subject_id, "account registered");
        Ok(session)
    }

    /// Password login.
    ///
    /// An unknown email and a wrong password fail identically. A locked
    /// account is refused before the password is checked.
    pub async fn login(&self, ctx: &RequestContext, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        self.gate(ACTION_LOGIN, ctx).await?;

        let email = normalize_email(email);
        let Some(record) = self
            .repo
            .find_by_email(&email)
            .await
            .map_err(|e| repo_failure("find_by_email", e))?
        else {
            self.attempts.record_unknown(&email).await;
            return Err(AuthError::InvalidCredentials);
        };

        self.attempts.check(&record)?;

        if !self.hasher.verify(password, &record.password_hash)? {
            // A lock caused by this failure shows up on the next attempt.
            self.attempts.record_failure(&record).await?;
            return Err(AuthError::InvalidCredentials);
        }

        self.attempts.record_success(&record).await?;
        let session = self
            .open_session(
                &record.id,
                CredentialUpdate::default().touch_login(Utc::now()).require_active(),
                "login",
            )
            .await?
            .ok_or(AuthError::AccountLocked)?;
        info!(subject_id = %record.id, "login succeeded");
        Ok(session)
    }

    /// Exchange the current refresh token for a new pair. The presented token
    /// stops working once this returns.
    pub async fn refresh(&self, ctx: &RequestContext, refresh_token: &str) -> Result<AuthSession, AuthError> {
        self.gate(ACTION_REFRESH, ctx).await?;

        let subject_id = self.tokens.verify(refresh_token, TokenKind::Refresh)?;
        let record = self
            .repo
            .find_by_id(&subject_id)
            .await
            .map_err(|e| repo_failure("find_by_id", e))?
            .ok_or(TokenError::Revoked)?;
        if !record.is_active {
            return Err(TokenError::Revoked.into());
        }

        let presented = hash_refresh_token(refresh_token);
        if record.current_refresh_token.as_deref() != Some(presented.as_str()) {
            warn!(subject_id = %subject_id, "superseded refresh token presented");
            return Err(TokenError::Revoked.into());
        }

        let update = CredentialUpdate::default()
            .require_active()
            .expect_refresh_token(presented);
        match self.open_session(&subject_id, update, "refresh").await? {
            Some(session) => Ok(session),
            None => {
                warn!(subject_id = %subject_id, "refresh token rotated by a concurrent request");
                Err(TokenError::Revoked.into())
            }
        }
    }

    /// Drop the subject's refresh token. Succeeds whether or not one was set.
    pub async fn logout(&self, subject_id: &str) -> Result<(), AuthError> {
        self.repo
            .update_fields(subject_id, CredentialUpdate::default().refresh_token(None))
            .await
            .map_err(|e| repo_failure("logout", e))?;
        info!(subject_id, "logged out");
        Ok(())
    }

    /// Public profile of an authenticated subject.
    pub async fn subject(&self, subject_id: &str) -> Result<SubjectSummary, AuthError> {
        self.repo
            .find_by_id(subject_id)
            .await
            .map_err(|e| repo_failure("find_by_id", e))?
            .map(|record| record.summary())
            .ok_or(AuthError::InvalidToken(TokenError::Revoked))
    }

    async fn gate(&self, action: &str, ctx: &RequestContext) -> Result<(), AuthError> {
        let Some(rule) = self.rate_limits.rule(action) else {
            return Ok(());
        };
        if self.limiter.admit_rule(action, &ctx.client_origin, rule).await {
            Ok(())
        } else {
            Err(AuthError::RateLimited {
                action: action.to_string(),
            })
        }
    }

    /// Mint a pair and store the refresh hash together with `update`.
    /// `None` means a precondition in `update` failed.
    async fn open_session(
        &self,
        subject_id: &str,
        update: CredentialUpdate,
        op: &'static str,
    ) -> Result<Option<AuthSession>, AuthError> {
        let tokens = self.tokens.issue_pair(subject_id)?;
        let update = update.refresh_token(Some(hash_refresh_token(&tokens.refresh_token)));
        let updated = self
            .repo
            .update_fields(subject_id, update)
            .await
            .map_err(|e| repo_failure(op, e))?;
        Ok(updated.map(|record| AuthSession {
            tokens,
            subject: record.summary(),
        }))
    }
}

fn chrono_duration(key: &str, d: std::time::Duration) -> Result<chrono::Duration, ConfigError> {
    chrono::Duration::from_std(d).map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        reason: "out of range".into(),
    })
}
