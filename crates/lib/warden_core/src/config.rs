//! Runtime configuration for the credential core.
//!
//! Everything is read from environment variables through an injectable lookup
//! so tests never touch the process environment.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::auth::password::{DEFAULT_BCRYPT_COST, PasswordHasher};
use crate::auth::token::{ACCESS_TOKEN_TTL_SECS, MAX_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS, resolve_jwt_secret};
use crate::rate_limit::{ACTION_LOGIN, ACTION_REFRESH, ACTION_REGISTER, RateLimitRule};

/// Failed logins that lock an account.
pub const DEFAULT_LOCKOUT_THRESHOLD: u32 = 5;

/// How long failed logins against unknown emails are remembered.
pub const UNKNOWN_EMAIL_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Per-action rate-limit rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitTable {
    rules: BTreeMap<String, RateLimitRule>,
}

impl RateLimitTable {
    /// An empty table. Actions without a rule are not limited.
    pub fn new() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    pub fn with_rule(mut self, action: &str, rule: RateLimitRule) -> Self {
        self.rules.insert(action.to_string(), rule);
        self
    }

    pub fn rule(&self, action: &str) -> Option<RateLimitRule> {
        self.rules.get(action).copied()
    }

    /// Overlay rules from `action=limit/window_secs,...` onto this table.
    pub fn parse_overrides(mut self, raw: &str) -> Result<Self, ConfigError> {
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let bad = || ConfigError::invalid("RATE_LIMITS", format!("expected action=limit/window_secs, got `{entry}`"));
            let (action, rule) = entry.split_once('=').ok_or_else(bad)?;
            let (limit, window) = rule.split_once('/').ok_or_else(bad)?;
            let limit: u64 = limit.trim().parse().map_err(|_| bad())?;
            let window: u64 = window.trim().parse().map_err(|_| bad())?;
            if window == 0 {
                return Err(ConfigError::invalid("RATE_LIMITS", format!("zero window for `{}`", action.trim())));
            }
            self.rules.insert(
                action.trim().to_string(),
                RateLimitRule::new(limit, Duration::from_secs(window)),
            );
        }
        Ok(self)
    }
}

impl Default for RateLimitTable {
    fn default() -> Self {
        Self::new()
            .with_rule(ACTION_REGISTER, RateLimitRule::new(5, Duration::from_secs(60 * 60)))
            .with_rule(ACTION_LOGIN, RateLimitRule::new(10, Duration::from_secs(60)))
            .with_rule(ACTION_REFRESH, RateLimitRule::new(30, Duration::from_secs(60)))
    }
}

/// Credential core configuration.
#[derive(Clone)]
pub struct AuthConfig {
    pub bcrypt_cost: u32,
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub lockout_threshold: u32,
    pub unknown_email_window: Duration,
    pub rate_limits: RateLimitTable,
}

impl AuthConfig {
    /// Defaults with the given signing secret.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            jwt_secret: jwt_secret.into(),
            access_token_ttl: Duration::from_secs(ACCESS_TOKEN_TTL_SECS as u64),
            refresh_token_ttl: Duration::from_secs(REFRESH_TOKEN_TTL_SECS as u64),
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            unknown_email_window: UNKNOWN_EMAIL_WINDOW,
            rate_limits: RateLimitTable::default(),
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for variable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::with_secret(resolve_jwt_secret(&lookup));

        if let Some(cost) = parse_var::<u32>(&lookup, "BCRYPT_COST")? {
            config.bcrypt_cost = PasswordHasher::new(cost)?.cost();
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ACCESS_TOKEN_TTL_SECS")? {
            config.access_token_ttl = positive_secs("ACCESS_TOKEN_TTL_SECS", secs)?;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "REFRESH_TOKEN_TTL_SECS")? {
            config.refresh_token_ttl = positive_secs("REFRESH_TOKEN_TTL_SECS", secs)?;
        }
        if let Some(threshold) = parse_var::<u32>(&lookup, "LOCKOUT_THRESHOLD")? {
            if threshold == 0 {
                return Err(ConfigError::invalid("LOCKOUT_THRESHOLD", "must be at least 1"));
            }
            config.lockout_threshold = threshold;
        }
        if let Some(raw) = lookup("RATE_LIMITS") {
            config.rate_limits = config.rate_limits.parse_overrides(&raw)?;
        }
        Ok(config)
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("jwt_secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("lockout_threshold", &self.lockout_threshold)
            .field("unknown_email_window", &self.unknown_email_window)
            .field("rate_limits", &self.rate_limits)
            .finish()
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::invalid(key, format!("cannot parse `{raw}`"))),
    }
}

fn positive_secs(key: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::invalid(key, "must be greater than zero"));
    }
    if secs > MAX_TOKEN_TTL_SECS {
        return Err(ConfigError::invalid(key, format!("must be at most {MAX_TOKEN_TTL_SECS}")));
    }
    Ok(Duration::from_secs(secs))
}
