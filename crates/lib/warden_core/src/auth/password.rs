//! Password hashing via bcrypt.

use super::AuthError;
use crate::config::ConfigError;

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Lowest cost bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;

/// Highest cost bcrypt accepts.
pub const MAX_BCRYPT_COST: u32 = 31;

/// One-way salted hashing of credential secrets.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    /// Create a hasher with the given bcrypt cost.
    pub fn new(cost: u32) -> Result<Self, ConfigError> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST".into(),
                reason: format!("must be between {MIN_BCRYPT_COST} and {MAX_BCRYPT_COST}"),
            });
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a secret. Every call uses a fresh salt.
    pub fn hash(&self, secret: &str) -> Result<String, AuthError> {
        bcrypt::hash(secret, self.cost)
            .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
    }

    /// Verify a secret against a stored hash.
    ///
    /// A mismatch is `Ok(false)`. An unparseable hash means the stored record
    /// is corrupt and is reported as [`AuthError::CorruptCredential`].
    pub fn verify(&self, secret: &str, hash: &str) -> Result<bool, AuthError> {
        bcrypt::verify(secret, hash)
            .map_err(|e| AuthError::CorruptCredential(format!("bcrypt verify: {e}")))
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            cost: DEFAULT_BCRYPT_COST,
        }
    }
}
