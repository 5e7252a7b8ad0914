//! API server configuration.

use warden_core::config::{AuthConfig, ConfigError};

/// Default listener address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3100";

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// Credential core settings.
    pub auth: AuthConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                     | Default                          |
    /// |------------------------------|----------------------------------|
    /// | `BIND_ADDR`                  | `127.0.0.1:3100`                 |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file    |
    /// | `BCRYPT_COST`                | `10`                             |
    /// | `ACCESS_TOKEN_TTL_SECS`      | `900`                            |
    /// | `REFRESH_TOKEN_TTL_SECS`     | `2592000`                        |
    /// | `LOCKOUT_THRESHOLD`          | `5`                              |
    /// | `RATE_LIMITS`                | `register=5/3600,login=10/60,refresh=30/60` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into()),
            auth: AuthConfig::from_lookup(lookup)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_defaults() {
        let config = ApiConfig::from_lookup(|key| (key == "JWT_SECRET").then(|| "s".to_string())).unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(config.auth.jwt_secret, "s");
    }

    #[test]
    fn bind_addr_override() {
        let config = ApiConfig::from_lookup(|key| match key {
            "JWT_SECRET" => Some("s".into()),
            "BIND_ADDR" => Some("0.0.0.0:8080".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
    }
}
