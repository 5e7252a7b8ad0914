//! # warden_core
//!
//! Credential and session integrity for Warden: password hashing, token
//! issuance, per-origin rate limiting, failed-login lockout, and the session
//! coordinator that ties them to a user repository.

pub mod auth;
pub mod config;
pub mod migrate;
pub mod models;
pub mod rate_limit;
pub mod repo;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
