//! Bearer-token verification behind a single `verify -> subject_id` contract.
//!
//! [`AccessTokenVerifier`] checks locally minted access tokens. Any other
//! identity source (for example a federated provider) plugs in as a fallback
//! of a [`VerifierChain`] instead of being folded into [`TokenService`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::token::{TokenError, TokenService};
use crate::models::auth::TokenKind;

/// Resolves a presented bearer token to a subject ID.
#[async_trait]
pub trait SubjectVerifier: Send + Sync {
    async fn verify_subject(&self, token: &str) -> Result<String, TokenError>;

    /// Verifier identifier for logging.
    fn name(&self) -> &str;
}

/// Accepts access tokens minted by [`TokenService`]; refresh tokens are
/// rejected with [`TokenError::WrongKind`].
#[derive(Debug, Clone)]
pub struct AccessTokenVerifier {
    tokens: TokenService,
}

impl AccessTokenVerifier {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl SubjectVerifier for AccessTokenVerifier {
    async fn verify_subject(&self, token: &str) -> Result<String, TokenError> {
        self.tokens.verify(token, TokenKind::Access)
    }

    fn name(&self) -> &str {
        "access-token"
    }
}

/// Primary verifier with an optional fallback.
///
/// The fallback is consulted only when the primary cannot parse the token at
/// all. A token the primary recognises but rejects (expired, wrong kind) is
/// never handed on.
pub struct VerifierChain {
    primary: Arc<dyn SubjectVerifier>,
    fallback: Option<Arc<dyn SubjectVerifier>>,
}

impl VerifierChain {
    pub fn new(primary: Arc<dyn SubjectVerifier>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn SubjectVerifier>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[async_trait]
impl SubjectVerifier for VerifierChain {
    async fn verify_subject(&self, token: &str) -> Result<String, TokenError> {
        match (self.primary.verify_subject(token).await, &self.fallback) {
            (Err(TokenError::Malformed(reason)), Some(fallback)) => {
                fallback.verify_subject(token).await.map_err(|e| {
                    debug!(
                        primary = self.primary.name(),
                        fallback = fallback.name(),
                        error = %e,
                        "fallback verifier rejected token"
                    );
                    TokenError::Malformed(reason)
                })
            }
            (result, _) => result,
        }
    }

    fn name(&self) -> &str {
        "chain"
    }
}
