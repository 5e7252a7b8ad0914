//! # warden_api
//!
//! HTTP API library for Warden.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use warden_core::auth::session::SessionCoordinator;
use warden_core::auth::verifier::{AccessTokenVerifier, SubjectVerifier, VerifierChain};
use warden_core::config::ConfigError;
use warden_core::rate_limit::CounterStore;
use warden_core::repo::UserRepository;

use crate::config::ApiConfig;
use crate::handlers::{auth, health};

/// Route paths.
pub mod routes {
    pub const GET_API_HEALTH: &str = "/api/health";
    pub const POST_AUTH_REGISTER: &str = "/api/auth/register";
    pub const POST_AUTH_LOGIN: &str = "/api/auth/login";
    pub const POST_AUTH_REFRESH: &str = "/api/auth/refresh";
    pub const POST_AUTH_LOGOUT: &str = "/api/auth/logout";
    pub const GET_AUTH_ME: &str = "/api/auth/me";
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<SessionCoordinator>,
    /// Resolves bearer tokens on protected routes.
    pub verifier: Arc<dyn SubjectVerifier>,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Wire the session coordinator and the access-token verifier over the
    /// given stores. `counters: None` disables rate limiting (fail-open).
    pub fn new(
        config: ApiConfig,
        repo: Arc<dyn UserRepository>,
        counters: Option<Arc<dyn CounterStore>>,
    ) -> Result<Self, ConfigError> {
        let coordinator = SessionCoordinator::new(&config.auth, repo, counters)?;
        let verifier = Arc::new(VerifierChain::new(Self::access_verifier(&coordinator)));
        Ok(Self {
            coordinator: Arc::new(coordinator),
            verifier,
            config,
        })
    }

    /// Consult `fallback` for bearer tokens that are not locally minted
    /// access tokens.
    pub fn with_fallback_verifier(mut self, fallback: Arc<dyn SubjectVerifier>) -> Self {
        self.verifier = Arc::new(
            VerifierChain::new(Self::access_verifier(&self.coordinator)).with_fallback(fallback),
        );
        self
    }

    fn access_verifier(coordinator: &SessionCoordinator) -> Arc<dyn SubjectVerifier> {
        Arc::new(AccessTokenVerifier::new(coordinator.tokens().clone()))
    }
}

/// Run embedded database migrations.
///
/// Delegates to `warden_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    warden_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_API_HEALTH, get(health::health_handler))
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler));

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler))
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
