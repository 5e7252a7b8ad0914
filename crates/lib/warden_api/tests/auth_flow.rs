//! Integration tests: build the router over in-memory stores and drive the
//! auth endpoints with `oneshot`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;
use warden_api::config::ApiConfig;
use warden_api::{AppState, router};
use warden_core::auth::TokenError;
use warden_core::auth::verifier::SubjectVerifier;
use warden_core::config::AuthConfig;
use warden_core::rate_limit::{ACTION_LOGIN, InMemoryCounterStore, RateLimitRule};
use warden_core::repo::InMemoryUserRepository;

const PASSWORD: &str = "Str0ng!Pw";

fn auth_config() -> AuthConfig {
    let mut auth = AuthConfig::with_secret("integration-secret");
    auth.bcrypt_cost = 4;
    auth
}

fn state_with(auth: AuthConfig) -> AppState {
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        auth,
    };
    AppState::new(
        config,
        Arc::new(InMemoryUserRepository::new()),
        Some(Arc::new(InMemoryCounterStore::new())),
    )
    .expect("app state")
}

fn app() -> Router {
    router(state_with(auth_config()))
}

struct Call<'a> {
    method: &'a str,
    uri: &'a str,
    body: Option<Value>,
    bearer: Option<&'a str>,
    origin: &'a str,
}

impl<'a> Call<'a> {
    fn post(uri: &'a str, body: Value) -> Self {
        Self {
            method: "POST",
            uri,
            body: Some(body),
            bearer: None,
            origin: "203.0.113.7",
        }
    }

    fn get(uri: &'a str) -> Self {
        Self {
            method: "GET",
            uri,
            body: None,
            bearer: None,
            origin: "203.0.113.7",
        }
    }

    fn bearer(mut self, token: &'a str) -> Self {
        self.bearer = Some(token);
        self
    }

    fn origin(mut self, origin: &'a str) -> Self {
        self.origin = origin;
        self
    }

    async fn send(self, app: &Router) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(self.method)
            .uri(self.uri)
            .header("x-forwarded-for", self.origin);
        if let Some(token) = self.bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match self.body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let resp = app.clone().oneshot(request).await.expect("response");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse JSON")
        };
        (status, json)
    }
}

async fn register(app: &Router, email: &str) -> Value {
    let (status, body) = Call::post(
        "/api/auth/register",
        json!({ "email": email, "password": PASSWORD, "profileName": "Alice" }),
    )
    .send(app)
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    Call::post("/api/auth/login", json!({ "email": email, "password": password }))
        .send(app)
        .await
}

fn str_field<'v>(body: &'v Value, field: &str) -> &'v str {
    body[field].as_str().unwrap_or_else(|| panic!("missing {field} in {body}"))
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = Call::get("/api/health").send(&app()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn register_returns_tokens_and_public_profile() {
    let app = app();
    let body = register(&app, "Alice@X.com").await;

    assert!(body["accessToken"].is_string());
    assert!(body["refreshToken"].is_string());
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["expiresIn"], 900);
    assert_eq!(body["subject"]["email"], "alice@x.com");
    assert_eq!(body["subject"]["profileName"], "Alice");
    assert!(body["subject"].get("passwordHash").is_none());
    assert!(!body.to_string().contains("$2"));
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = app();
    register(&app, "alice@x.com").await;
    let (status, body) = Call::post(
        "/api/auth/register",
        json!({ "email": "ALICE@x.com", "password": PASSWORD, "profileName": "Other" }),
    )
    .send(&app)
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "duplicate_email");
}

#[tokio::test]
async fn weak_password_is_a_validation_error() {
    let (status, body) = Call::post(
        "/api/auth/register",
        json!({ "email": "alice@x.com", "password": "password", "profileName": "Alice" }),
    )
    .send(&app())
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn unreadable_bodies_get_the_error_envelope() {
    let app = app();
    let (status, body) = Call::post("/api/auth/login", json!({ "email": "alice@x.com" }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/refresh")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let resp = app.oneshot(request).await.expect("response");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body: Value = serde_json::from_slice(&bytes).expect("parse JSON");
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn login_success_and_enumeration_safe_failures() {
    let app = app();
    register(&app, "alice@x.com").await;

    let (status, body) = login(&app, "alice@x.com", PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["subject"]["lastLogin"].is_string());

    let (wrong_status, wrong_body) = login(&app, "alice@x.com", "Wr0ng!Pw").await;
    let (unknown_status, unknown_body) = login(&app, "ghost@x.com", PASSWORD).await;
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, unknown_body);
    assert_eq!(wrong_body["kind"], "invalid_credentials");
}

#[tokio::test]
async fn sixth_attempt_after_five_failures_is_locked() {
    let app = app();
    register(&app, "alice@x.com").await;

    for _ in 0..5 {
        let (status, body) = login(&app, "alice@x.com", "Wr0ng!Pw").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["kind"], "invalid_credentials");
    }
    let (status, body) = login(&app, "alice@x.com", PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "account_locked");
}

#[tokio::test]
async fn refresh_rotates_tokens() {
    let app = app();
    let registered = register(&app, "alice@x.com").await;
    let first = str_field(&registered, "refreshToken");

    let (status, rotated) = Call::post("/api/auth/refresh", json!({ "refreshToken": first }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(str_field(&rotated, "refreshToken"), first);

    let (status, body) = Call::post("/api/auth/refresh", json!({ "refreshToken": first }))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "invalid_token");
}

#[tokio::test]
async fn access_token_cannot_refresh() {
    let app = app();
    let registered = register(&app, "alice@x.com").await;
    let (status, _) = Call::post(
        "/api/auth/refresh",
        json!({ "refreshToken": str_field(&registered, "accessToken") }),
    )
    .send(&app)
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_requires_an_access_token() {
    let app = app();
    let registered = register(&app, "alice@x.com").await;

    let (status, body) = Call::get("/api/auth/me")
        .bearer(str_field(&registered, "accessToken"))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, registered["subject"]);

    let (status, body) = Call::get("/api/auth/me").send(&app).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "invalid_token");

    let (status, _) = Call::get("/api/auth/me")
        .bearer(str_field(&registered, "refreshToken"))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_refresh_and_is_idempotent() {
    let app = app();
    let registered = register(&app, "alice@x.com").await;
    let access = str_field(&registered, "accessToken");

    for _ in 0..2 {
        let (status, body) = Call::post("/api/auth/logout", json!({}))
            .bearer(access)
            .send(&app)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    let (status, _) = Call::post(
        "/api/auth/refresh",
        json!({ "refreshToken": str_field(&registered, "refreshToken") }),
    )
    .send(&app)
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = Call::post("/api/auth/logout", json!({})).send(&app).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_is_rate_limited_per_origin() {
    let mut auth = auth_config();
    auth.rate_limits = auth
        .rate_limits
        .with_rule(ACTION_LOGIN, RateLimitRule::new(3, Duration::from_secs(60)));
    let app = router(state_with(auth));
    register(&app, "alice@x.com").await;

    for _ in 0..3 {
        let (status, _) = login(&app, "alice@x.com", PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = login(&app, "alice@x.com", PASSWORD).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["kind"], "rate_limited");

    let (status, _) = Call::post("/api/auth/login", json!({ "email": "alice@x.com", "password": PASSWORD }))
        .origin("198.51.100.1")
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_counter_store_fails_open() {
    let mut auth = auth_config();
    auth.rate_limits = auth
        .rate_limits
        .with_rule(ACTION_LOGIN, RateLimitRule::new(1, Duration::from_secs(60)));
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".into(),
        auth,
    };
    let state = AppState::new(config, Arc::new(InMemoryUserRepository::new()), None).expect("app state");
    let app = router(state);
    register(&app, "alice@x.com").await;

    for _ in 0..3 {
        let (status, _) = login(&app, "alice@x.com", PASSWORD).await;
        assert_eq!(status, StatusCode::OK);
    }
}

/// Accepts one opaque token and maps it to a fixed subject.
struct StaticVerifier {
    token: &'static str,
    subject_id: String,
}

#[async_trait]
impl SubjectVerifier for StaticVerifier {
    async fn verify_subject(&self, token: &str) -> Result<String, TokenError> {
        if token == self.token {
            Ok(self.subject_id.clone())
        } else {
            Err(TokenError::Malformed("unknown federated token".into()))
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[tokio::test]
async fn fallback_verifier_authenticates_foreign_tokens() {
    let state = state_with(auth_config());
    let seed = router(state.clone());
    let registered = register(&seed, "alice@x.com").await;
    let subject_id = str_field(&registered["subject"], "id").to_string();

    let app = router(state.with_fallback_verifier(Arc::new(StaticVerifier {
        token: "federated-token",
        subject_id,
    })));

    let (status, body) = Call::get("/api/auth/me").bearer("federated-token").send(&app).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "alice@x.com");

    let (status, _) = Call::get("/api/auth/me")
        .bearer(str_field(&registered, "accessToken"))
        .send(&app)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = Call::get("/api/auth/me").bearer("something-else").send(&app).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
