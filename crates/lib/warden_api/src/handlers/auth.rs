//! Authentication request handlers.

use axum::http::StatusCode;
use axum::{Extension, Json, extract::State};
use warden_core::auth::session::RequestContext;
use warden_core::models::auth::SubjectSummary;

use crate::AppState;
use crate::error::AppResult;
use crate::extract::{ClientOrigin, JsonBody};
use crate::middleware::auth::AuthenticatedSubject;
use crate::models::{LoginRequest, LogoutResponse, RefreshRequest, RegisterRequest, SessionResponse};

/// `POST /api/auth/register`: create an account and open its first session.
pub async fn register_handler(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> AppResult<(StatusCode, Json<SessionResponse>)> {
    let session = state
        .coordinator
        .register(
            &RequestContext::new(origin),
            &body.email,
            &body.password,
            &body.profile_name,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(session.into())))
}

/// `POST /api/auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    JsonBody(body): JsonBody<LoginRequest>,
) -> AppResult<Json<SessionResponse>> {
    let session = state
        .coordinator
        .login(&RequestContext::new(origin), &body.email, &body.password)
        .await?;
    Ok(Json(session.into()))
}

/// `POST /api/auth/refresh`: exchange a refresh token for a new pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    JsonBody(body): JsonBody<RefreshRequest>,
) -> AppResult<Json<SessionResponse>> {
    let session = state
        .coordinator
        .refresh(&RequestContext::new(origin), &body.refresh_token)
        .await?;
    Ok(Json(session.into()))
}

/// `POST /api/auth/logout`: drop the caller's refresh token. Requires
/// authentication.
pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedSubject(subject_id)): Extension<AuthenticatedSubject>,
) -> AppResult<Json<LogoutResponse>> {
    state.coordinator.logout(&subject_id).await?;
    Ok(Json(LogoutResponse { success: true }))
}

/// `GET /api/auth/me`: profile of the authenticated subject.
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedSubject(subject_id)): Extension<AuthenticatedSubject>,
) -> AppResult<Json<SubjectSummary>> {
    Ok(Json(state.coordinator.subject(&subject_id).await?))
}
