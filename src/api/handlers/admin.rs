use crate::AppState;
use crate::api::error::AppError;
use crate::utils::auth::{clear_session_cookie, session_cookie, session_token_from_headers};
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{HeaderMap, header},
    response::{AppendHeaders, IntoResponse},
};
use validator::Validate;

use super::types::{LoginRequest, MessageResponse, UploadEntry};

#[utoipa::path(
    post,
    path = "/admin",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful, session cookie set", body = MessageResponse),
        (status = 400, description = "Malformed body"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many requests from this client")
    ),
    tag = "admin"
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload?;
    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    payload.validate().map_err(|_| invalid())?;

    if !state.admin.verify(&payload.username, &payload.password) {
        tracing::warn!("⚠️ Rejected admin login for '{}'", payload.username);
        return Err(invalid());
    }

    let ttl = state.config.session_ttl();
    let session = state.sessions.create(&state.admin.username, ttl).await?;
    tracing::info!("🔓 Admin session opened, expires {}", session.expires_at);

    let cookie = session_cookie(&session.token, ttl.num_seconds(), state.config.cookie_secure);
    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(MessageResponse::new("Login successful")),
    ))
}

#[utoipa::path(
    post,
    path = "/admin/logout",
    responses(
        (status = 200, description = "Session ended", body = MessageResponse),
        (status = 403, description = "No valid session")
    ),
    tag = "admin"
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = session_token_from_headers(&headers) {
        state.sessions.invalidate(&token).await?;
    }
    tracing::info!("🔒 Admin session closed");

    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(state.config.cookie_secure))]),
        Json(MessageResponse::new("Logged out")),
    ))
}

#[utoipa::path(
    get,
    path = "/admin/dashboard",
    responses(
        (status = 200, description = "Every upload, newest first", body = [UploadEntry]),
        (status = 403, description = "No valid session")
    ),
    tag = "admin"
)]
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<Vec<UploadEntry>>, AppError> {
    let records = state.catalog.listing().await?;
    Ok(Json(records.into_iter().map(UploadEntry::from).collect()))
}

#[utoipa::path(
    delete,
    path = "/admin/delete/{id}",
    params(
        ("id" = i32, Path, description = "Upload id")
    ),
    responses(
        (status = 200, description = "Upload deleted", body = MessageResponse),
        (status = 403, description = "No valid session"),
        (status = 404, description = "Upload not found")
    ),
    tag = "admin"
)]
pub async fn delete_upload(
    State(state): State<AppState>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let Path(id) = id?;
    let record = state.catalog.delete(id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Deleted {} successfully.",
        record.filename
    ))))
}
