use crate::AppState;
use crate::api::error::AppError;
use crate::services::session_store::Session;
use crate::utils::auth::session_token_from_headers;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Lets the request through only with a live admin session cookie.
///
/// The validated [`Session`] is placed in the request extensions.
pub async fn admin_session_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || AppError::Forbidden("Unauthorized".to_string());

    let token = session_token_from_headers(req.headers()).ok_or_else(unauthorized)?;

    let session: Session = state
        .sessions
        .validate(&token)
        .await?
        .ok_or_else(unauthorized)?;

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}
