use crate::AppState;
use crate::api::error::AppError;
use crate::models::CatalogView;
use axum::{Json, extract::State};

#[utoipa::path(
    get,
    path = "/view",
    responses(
        (status = 200, description = "subject -> experiment -> category -> [[filename, url]]")
    ),
    tag = "uploads"
)]
pub async fn view_catalog(State(state): State<AppState>) -> Result<Json<CatalogView>, AppError> {
    Ok(Json(state.catalog.grouped().await?))
}
