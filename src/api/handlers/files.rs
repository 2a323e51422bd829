use crate::AppState;
use crate::api::error::AppError;
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

#[utoipa::path(
    get,
    path = "/files/{key}",
    params(
        ("key" = String, Path, description = "Storage key of the file")
    ),
    responses(
        (status = 200, description = "File content"),
        (status = 404, description = "File not found")
    ),
    tag = "uploads"
)]
pub async fn download_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let not_found = || AppError::NotFound("File not found".to_string());

    // Invalid keys (e.g. traversal attempts) surface as errors here
    let exists = state.storage.file_exists(&key).await.unwrap_or(false);
    if !exists {
        return Err(not_found());
    }

    let data = state.storage.get_file(&key).await?;

    let content_type = infer::get(&data)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| guess_text_type(&key));
    let filename = key.rsplit('/').next().unwrap_or("download");

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", filename.replace('"', "")),
            ),
            (
                header::HeaderName::from_static("x-content-type-options"),
                "nosniff".to_string(),
            ),
        ],
        Body::from(data),
    )
        .into_response())
}

fn guess_text_type(key: &str) -> String {
    match crate::utils::validation::file_extension(key).as_deref() {
        Some("txt") | Some("py") => mime::TEXT_PLAIN_UTF_8.to_string(),
        Some("ipynb") => mime::APPLICATION_JSON.to_string(),
        _ => mime::APPLICATION_OCTET_STREAM.to_string(),
    }
}
