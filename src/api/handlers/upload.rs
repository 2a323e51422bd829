use crate::AppState;
use crate::api::error::AppError;
use crate::models::Category;
use crate::services::intake::{Attachment, Submission};
use axum::{
    Json,
    extract::{Multipart, State, multipart::{MultipartError, MultipartRejection}},
    http::StatusCode,
};

use super::types::MessageResponse;

fn multipart_error(e: MultipartError) -> AppError {
    let err_msg = e.body_text();
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(err_msg)
    }
}

/// Reads the upload form into a [`Submission`]
pub async fn read_submission(mut multipart: Multipart) -> Result<Submission, AppError> {
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(category) = Category::from_field(&name) {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.map_err(multipart_error)?;
            submission.attachments.push(Attachment {
                category,
                filename,
                data,
            });
            continue;
        }

        match name.as_str() {
            "subject" => submission.subject = Some(field.text().await.map_err(multipart_error)?),
            "expno" | "experiment" => {
                submission.experiment = Some(field.text().await.map_err(multipart_error)?)
            }
            "batch" => submission.batch = Some(field.text().await.map_err(multipart_error)?),
            other => tracing::debug!("Ignoring unknown form field '{}'", other),
        }
    }

    Ok(submission)
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = String, description = "Multipart form: subject, expno, batch, rubric, output, code", content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Files stored", body = MessageResponse),
        (status = 400, description = "Missing subject/experiment, no attachment or invalid file"),
        (status = 413, description = "Request too large"),
        (status = 429, description = "Too many requests from this client")
    ),
    tag = "uploads"
)]
pub async fn upload_files(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    let submission = read_submission(multipart?).await?;
    let stored = state.intake.submit(submission).await?;

    Ok(Json(MessageResponse {
        message: format!("Uploaded {} file(s) successfully.", stored.len()),
    }))
}
