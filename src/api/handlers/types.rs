use crate::models::{Category, UploadRecord};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 128, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, max = 1024, message = "Password is required"))]
    pub password: String,
}

/// Row of the admin dashboard
#[derive(Serialize, ToSchema)]
pub struct UploadEntry {
    pub id: i32,
    pub batch: Option<String>,
    pub subject: String,
    pub experiment: String,
    pub category: Category,
    pub filename: String,
    pub url: String,
}

impl From<UploadRecord> for UploadEntry {
    fn from(record: UploadRecord) -> Self {
        Self {
            id: record.id,
            batch: record.batch,
            subject: record.subject,
            experiment: record.experiment,
            category: record.category,
            filename: record.filename,
            url: record.url,
        }
    }
}
