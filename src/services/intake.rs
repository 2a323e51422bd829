use bytes::Bytes;
use std::sync::Arc;

use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::models::{Category, NewUpload, UploadRecord};
use crate::services::record_store::RecordStore;
use crate::services::storage::{StorageService, storage_key};
use crate::utils::validation::{
    ValidationError, sanitize_filename, validate_content, validate_extension, validate_file_size,
};

/// One file part of an upload form
#[derive(Debug, Clone)]
pub struct Attachment {
    pub category: Category,
    pub filename: String,
    pub data: Bytes,
}

/// Raw upload form, before validation
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub subject: Option<String>,
    pub experiment: Option<String>,
    pub batch: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Attachment that passed every check and is ready to store
struct Accepted {
    category: Category,
    filename: String,
    data: Bytes,
    content_type: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct IntakeService {
    records: Arc<dyn RecordStore>,
    storage: Arc<dyn StorageService>,
    config: AppConfig,
}

impl IntakeService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn StorageService>,
        config: AppConfig,
    ) -> Self {
        Self {
            records,
            storage,
            config,
        }
    }

    fn check(&self, attachment: Attachment) -> Result<Accepted, ValidationError> {
        let filename = sanitize_filename(&attachment.filename)?;
        let ext = validate_extension(&filename, &self.config.allowed_extensions)?;
        validate_file_size(&filename, attachment.data.len(), self.config.max_file_size)?;
        let content_type =
            validate_content(&filename, &ext, &attachment.data, self.config.screen_images)?;

        Ok(Accepted {
            category: attachment.category,
            filename,
            data: attachment.data,
            content_type,
        })
    }

    /// Validates a submission, stores each attachment and appends one
    /// catalog record per stored file.
    ///
    /// Every attachment is checked before anything is written. A storage
    /// failure midway leaves the files already stored in the catalog.
    pub async fn submit(&self, submission: Submission) -> Result<Vec<UploadRecord>, AppError> {
        let (Some(subject), Some(experiment)) = (
            non_blank(submission.subject),
            non_blank(submission.experiment),
        ) else {
            return Err(AppError::BadRequest(
                "Subject and Experiment are required.".to_string(),
            ));
        };
        let batch = non_blank(submission.batch);

        let mut accepted: Vec<Accepted> = Vec::new();
        for attachment in submission.attachments {
            if attachment.filename.trim().is_empty() || attachment.data.is_empty() {
                continue;
            }
            if accepted.iter().any(|a| a.category == attachment.category) {
                tracing::warn!(
                    "Ignoring duplicate '{}' attachment {}",
                    attachment.category,
                    attachment.filename
                );
                continue;
            }
            accepted.push(self.check(attachment)?);
        }

        if accepted.is_empty() {
            return Err(AppError::BadRequest("No valid files uploaded.".to_string()));
        }

        let mut stored = Vec::with_capacity(accepted.len());
        for file in accepted {
            let key = storage_key(
                batch.as_deref(),
                &subject,
                &experiment,
                file.category,
                &file.filename,
            );
            let size = file.data.len() as i64;

            self.storage
                .upload_file(&key, file.data, file.content_type.as_deref())
                .await
                .map_err(|e| {
                    AppError::Internal(format!("Failed to store {}: {}", file.filename, e))
                })?;

            let record = self
                .records
                .append(NewUpload {
                    batch: batch.clone(),
                    subject: subject.clone(),
                    experiment: experiment.clone(),
                    category: file.category,
                    url: self.storage.public_url(&key),
                    filename: file.filename,
                    storage_key: key,
                    size,
                    content_type: file.content_type,
                })
                .await?;

            tracing::info!(
                "📥 Stored upload #{} {} ({} bytes) for {} / {}",
                record.id,
                record.storage_key,
                size,
                subject,
                experiment
            );
            stored.push(record);
        }

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::record_store::DbRecordStore;
    use crate::services::storage::LocalStorageService;

    struct Fixture {
        service: IntakeService,
        records: Arc<dyn RecordStore>,
        storage: Arc<dyn StorageService>,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        crate::infrastructure::database::run_migrations(&db)
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let records: Arc<dyn RecordStore> = Arc::new(DbRecordStore::new(db));
        let storage: Arc<dyn StorageService> =
            Arc::new(LocalStorageService::new(dir.path(), "http://localhost:5000"));
        let config = AppConfig {
            screen_images: false,
            ..AppConfig::default()
        };
        Fixture {
            service: IntakeService::new(records.clone(), storage.clone(), config),
            records,
            storage,
            _dir: dir,
        }
    }

    fn attachment(category: Category, filename: &str, data: &'static [u8]) -> Attachment {
        Attachment {
            category,
            filename: filename.to_string(),
            data: Bytes::from_static(data),
        }
    }

    fn submission(attachments: Vec<Attachment>) -> Submission {
        Submission {
            subject: Some("Blockchain".to_string()),
            experiment: Some("Experiment 3".to_string()),
            batch: Some("B2".to_string()),
            attachments,
        }
    }

    #[tokio::test]
    async fn test_stores_each_attachment() {
        let fx = fixture().await;
        let stored = fx
            .service
            .submit(submission(vec![
                attachment(Category::Code, "main.py", b"print('chain')"),
                attachment(Category::Rubric, "writeup.pdf", b"%PDF-1.4 body"),
            ]))
            .await
            .unwrap();

        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].category, Category::Code);
        assert_eq!(stored[0].storage_key, "B2/Blockchain/Experiment 3/code_main.py");
        assert!(fx.storage.file_exists(&stored[0].storage_key).await.unwrap());
        assert_eq!(fx.records.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_requires_subject_and_experiment() {
        let fx = fixture().await;
        let mut sub = submission(vec![attachment(Category::Code, "a.py", b"x = 1")]);
        sub.subject = Some("   ".to_string());
        let err = fx.service.submit(sub).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("required")));

        let mut sub = submission(vec![attachment(Category::Code, "a.py", b"x = 1")]);
        sub.experiment = None;
        assert!(fx.service.submit(sub).await.is_err());
        assert!(fx.records.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_requires_an_attachment() {
        let fx = fixture().await;
        let err = fx.service.submit(submission(vec![])).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        // empty parts count as not attached
        let err = fx
            .service
            .submit(submission(vec![attachment(Category::Output, "", b"")]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert!(fx.records.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_bad_file_stores_nothing() {
        let fx = fixture().await;
        let err = fx
            .service
            .submit(submission(vec![
                attachment(Category::Code, "main.py", b"print(1)"),
                attachment(Category::Rubric, "report.pdf", b"not a pdf"),
            ]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("report.pdf")));
        assert!(fx.records.list().await.unwrap().is_empty());
        assert!(
            !fx.storage
                .file_exists("B2/Blockchain/Experiment 3/code_main.py")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_rejects_disallowed_extension() {
        let fx = fixture().await;
        let err = fx
            .service
            .submit(submission(vec![attachment(Category::Code, "run.sh", b"rm -rf /")]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "Unsupported file type: run.sh"));
    }

    #[tokio::test]
    async fn test_blank_batch_is_absent() {
        let fx = fixture().await;
        let mut sub = submission(vec![attachment(Category::Code, "a.txt", b"notes")]);
        sub.batch = Some(" ".to_string());
        let stored = fx.service.submit(sub).await.unwrap();
        assert_eq!(stored[0].batch, None);
        assert!(stored[0].storage_key.starts_with("~/"));
    }

    #[tokio::test]
    async fn test_duplicate_category_keeps_first() {
        let fx = fixture().await;
        let stored = fx
            .service
            .submit(submission(vec![
                attachment(Category::Code, "first.py", b"1"),
                attachment(Category::Code, "second.py", b"2"),
            ]))
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].filename, "first.py");
    }
}
