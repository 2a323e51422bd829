use std::sync::Arc;

use crate::api::error::AppError;
use crate::models::{CatalogView, UploadRecord};
use crate::services::record_store::RecordStore;
use crate::services::storage::StorageService;

/// Groups records as subject -> experiment -> category -> [(filename, url)].
///
/// Keys at every level come out in lexicographic order; entries inside a
/// category keep the order of `records`.
pub fn group(records: &[UploadRecord]) -> CatalogView {
    let mut view = CatalogView::new();
    for record in records {
        view.entry(record.subject.clone())
            .or_default()
            .entry(record.experiment.clone())
            .or_default()
            .entry(record.category.to_string())
            .or_default()
            .push((record.filename.clone(), record.url.clone()));
    }
    view
}

pub struct CatalogService {
    records: Arc<dyn RecordStore>,
    storage: Arc<dyn StorageService>,
}

impl CatalogService {
    pub fn new(records: Arc<dyn RecordStore>, storage: Arc<dyn StorageService>) -> Self {
        Self { records, storage }
    }

    /// Public grouped view, entries in upload order
    pub async fn grouped(&self) -> Result<CatalogView, AppError> {
        let records = self.records.list().await?;
        Ok(group(&records))
    }

    /// Flat admin listing, newest first
    pub async fn listing(&self) -> Result<Vec<UploadRecord>, AppError> {
        let mut records = self.records.list().await?;
        records.reverse();
        Ok(records)
    }

    /// Removes a record and, unless another record still points at the same
    /// bytes, its stored file. File removal failures are only logged.
    pub async fn delete(&self, id: i32) -> Result<UploadRecord, AppError> {
        let record = self
            .records
            .delete(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Upload not found".to_string()))?;

        match self.records.count_by_storage_key(&record.storage_key).await {
            Ok(0) => {
                if let Err(e) = self.storage.delete_file(&record.storage_key).await {
                    tracing::warn!(
                        "⚠️ Failed to remove stored file {} for upload #{}: {}",
                        record.storage_key,
                        record.id,
                        e
                    );
                }
            }
            Ok(n) => tracing::debug!(
                "Keeping {} for {} remaining record(s)",
                record.storage_key,
                n
            ),
            Err(e) => tracing::warn!("Could not count references to {}: {}", record.storage_key, e),
        }

        tracing::info!("🗑️ Deleted upload #{} ({})", record.id, record.filename);
        Ok(record)
    }
}
