use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::{prelude::*, uploads};
use crate::models::{NewUpload, UploadRecord};

/// Durable catalog of upload records
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn append(&self, upload: NewUpload) -> Result<UploadRecord>;
    /// All records in ascending id order
    async fn list(&self) -> Result<Vec<UploadRecord>>;
    /// Returns the removed record, or `None` when `id` is unknown
    async fn delete(&self, id: i32) -> Result<Option<UploadRecord>>;
    /// Number of records whose bytes live under `storage_key`
    async fn count_by_storage_key(&self, storage_key: &str) -> Result<u64>;
}

pub struct DbRecordStore {
    db: DatabaseConnection,
}

impl DbRecordStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl TryFrom<uploads::Model> for UploadRecord {
    type Error = anyhow::Error;

    fn try_from(model: uploads::Model) -> Result<Self> {
        let category = model
            .category
            .parse()
            .map_err(|e| anyhow!("Upload {} is corrupt: {}", model.id, e))?;
        Ok(UploadRecord {
            id: model.id,
            batch: model.batch,
            subject: model.subject,
            experiment: model.experiment,
            category,
            filename: model.filename,
            url: model.url,
            storage_key: model.storage_key,
            size: model.size,
            content_type: model.content_type,
            created_at: model.created_at,
        })
    }
}

#[async_trait]
impl RecordStore for DbRecordStore {
    async fn append(&self, upload: NewUpload) -> Result<UploadRecord> {
        let model = uploads::ActiveModel {
            batch: Set(upload.batch),
            subject: Set(upload.subject),
            experiment: Set(upload.experiment),
            category: Set(upload.category.to_string()),
            filename: Set(upload.filename),
            url: Set(upload.url),
            storage_key: Set(upload.storage_key),
            size: Set(upload.size),
            content_type: Set(upload.content_type),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let res = model.insert(&self.db).await?;
        res.try_into()
    }

    async fn list(&self) -> Result<Vec<UploadRecord>> {
        let models = Uploads::find()
            .order_by_asc(uploads::Column::Id)
            .all(&self.db)
            .await?;

        let mut records = Vec::with_capacity(models.len());
        for model in models {
            match UploadRecord::try_from(model) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping record: {}", e),
            }
        }
        Ok(records)
    }

    async fn delete(&self, id: i32) -> Result<Option<UploadRecord>> {
        let Some(model) = Uploads::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let res = Uploads::delete_by_id(id).exec(&self.db).await?;
        if res.rows_affected == 0 {
            // Lost a race with another delete
            return Ok(None);
        }

        UploadRecord::try_from(model).map(Some)
    }

    async fn count_by_storage_key(&self, storage_key: &str) -> Result<u64> {
        let count = Uploads::find()
            .filter(uploads::Column::StorageKey.eq(storage_key))
            .count(&self.db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    async fn store() -> DbRecordStore {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        crate::infrastructure::database::run_migrations(&db)
            .await
            .unwrap();
        DbRecordStore::new(db)
    }

    fn new_upload(subject: &str, key: &str) -> NewUpload {
        NewUpload {
            batch: Some("B1".to_string()),
            subject: subject.to_string(),
            experiment: "Experiment 1".to_string(),
            category: Category::Code,
            filename: "main.py".to_string(),
            url: format!("http://localhost/files/{}", key),
            storage_key: key.to_string(),
            size: 12,
            content_type: None,
        }
    }

    #[tokio::test]
    async fn test_append_list_delete() {
        let store = store().await;
        assert!(store.list().await.unwrap().is_empty());

        let first = store.append(new_upload("Networks", "k1")).await.unwrap();
        let second = store.append(new_upload("Compilers", "k2")).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(first.category, Category::Code);

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);

        assert_eq!(all[0].subject, "Networks");

        let removed = store.delete(first.id).await.unwrap().unwrap();
        assert_eq!(removed.id, first.id);
        assert!(store.delete(first.id).await.unwrap().is_none());
        let left = store.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, second.id);
    }

    #[tokio::test]
    async fn test_count_by_storage_key() {
        let store = store().await;
        store.append(new_upload("A", "shared")).await.unwrap();
        store.append(new_upload("A", "shared")).await.unwrap();
        store.append(new_upload("A", "other")).await.unwrap();
        assert_eq!(store.count_by_storage_key("shared").await.unwrap(), 2);
        assert_eq!(store.count_by_storage_key("missing").await.unwrap(), 0);
    }
}
