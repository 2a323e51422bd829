use crate::config::{AppConfig, StorageBackend};
use crate::services::storage::{LocalStorageService, S3StorageService, StorageService};
use anyhow::anyhow;
use aws_sdk_s3::config::Region;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &AppConfig) -> anyhow::Result<Arc<dyn StorageService>> {
    match config.storage_backend {
        StorageBackend::Local => {
            info!("💾 Local Storage: {}", config.upload_dir);
            tokio::fs::create_dir_all(&config.upload_dir).await?;
            Ok(Arc::new(LocalStorageService::new(
                &config.upload_dir,
                &config.public_base_url,
            )))
        }
        StorageBackend::S3 => setup_s3(config).await,
    }
}

async fn setup_s3(config: &AppConfig) -> anyhow::Result<Arc<dyn StorageService>> {
    let s3 = &config.s3;
    let endpoint_url = s3
        .endpoint
        .clone()
        .ok_or_else(|| anyhow!("S3_ENDPOINT must be set for the s3 storage backend"))?;
    let access_key = s3
        .access_key
        .clone()
        .ok_or_else(|| anyhow!("S3_ACCESS_KEY must be set for the s3 storage backend"))?;
    let secret_key = s3
        .secret_key
        .clone()
        .ok_or_else(|| anyhow!("S3_SECRET_KEY must be set for the s3 storage backend"))?;
    let bucket = s3.bucket.clone();

    info!("☁️  S3 Storage: {} (Bucket: {})", endpoint_url, bucket);

    let aws_config = aws_config::from_env()
        .endpoint_url(&endpoint_url)
        .region(Region::new("us-east-1"))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Ensure bucket exists
    match s3_client.head_bucket().bucket(&bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", bucket);
            if let Err(e) = s3_client.create_bucket().bucket(&bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", bucket, e);
            } else {
                info!("✅ Bucket '{}' created successfully", bucket);
            }
        }
    }

    // Without a public bucket URL downloads are proxied through /files
    let public_base = s3
        .public_url
        .clone()
        .unwrap_or_else(|| format!("{}/files", config.public_base_url));

    Ok(Arc::new(S3StorageService::new(s3_client, bucket, public_base)))
}
