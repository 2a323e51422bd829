use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::path::{Component, Path, PathBuf};

use crate::models::Category;

/// Characters escaped inside a single URL path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\');

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Writes `data` under `key`, replacing whatever was there
    async fn upload_file(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()>;
    async fn delete_file(&self, key: &str) -> Result<()>;
    async fn file_exists(&self, key: &str) -> Result<bool>;
    async fn get_file(&self, key: &str) -> Result<Vec<u8>>;
    /// URL a browser can download `key` from
    fn public_url(&self, key: &str) -> String;
    async fn health_check(&self) -> bool;
}

/// Characters escaped when a form value becomes one segment of a storage key.
///
/// `%` itself is escaped, so distinct values always give distinct segments.
const KEY_SEGMENT: &AsciiSet = &CONTROLS
    .add(b'%')
    .add(b'/')
    .add(b'\\')
    .add(b':')
    .add(b'*')
    .add(b'?')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'|')
    .add(b'~');

/// Stands in for a missing batch; a literal `~` is always escaped
const NO_BATCH: &str = "~";

fn key_segment(value: &str) -> String {
    let encoded = utf8_percent_encode(value, KEY_SEGMENT).to_string();
    // `.` and `..` must stay ordinary path components
    match encoded.strip_prefix('.') {
        Some(rest) => format!("%2E{}", rest),
        None => encoded,
    }
}

/// Storage key for an attachment:
/// `{batch}/{subject}/{experiment}/{category}_{filename}`.
///
/// Every segment keeps the exact form value, escaped, so the same metadata
/// always maps to the same key (a re-upload overwrites the earlier bytes)
/// and different metadata never shares one.
pub fn storage_key(
    batch: Option<&str>,
    subject: &str,
    experiment: &str,
    category: Category,
    filename: &str,
) -> String {
    format!(
        "{}/{}/{}/{}_{}",
        batch.map(key_segment).unwrap_or_else(|| NO_BATCH.to_string()),
        key_segment(subject),
        key_segment(experiment),
        category,
        key_segment(filename)
    )
}

/// Percent-encodes each segment of a storage key for use in a URL path
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Files kept on the local disk and served by this server under `/files/`
pub struct LocalStorageService {
    root: PathBuf,
    base_url: String,
}

impl LocalStorageService {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Maps a key onto a path under `root`, refusing anything that could escape it
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if key.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(anyhow!("Invalid storage key: {}", key));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn upload_file(&self, key: &str, data: Bytes, _content_type: Option<&str>) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write then rename so readers never see a half-written file
        let tmp = path.with_extension(format!("{}.part", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn file_exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await? && path.is_file())
    }

    async fn get_file(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::read(&path).await?)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/files/{}", self.base_url, encode_key(key))
    }

    async fn health_check(&self) -> bool {
        tokio::fs::create_dir_all(&self.root).await.is_ok()
    }
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
    public_base: String,
}

impl S3StorageService {
    /// `public_base` is either a public bucket URL or this server's
    /// `/files` proxy
    pub fn new(client: Client, bucket: String, public_base: String) -> Self {
        Self {
            client,
            bucket,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageService {
    async fn upload_file(&self, key: &str, data: Bytes, content_type: Option<&str>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .set_content_type(content_type.map(|s| s.to_string()))
            .body(ByteStream::from(data))
            .send()
            .await?;
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(())
    }

    async fn file_exists(&self, key: &str) -> Result<bool> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow!(service_error))
                }
            }
        }
    }

    async fn get_file(&self, key: &str) -> Result<Vec<u8>> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        let data = res.body.collect().await?.to_vec();
        Ok(data)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, encode_key(key))
    }

    async fn health_check(&self) -> bool {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
    }
}
