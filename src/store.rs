use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tracing::{debug, info};

use crate::chart::{Chart, CHART_CONTENT_TYPE, CHART_EXTENSION};
use crate::config::StorageConfig;
use crate::error::{AppError, Result};

/// "Store named object, return addressable path".
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()>;

    fn public_url(&self, path: &str) -> String;
}

/// S3-compatible storage, path-style so it works against MinIO.
pub struct S3Store {
    bucket: Box<Bucket>,
    public_base: String,
}

impl S3Store {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
        };
        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| AppError::Storage(format!("invalid credentials: {}", e)))?;
        let bucket = Bucket::new(&config.bucket, region, credentials)?.with_path_style();

        Ok(Self {
            bucket,
            public_base: format!("{}/{}", config.endpoint.trim_end_matches('/'), config.bucket),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let response = self
            .bucket
            .put_object_with_content_type(path, bytes, content_type)
            .await?;
        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(AppError::Storage(format!("upload of {} returned HTTP {}", path, status)));
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path.trim_start_matches('/'))
    }
}

/// Writes objects below a local directory; used for dry runs.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn local_path(&self, path: &str) -> PathBuf {
        self.root.join(Path::new(path.trim_start_matches('/')))
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn put(&self, path: &str, bytes: &[u8], _content_type: &str) -> Result<()> {
        let target = self.local_path(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        debug!(path = %target.display(), "wrote object");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        let target = self.local_path(path);
        let absolute = std::path::absolute(&target).unwrap_or(target);
        format!("file://{}", absolute.display())
    }
}

/// Month-stamped object path: re-running within a month overwrites the same object.
pub fn chart_object_path(dataset_key: &str, month: NaiveDate) -> String {
    format!(
        "static/{}/plot_{}.{}",
        dataset_key,
        month.format("%Y-%m"),
        CHART_EXTENSION
    )
}

pub struct ReportStore {
    store: Box<dyn ObjectStore>,
}

impl ReportStore {
    pub fn new(store: impl ObjectStore + 'static) -> Self {
        Self { store: Box::new(store) }
    }

    /// Uploads the chart and returns its public URL.
    pub async fn publish_chart(&self, dataset_key: &str, chart: &Chart, today: NaiveDate) -> Result<String> {
        let path = chart_object_path(dataset_key, today);
        self.store.put(&path, chart.as_bytes(), CHART_CONTENT_TYPE).await?;
        let url = self.store.public_url(&path);
        info!(dataset = dataset_key, %url, "published chart");
        Ok(url)
    }
}
