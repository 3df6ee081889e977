use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, warn};

use crate::api::models::{DatasetHit, DatasetRecord, LiteratureSearchResponse, SearchResponse};
use crate::error::{AppError, Result};
use crate::scraper::{fetch_json_with_retry, RetryPolicy};

/// Read-only view of the dataset registry.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// First `limit` datasets matching the filters. An API that answers with an
    /// error status yields an empty list.
    async fn search(&self, country: &str, subtype: &str, limit: usize) -> Result<Vec<DatasetHit>>;

    async fn dataset(&self, key: &str) -> Result<DatasetRecord>;

    /// Number of papers citing the dataset.
    async fn citation_count(&self, key: &str) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct GbifClient {
    base_url: String,
    retry: RetryPolicy,
}

impl GbifClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn search_url(&self, country: &str, subtype: &str, limit: usize) -> Result<Url> {
        let limit = limit.to_string();
        self.endpoint(
            "dataset/search",
            &[("publishingCountry", country), ("subtype", subtype), ("limit", limit.as_str())],
        )
    }

    fn dataset_url(&self, key: &str) -> String {
        format!("{}/dataset/{}", self.base_url, key)
    }

    fn citations_url(&self, key: &str) -> Result<Url> {
        self.endpoint("literature/search", &[("gbifDatasetKey", key), ("limit", "1")])
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let base = format!("{}/{}", self.base_url, path);
        Url::parse_with_params(&base, query)
            .map_err(|e| AppError::Config(format!("Invalid GBIF API URL {}: {}", base, e)))
    }
}

#[async_trait]
impl DatasetSource for GbifClient {
    async fn search(&self, country: &str, subtype: &str, limit: usize) -> Result<Vec<DatasetHit>> {
        let url = self.search_url(country, subtype, limit)?;
        debug!(%url, "searching datasets");
        match fetch_json_with_retry::<SearchResponse>(url.as_str(), &self.retry).await {
            Ok(response) => Ok(response.results.into_iter().take(limit).collect()),
            Err(AppError::UnexpectedStatus { status, .. }) => {
                warn!(%url, status, "dataset search failed, nothing to report");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn dataset(&self, key: &str) -> Result<DatasetRecord> {
        fetch_json_with_retry(&self.dataset_url(key), &self.retry).await
    }

    async fn citation_count(&self, key: &str) -> Result<u64> {
        let response: LiteratureSearchResponse =
            fetch_json_with_retry(self.citations_url(key)?.as_str(), &self.retry).await?;
        Ok(response.count)
    }
}
