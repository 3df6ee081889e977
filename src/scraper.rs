use reqwest::{Client, ClientBuilder, StatusCode};
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use std::time::Duration;
use once_cell::sync::Lazy;
use tracing::{debug, warn};
use crate::error::{AppError, Result};

// Create a static client to reuse connections
static CLIENT: Lazy<Client> = Lazy::new(|| {
    ClientBuilder::new()
        .user_agent(concat!("curator-digest/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(10)
        .build()
        .unwrap_or_else(|_| Client::new())
});

static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script").expect("Failed to parse script selector")
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        Duration::from_millis(self.base_backoff_ms.saturating_mul(attempt as u64))
    }
}

pub async fn fetch_html(url: &str) -> Result<String> {
    let response = CLIENT.get(url).send().await?;
    let response = check_status(url, response)?;
    let html = response.text().await?;
    Ok(html)
}

pub async fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    let response = CLIENT.get(url).send().await?;
    let response = check_status(url, response)?;
    Ok(response.bytes().await?.to_vec())
}

/// GETs `url` and decodes the JSON body, retrying transport failures, 429 and 5xx.
pub async fn fetch_json_with_retry<T: DeserializeOwned>(url: &str, policy: &RetryPolicy) -> Result<T> {
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let outcome = CLIENT.get(url).send().await;
        let retryable = match outcome {
            Ok(response) if response.status().is_success() => {
                return response.json::<T>().await.map_err(|e| response_error(url, e));
            }
            Ok(response) => {
                let status = response.status();
                if !is_retryable(status) || attempt >= policy.max_attempts {
                    return Err(AppError::UnexpectedStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                format!("HTTP {}", status)
            }
            Err(e) => {
                if attempt >= policy.max_attempts {
                    return Err(e.into());
                }
                e.to_string()
            }
        };

        let delay = policy.delay_for_attempt(attempt);
        warn!(url, attempt, error = %retryable, ?delay, "request failed, retrying");
        tokio::time::sleep(delay).await;
    }
}

// A body that is not the expected JSON is a contract change, not a transport failure.
fn response_error(url: &str, err: reqwest::Error) -> AppError {
    if err.is_decode() {
        AppError::Decode {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        err.into()
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    debug!(url, status = status.as_u16(), "unexpected status");
    Err(AppError::UnexpectedStatus {
        url: url.to_string(),
        status: status.as_u16(),
    })
}

/// Text content of every `<script>` element, in document order.
pub fn script_bodies(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);

    document.select(&SCRIPT_SELECTOR)
        .map(|element| element.text().collect::<String>())
        .filter(|body| !body.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1500));
    }

    #[test]
    fn retries_only_throttling_and_server_errors() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn collects_script_bodies_in_order() {
        let html = r#"<html><head><script src="a.js"></script>
            <script>var first = 1;</script></head>
            <body><p>text</p><script>var second = 2;</script></body></html>"#;
        let bodies = script_bodies(html);
        assert_eq!(bodies.len(), 2);
        assert!(bodies[0].contains("first"));
        assert!(bodies[1].contains("second"));
    }
}
