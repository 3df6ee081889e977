use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use chrono::Duration;
use crate::error::{AppError, Result};

pub const DEFAULT_GBIF_API_URL: &str = "https://api.gbif.org/v1";
pub const DEFAULT_BIONOMIA_URL: &str = "https://bionomia.net";
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

#[derive(Clone, Debug)]
pub struct GbifConfig {
    pub api_url: String,
    pub country: String,
    pub subtype: String,
    pub limit: usize,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Endpoint with scheme, no trailing slash.
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub relay: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sender: String,
    /// Every report goes to these addresses instead of the curator when non-empty.
    pub recipient_override: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub gbif: GbifConfig,
    pub bionomia_url: String,
    pub template_path: PathBuf,
    pub lookback_days: i64,
    /// Absent in dry-run mode.
    pub storage: Option<StorageConfig>,
    /// Absent in dry-run mode.
    pub mail: Option<MailConfig>,
}

impl Config {
    pub fn load(dry_run: bool) -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok(), dry_run)
    }

    /// Builds the configuration from an arbitrary key lookup so callers and tests
    /// never have to touch process state.
    pub fn from_lookup<F>(lookup: F, dry_run: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let gbif = GbifConfig {
            api_url: vars.or("GBIF_API_URL", DEFAULT_GBIF_API_URL).trim_end_matches('/').to_string(),
            country: vars.or("GBIF_COUNTRY", "NO"),
            subtype: vars.or("GBIF_SUBTYPE", "SPECIMEN"),
            limit: vars.parsed("GBIF_DATASET_LIMIT", 2)?,
        };

        let storage = if dry_run {
            None
        } else {
            Some(StorageConfig {
                endpoint: with_scheme(&vars.required("MINIO_URI")?),
                bucket: vars.or("MINIO_BUCKET", "misc"),
                region: vars.or("MINIO_REGION", "us-east-1"),
                access_key: vars.required("MINIO_ACCESS_KEY")?,
                secret_key: vars.required("MINIO_SECRET_KEY")?,
            })
        };

        let mail = if dry_run {
            None
        } else {
            let username = vars.required("SMTP_EMAIL")?;
            Some(MailConfig {
                relay: vars.required("SMTP_SERVER")?,
                port: vars.parsed("SMTP_PORT", 587)?,
                password: vars.required("SMTP_PASSWORD")?,
                sender: username.clone(),
                username,
                recipient_override: vars
                    .optional("TEST_EMAILS")
                    .map(|list| split_addresses(&list))
                    .unwrap_or_default(),
            })
        };

        let lookback_days = vars.parsed("LOOKBACK_DAYS", 365)?;
        lookback(lookback_days)?;

        Ok(Config {
            gbif,
            bionomia_url: vars.or("BIONOMIA_URL", DEFAULT_BIONOMIA_URL).trim_end_matches('/').to_string(),
            template_path: PathBuf::from(vars.or("REPORT_TEMPLATE", "templates/report.html")),
            lookback_days,
            storage,
            mail,
        })
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| AppError::Config(format!("{} is not set", key)))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e))),
            None => Ok(default),
        }
    }
}

/// Lookback window in days, 1 to [`MAX_LOOKBACK_DAYS`].
pub fn lookback(days: i64) -> Result<Duration> {
    if !(1..=MAX_LOOKBACK_DAYS).contains(&days) {
        return Err(AppError::Config(format!(
            "Invalid LOOKBACK_DAYS: {} is outside 1..={}",
            days, MAX_LOOKBACK_DAYS
        )));
    }
    Duration::try_days(days)
        .ok_or_else(|| AppError::Config(format!("Invalid LOOKBACK_DAYS: {}", days)))
}

fn with_scheme(uri: &str) -> String {
    let uri = uri.trim_end_matches('/');
    if uri.starts_with("http://") || uri.starts_with("https://") {
        uri.to_string()
    } else {
        format!("https://{}", uri)
    }
}

fn split_addresses(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
