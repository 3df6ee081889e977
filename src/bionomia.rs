//! Specimen attributions made in Bionomia that the publisher has not yet
//! picked up. Bionomia publishes them per dataset as zipped CSV files.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{AppError, Result};
use crate::scraper::fetch_bytes;

pub const MISSING_ATTRIBUTIONS_FILE: &str = "missing_attributions.csv";
pub const USERS_FILE: &str = "users.csv";
pub const TOP_CONTRIBUTORS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContributorCount {
    pub user_id: String,
    pub name: String,
    pub frequency: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attributions {
    /// Most frequent contributors, highest count first.
    pub top: Vec<ContributorCount>,
    /// Every row of the missing-attributions file.
    pub total_rows: usize,
}

#[async_trait]
pub trait AttributionSource: Send + Sync {
    /// Public download link for the missing-attributions bundle.
    fn source_url(&self, key: &str) -> String;

    async fn attributions(&self, key: &str) -> Result<Attributions>;
}

#[derive(Debug, Clone)]
pub struct BionomiaClient {
    base_url: String,
}

impl BionomiaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn bundle_url(&self, key: &str, file: &str) -> String {
        format!("{}/dataset/{}/{}.zip", self.base_url, key, file)
    }

    async fn download_csv(&self, key: &str, file: &str) -> Result<Vec<u8>> {
        let url = self.bundle_url(key, file);
        debug!(%url, "downloading bundle");
        let bytes = fetch_bytes(&url).await.map_err(|e| match e {
            AppError::UnexpectedStatus { url, status } => {
                AppError::Download(format!("{} returned HTTP {}", url, status))
            }
            other => other,
        })?;
        csv_from_zip(&bytes, file)
    }
}

#[async_trait]
impl AttributionSource for BionomiaClient {
    fn source_url(&self, key: &str) -> String {
        self.bundle_url(key, MISSING_ATTRIBUTIONS_FILE)
    }

    async fn attributions(&self, key: &str) -> Result<Attributions> {
        let missing = self.download_csv(key, MISSING_ATTRIBUTIONS_FILE).await?;
        let tally = tally_missing(&missing, TOP_CONTRIBUTORS)?;

        let users = self.download_csv(key, USERS_FILE).await?;
        let top = name_contributors(&users, &tally.top)?;

        Ok(Attributions {
            top,
            total_rows: tally.total_rows,
        })
    }
}

/// Reads `name` out of a zip archive held in memory, or the first CSV entry when
/// the archive names it differently.
pub fn csv_from_zip(bytes: &[u8], name: &str) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::Download(format!("{} is not a zip archive: {}", name, e)))?;

    let entry = archive
        .file_names()
        .find(|n| *n == name)
        .or_else(|| archive.file_names().find(|n| n.ends_with(".csv")))
        .map(str::to_string)
        .ok_or_else(|| AppError::Download(format!("archive has no {}", name)))?;

    let mut file = archive
        .by_name(&entry)
        .map_err(|e| AppError::Download(format!("cannot open {}: {}", entry, e)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTally {
    pub total_rows: usize,
    /// `(user_id, frequency)`, highest first, ties by first appearance.
    pub top: Vec<(String, u64)>,
}

#[derive(Debug, Deserialize)]
struct MissingAttributionRow {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

pub fn tally_missing(csv_bytes: &[u8], limit: usize) -> Result<MissingTally> {
    let mut reader = csv::Reader::from_reader(csv_bytes);
    require_columns(&mut reader, MISSING_ATTRIBUTIONS_FILE, &["user_id"])?;

    let mut counts: HashMap<String, (u64, usize)> = HashMap::new();
    let mut total_rows = 0usize;
    for row in reader.deserialize::<MissingAttributionRow>() {
        let row = row.map_err(|e| csv_error(MISSING_ATTRIBUTIONS_FILE, e))?;
        total_rows += 1;
        let Some(id) = row.user_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) else {
            continue;
        };
        let first_seen = counts.len();
        counts.entry(id).or_insert((0, first_seen)).0 += 1;
    }

    let mut ranked: Vec<(String, (u64, usize))> = counts.into_iter().collect();
    ranked.sort_by(|(_, (a_count, a_seen)), (_, (b_count, b_seen))| {
        b_count.cmp(a_count).then(a_seen.cmp(b_seen))
    });

    Ok(MissingTally {
        total_rows,
        top: ranked
            .into_iter()
            .take(limit)
            .map(|(id, (count, _))| (id, count))
            .collect(),
    })
}

/// Joins the tally with display names; ids unknown to `users.csv` are dropped.
pub fn name_contributors(users_csv: &[u8], top: &[(String, u64)]) -> Result<Vec<ContributorCount>> {
    let mut reader = csv::Reader::from_reader(users_csv);
    require_columns(&mut reader, USERS_FILE, &["id", "name"])?;

    let mut names: HashMap<String, String> = HashMap::new();
    for row in reader.deserialize::<UserRow>() {
        let row = row.map_err(|e| csv_error(USERS_FILE, e))?;
        names
            .entry(row.id.trim().to_string())
            .or_insert_with(|| row.name.unwrap_or_default().trim().to_string());
    }

    Ok(top
        .iter()
        .filter_map(|(id, frequency)| {
            names.get(id).map(|name| ContributorCount {
                user_id: id.clone(),
                name: name.clone(),
                frequency: *frequency,
            })
        })
        .collect())
}

fn require_columns<R: Read>(reader: &mut csv::Reader<R>, file: &str, columns: &[&str]) -> Result<()> {
    let headers = reader.headers().map_err(|e| csv_error(file, e))?;
    for column in columns {
        if !headers.iter().any(|h| h.trim() == *column) {
            return Err(AppError::Download(format!("{} has no `{}` column", file, column)));
        }
    }
    Ok(())
}

fn csv_error(file: &str, err: csv::Error) -> AppError {
    AppError::Download(format!("malformed {}: {}", file, err))
}
