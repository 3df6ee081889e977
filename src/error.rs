#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("no embedded `{0}` array found in statistics page")]
    NoEmbeddedData(String),

    #[error("dataset has no DwC-A endpoint")]
    MissingEndpoint,

    #[error("embedded array is not valid JSON after cleaning: {0}")]
    InvalidJson(String),

    #[error("row {index} has {fields} fields, expected at least 3")]
    MalformedRow { index: usize, fields: usize },

    #[error("timestamp `{0}` does not match YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp(String),

    #[error("record count `{0}` is not an integer")]
    InvalidCount(String),

    #[error("embedded array contains no points")]
    EmptySeries,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("{url} returned HTTP {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("{url} returned a body that could not be decoded: {message}")]
    Decode { url: String, message: String },

    #[error("Error scraping statistics page: {0}")]
    Scrape(#[from] ScrapeError),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Mail delivery failed: {0}")]
    Delivery(String),

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Chart rendering error: {0}")]
    Chart(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<minijinja::Error> for AppError {
    fn from(err: minijinja::Error) -> Self {
        AppError::Template(err.to_string())
    }
}

impl From<lettre::error::Error> for AppError {
    fn from(err: lettre::error::Error) -> Self {
        AppError::Delivery(err.to_string())
    }
}

impl From<lettre::address::AddressError> for AppError {
    fn from(err: lettre::address::AddressError) -> Self {
        AppError::Delivery(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for AppError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        AppError::Delivery(err.to_string())
    }
}

impl From<s3::error::S3Error> for AppError {
    fn from(err: s3::error::S3Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
pub type ScrapeResult<T> = std::result::Result<T, ScrapeError>;
