pub mod api;
pub mod bionomia;
pub mod chart;
pub mod config;
pub mod contacts;
pub mod error;
pub mod notifier;
pub mod pipeline;
pub mod report;
pub mod scraper;
pub mod stats;
pub mod store;

pub use error::{AppError, Result, ScrapeError};
pub use pipeline::{deliver_all, DeliveryReport, DiscoveryFilter, Pipeline};
