use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tracing::{error, info, info_span, warn, Instrument};

use crate::api::models::{DatasetHit, DatasetRecord};
use crate::api::DatasetSource;
use crate::bionomia::AttributionSource;
use crate::chart::render_attribution_chart;
use crate::contacts::resolve_curators;
use crate::error::{AppError, Result, ScrapeError};
use crate::notifier::Notifier;
use crate::report::{CuratorInbox, DatasetSummary};
use crate::stats::RecordCounter;
use crate::store::ReportStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFilter {
    pub country: String,
    pub subtype: String,
    pub limit: usize,
}

/// Builds every curator's inbox, one dataset at a time.
pub struct Pipeline {
    datasets: Box<dyn DatasetSource>,
    records: Box<dyn RecordCounter>,
    attributions: Box<dyn AttributionSource>,
    store: ReportStore,
    filter: DiscoveryFilter,
    lookback: Duration,
}

impl Pipeline {
    pub fn new(
        datasets: impl DatasetSource + 'static,
        records: impl RecordCounter + 'static,
        attributions: impl AttributionSource + 'static,
        store: ReportStore,
        filter: DiscoveryFilter,
    ) -> Self {
        Self {
            datasets: Box::new(datasets),
            records: Box::new(records),
            attributions: Box::new(attributions),
            store,
            filter,
            lookback: Duration::days(365),
        }
    }

    pub fn with_lookback(mut self, lookback: Duration) -> Self {
        self.lookback = lookback;
        self
    }

    /// Discovers datasets and folds their summaries into per-curator buckets.
    ///
    /// A dataset that fails is logged and left out; only a failing search aborts.
    pub async fn collect(&self, now: NaiveDateTime) -> Result<CuratorInbox> {
        let target = now.checked_sub_signed(self.lookback).ok_or_else(|| {
            AppError::Config(format!("lookback of {} days is out of range", self.lookback.num_days()))
        })?;

        let hits = self
            .datasets
            .search(&self.filter.country, &self.filter.subtype, self.filter.limit)
            .await?;
        info!(
            country = %self.filter.country,
            subtype = %self.filter.subtype,
            found = hits.len(),
            "discovered datasets"
        );

        let mut inbox = CuratorInbox::new();
        for hit in hits {
            let span = info_span!("dataset", key = %hit.key);
            if let Err(e) = self.process(&hit, now, target, &mut inbox).instrument(span).await {
                error!(key = %hit.key, error = %e, "dataset skipped");
            }
        }
        Ok(inbox)
    }

    async fn process(
        &self,
        hit: &DatasetHit,
        now: NaiveDateTime,
        target: NaiveDateTime,
        inbox: &mut CuratorInbox,
    ) -> Result<()> {
        let record = self.datasets.dataset(&hit.key).await?;

        let curators = resolve_curators(&record);
        if curators.is_empty() {
            info!(title = %record.title, "no administrative contact with an email, skipping");
            return Ok(());
        }

        let summary = Arc::new(self.summarize(&record, now, target).await?);
        for curator in &curators {
            inbox.deliver(curator, Arc::clone(&summary));
        }
        info!(curators = curators.len(), "dataset summarized");
        Ok(())
    }

    async fn summarize(
        &self,
        record: &DatasetRecord,
        now: NaiveDateTime,
        target: NaiveDateTime,
    ) -> Result<DatasetSummary> {
        let key = record.key.as_str();
        let citation_count = self.datasets.citation_count(key).await?;
        let new_records = self.new_records(record, target).await;
        let (bionomia_count, stats_image) = self.attribution_report(key, now).await;

        Ok(DatasetSummary {
            key: key.to_string(),
            title: record.title.clone(),
            citation_count,
            new_records,
            bionomia_count,
            stats_image,
            bionomia_url: self.attributions.source_url(key),
        })
    }

    /// `None` is the explicit "no data" outcome.
    async fn new_records(&self, record: &DatasetRecord, target: NaiveDateTime) -> Option<i64> {
        let outcome = match record.dwca_endpoint() {
            Some(endpoint) => self.records.record_delta(endpoint, target).await,
            None => Err(AppError::Scrape(ScrapeError::MissingEndpoint)),
        };
        match outcome {
            Ok(delta) => {
                info!(
                    new_records = delta.new_records,
                    since = %delta.baseline.timestamp,
                    "computed record growth"
                );
                Some(delta.new_records)
            }
            Err(e) => {
                warn!(error = %e, "no record growth data");
                None
            }
        }
    }

    async fn attribution_report(&self, key: &str, now: NaiveDateTime) -> (Option<usize>, Option<String>) {
        let attributions = match self.attributions.attributions(key).await {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "no attribution data");
                return (None, None);
            }
        };

        let published = match render_attribution_chart(&attributions.top) {
            Ok(chart) => self.store.publish_chart(key, &chart, now.date()).await,
            Err(e) => Err(e),
        };
        match published {
            Ok(url) => (Some(attributions.total_rows), Some(url)),
            Err(e) => {
                warn!(error = %e, "attribution chart not published");
                (Some(attributions.total_rows), None)
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: Vec<(String, AppError)>,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// One email per curator. A failed delivery does not stop the others.
pub async fn deliver_all(notifier: &Notifier, inbox: CuratorInbox, now: NaiveDateTime) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for curator in inbox {
        match notifier.notify(&curator, now.date()).await {
            Ok(()) => report.sent += 1,
            Err(e) => {
                error!(curator = %curator.email, error = %e, "delivery failed");
                report.failed.push((curator.email, e));
            }
        }
    }
    report
}
