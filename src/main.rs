use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use curator_digest::{
    api::GbifClient,
    bionomia::BionomiaClient,
    config::{lookback, Config},
    deliver_all,
    notifier::{DirectoryMailer, Notifier, SmtpMailer},
    report::ReportTemplate,
    stats::{EmbeddedArrayParser, StatsPageScraper},
    store::{DirectoryStore, ReportStore, S3Store},
    AppError, DiscoveryFilter, Pipeline,
};

/// Emails dataset curators a monthly status report.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Publishing country of the datasets to report on
    #[arg(long)]
    country: Option<String>,

    /// Dataset subtype filter
    #[arg(long)]
    subtype: Option<String>,

    /// Number of datasets to take from the search
    #[arg(long)]
    limit: Option<usize>,

    /// Days to look back when counting new records
    #[arg(long)]
    lookback_days: Option<i64>,

    /// Write reports and charts to this directory instead of uploading and mailing them
    #[arg(long, value_name = "DIR")]
    dry_run: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, "run aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool, AppError> {
    let config = Config::load(cli.dry_run.is_some())?;

    let filter = DiscoveryFilter {
        country: cli.country.unwrap_or(config.gbif.country.clone()),
        subtype: cli.subtype.unwrap_or(config.gbif.subtype.clone()),
        limit: cli.limit.unwrap_or(config.gbif.limit),
    };
    let lookback = lookback(cli.lookback_days.unwrap_or(config.lookback_days))?;
    let template = ReportTemplate::load(&config.template_path)?;

    let (store, notifier) = match (&cli.dry_run, &config.storage, &config.mail) {
        (Some(dir), _, _) => {
            info!(dir = %dir.display(), "dry run, nothing will be uploaded or sent");
            (
                ReportStore::new(DirectoryStore::new(dir)),
                Notifier::new(DirectoryMailer::new(dir), template),
            )
        }
        (None, Some(storage), Some(mail)) => (
            ReportStore::new(S3Store::new(storage)?),
            Notifier::new(SmtpMailer::new(mail)?, template)
                .with_recipient_override(mail.recipient_override.clone()),
        ),
        _ => return Err(AppError::Config("storage and mail settings are required".to_string())),
    };

    let pipeline = Pipeline::new(
        GbifClient::new(&config.gbif.api_url),
        StatsPageScraper::new(EmbeddedArrayParser::default()),
        BionomiaClient::new(&config.bionomia_url),
        store,
        filter,
    )
    .with_lookback(lookback);

    let now = Local::now().naive_local();
    let inbox = pipeline.collect(now).await?;
    info!(curators = inbox.len(), "reports ready");

    let report = deliver_all(&notifier, inbox, now).await;
    info!(sent = report.sent, failed = report.failed.len(), "delivery finished");
    Ok(report.is_success())
}
