//! `reach`: engagement ingestion and reporting.
//!
//! Reads `reach.toml` (or the path given with `--config`) and `REACH_*`
//! environment variables, opens the SQLite-backed store, and runs one of the
//! subcommands below.

use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use reach_core::{
  aggregate::{Dimension, Filter, Metric},
  post::{Platform, PostType, Sentiment},
  store::PostStore,
};
use reach_ingest::{Analytics, FailurePayload, IngestService, Settings};
use reach_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Social media engagement ingestion")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "reach.toml", env = "REACH_CONFIG")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Provision the store, import the source if the store is empty, and run
  /// the synthetic scheduler until interrupted.
  Serve {
    /// Skip the first-run import.
    #[arg(long)]
    no_import: bool,
  },
  /// Import a tabular source into the store.
  Import {
    /// Defaults to the configured `source_path`.
    path: Option<PathBuf>,
  },
  /// Drop every stored post and re-import the source.
  Reset { path: Option<PathBuf> },
  /// Print store reachability and record count.
  Health,
  /// Run one named aggregation and print the rows as JSON.
  Report {
    #[arg(value_enum)]
    name: Report,
    #[arg(long, value_parser = Platform::from_str)]
    platform: Option<Platform>,
    #[arg(long, value_parser = PostType::from_str)]
    post_type: Option<PostType>,
    #[arg(long, value_parser = Sentiment::from_str)]
    sentiment: Option<Sentiment>,
    /// Inclusive lower bound on the posting date (YYYY-MM-DD).
    #[arg(long)]
    from: Option<chrono::NaiveDate>,
    /// Inclusive upper bound on the posting date (YYYY-MM-DD).
    #[arg(long)]
    to: Option<chrono::NaiveDate>,
  },
}

#[derive(Clone, Copy, ValueEnum)]
enum Report {
  PlatformEngagement,
  SentimentByPlatform,
  SentimentByPostType,
  AverageLikes,
  AverageComments,
  AverageShares,
  SharesByPostType,
  DecompositionTree,
  EngagementByDay,
  CountByPlatform,
  CountByMonth,
  Summary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = Settings::load(Some(&cli.config))
    .map_err(reported)
    .with_context(|| format!("failed to load settings from {:?}", cli.config))?;

  let store = Arc::new(SqliteStore::new(settings.store_config()));

  match cli.command {
    Command::Serve { no_import } => serve(store, &settings, no_import).await,
    Command::Import { path } => {
      let service = connected(store, &settings).await?;
      let path = path.unwrap_or_else(|| settings.source_path.clone());
      let summary = service.ingest_from_source(&path).await.map_err(reported)?;
      print_json(&summary)
    }
    Command::Reset { path } => {
      let service = connected(store, &settings).await?;
      let path = path.unwrap_or_else(|| settings.source_path.clone());
      let summary = service.reset_and_reingest(&path).await.map_err(reported)?;
      print_json(&summary)
    }
    Command::Health => {
      if let Err(e) = store.connect().await {
        tracing::warn!(error = %e, "store unreachable");
      }
      print_json(&store.health().await)
    }
    Command::Report { name, platform, post_type, sentiment, from, to } => {
      store.connect().await.context("store unreachable")?;
      let filter = Filter { platform, post_type, sentiment, date_from: from, date_to: to };
      let analytics = Analytics::new(store);
      let rows = match name {
        Report::PlatformEngagement => analytics.platform_engagement(filter).await,
        Report::SentimentByPlatform => analytics.sentiment_by_platform(filter).await,
        Report::SentimentByPostType => analytics.sentiment_by_post_type(filter).await,
        Report::AverageLikes => analytics.average_by_date_platform(Metric::Likes, filter).await,
        Report::AverageComments => analytics.average_by_date_platform(Metric::Comments, filter).await,
        Report::AverageShares => analytics.average_by_date_platform(Metric::Shares, filter).await,
        Report::SharesByPostType => analytics.shares_by_post_type(filter).await,
        Report::DecompositionTree => analytics.decomposition_tree(platform, post_type).await,
        Report::EngagementByDay => analytics.engagement_by_day(filter).await,
        Report::CountByPlatform => analytics.count_by(Dimension::Platform, filter).await,
        Report::CountByMonth => analytics.count_by(Dimension::Month, filter).await,
        Report::Summary => analytics.engagement_summary(filter).await.map(|r| r.into_iter().collect()),
      }
      .map_err(reported)?;
      print_json(&rows)
    }
  }
}

async fn connected(
  store: Arc<SqliteStore>,
  settings: &Settings,
) -> anyhow::Result<IngestService<SqliteStore>> {
  let service = IngestService::from_settings(store, settings).map_err(reported)?;
  service.bootstrap(None).await.map_err(reported)?;
  Ok(service)
}

async fn serve(store: Arc<SqliteStore>, settings: &Settings, no_import: bool) -> anyhow::Result<()> {
  let service = IngestService::from_settings(store.clone(), settings).map_err(reported)?;
  let source = (!no_import).then_some(settings.source_path.as_path());
  let report = service.bootstrap(source).await.map_err(reported)?;
  tracing::info!(
    schema = ?report.schema,
    existing_posts = report.existing_posts,
    imported = report.import.as_ref().map(|s| s.rows_written),
    "store ready"
  );

  service.start_scheduler();
  tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
  tracing::info!("shutdown requested");

  service.stop_scheduler();
  while service.scheduler_status().tick_in_flight {
    tokio::time::sleep(Duration::from_millis(100)).await;
  }
  let status = service.scheduler_status();
  tracing::info!(
    ticks_completed = status.ticks_completed,
    ticks_failed = status.ticks_failed,
    records_written = status.records_written,
    "scheduler drained"
  );
  store.disconnect().await.context("failed to close store")?;
  Ok(())
}

/// Log the structured failure payload before handing the error to anyhow.
fn reported(e: reach_ingest::Error) -> anyhow::Error {
  let payload = FailurePayload::from(&e);
  match serde_json::to_string(&payload) {
    Ok(json) => tracing::error!(payload = %json, "operation failed"),
    Err(_) => tracing::error!(kind = %payload.kind, reason = %payload.reason, "operation failed"),
  }
  anyhow::Error::new(e)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
