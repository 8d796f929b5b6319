//! Ingestion entry points for the request-routing layer.

use std::{path::Path, sync::Arc};

use reach_core::store::{Health, PostStore, SchemaOutcome};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
  Error, Result,
  config::Settings,
  generator::SyntheticGenerator,
  importer::{BulkImporter, ImportSummary},
  scheduler::{IngestionScheduler, SchedulerConfig, SchedulerStatus},
};

/// Store health plus the scheduler's view, for liveness checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
  pub store:     Health,
  pub scheduler: SchedulerStatus,
}

/// What startup provisioning did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
  pub schema:         SchemaOutcome,
  pub existing_posts: u64,
  /// Present when the collection was empty and a source was imported.
  pub import:         Option<ImportSummary>,
}

pub struct IngestService<S> {
  store:     Arc<S>,
  importer:  BulkImporter<S>,
  scheduler: IngestionScheduler<S>,
}

impl<S: PostStore + 'static> IngestService<S> {
  pub fn new(
    store: Arc<S>,
    scheduler: SchedulerConfig,
    max_reported_rejections: usize,
    generator: SyntheticGenerator,
  ) -> Self {
    Self {
      importer: BulkImporter::new(store.clone(), max_reported_rejections),
      scheduler: IngestionScheduler::new(store.clone(), scheduler, generator),
      store,
    }
  }

  pub fn from_settings(store: Arc<S>, settings: &Settings) -> Result<Self> {
    Ok(Self::new(
      store,
      settings.scheduler_config(),
      settings.max_reported_rejections,
      SyntheticGenerator::from_entropy()?,
    ))
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn scheduler(&self) -> &IngestionScheduler<S> { &self.scheduler }

  /// Connect, reconcile the schema, and import `source` once if the
  /// collection holds no posts.
  pub async fn bootstrap(&self, source: Option<&Path>) -> Result<BootstrapReport> {
    self.store.connect().await.map_err(Error::store)?;
    let schema = self.store.ensure_schema().await.map_err(Error::store)?;
    let existing_posts = self.store.count().await.map_err(Error::store)?;

    let import = match source {
      Some(path) if existing_posts == 0 => {
        info!(source = ?path, "collection is empty; running first import");
        Some(self.ingest_from_source(path).await?)
      }
      _ => None,
    };
    Ok(BootstrapReport { schema, existing_posts, import })
  }

  pub async fn ingest_from_source(&self, path: impl AsRef<Path>) -> Result<ImportSummary> {
    self.importer.import_path(path).await
  }

  pub fn start_scheduler(&self) -> bool { self.scheduler.start() }

  pub fn stop_scheduler(&self) -> bool { self.scheduler.stop() }

  pub fn scheduler_status(&self) -> SchedulerStatus { self.scheduler.status() }

  /// Discard every stored post, recreate the collection with the current
  /// schema, and import `path` from scratch.
  pub async fn reset_and_reingest(&self, path: impl AsRef<Path>) -> Result<ImportSummary> {
    let path = path.as_ref();
    // Fail before discarding anything if the source cannot be opened.
    if let Err(e) = tokio::fs::metadata(path).await {
      return Err(Error::Source { path: path.to_path_buf(), source: csv::Error::from(e) });
    }

    let dropped = self.store.reset().await.map_err(Error::store)?;
    warn!(source = ?path, dropped, "collection reset for re-ingestion");
    self.importer.import_path(path).await
  }

  pub async fn health(&self) -> HealthReport {
    HealthReport { store: self.store.health().await, scheduler: self.scheduler.status() }
  }
}
