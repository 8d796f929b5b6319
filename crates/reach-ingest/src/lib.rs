//! Ingestion drivers and entry points for the Reach engagement pipeline.
//!
//! Feeds the store from two sources, a tabular file via [`BulkImporter`] and
//! a recurring synthetic stream via [`IngestionScheduler`], and exposes the
//! calls the routing and visualization layers make: [`IngestService`] and
//! [`Analytics`]. Generic over any [`reach_core::store::PostStore`].

pub mod analytics;
pub mod batch;
pub mod config;
pub mod error;
pub mod generator;
pub mod importer;
pub mod scheduler;
pub mod service;

pub use analytics::Analytics;
pub use config::Settings;
pub use error::{Error, FailurePayload, Result};
pub use importer::{BulkImporter, ImportSummary};
pub use scheduler::{IngestionScheduler, SchedulerConfig, SchedulerState, SchedulerStatus};
pub use service::IngestService;

#[cfg(test)]
mod tests;
