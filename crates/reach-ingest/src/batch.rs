//! Per-row admission for batch paths.
//!
//! Every candidate row is normalized and validated on its own; failures are
//! collected instead of aborting the batch, and only the survivors are handed
//! to the store.

use reach_core::{
  post::{DayOfWeek, Document, Post},
  schema::{SchemaDefinition, SchemaRegistry},
  store::PostStore,
  validate::admit,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// The definition rows are admitted against: the one the live collection
/// enforces, or the registry's when the collection does not exist yet.
pub async fn admission_schema<S: PostStore>(store: &S) -> Result<SchemaDefinition> {
  let enforced = store.enforced_schema().await.map_err(Error::store)?;
  Ok(enforced.unwrap_or_else(SchemaRegistry::current))
}

/// One rejected row. `row` is the zero-based position in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
  pub row:    usize,
  pub reason: String,
}

/// Rejections with a bound on how many reasons are kept in memory. The
/// total stays exact once the cap is reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RejectionLog {
  cap:     usize,
  entries: Vec<Rejection>,
  total:   usize,
}

impl RejectionLog {
  pub fn new(cap: usize) -> Self {
    Self { cap, entries: Vec::new(), total: 0 }
  }

  pub fn record(&mut self, row: usize, reason: impl Into<String>) {
    self.total += 1;
    if self.entries.len() < self.cap {
      self.entries.push(Rejection { row, reason: reason.into() });
    }
  }

  pub fn total(&self) -> usize { self.total }

  pub fn is_truncated(&self) -> bool { self.total > self.entries.len() }

  pub fn entries(&self) -> &[Rejection] { &self.entries }

  pub fn into_entries(self) -> Vec<Rejection> { self.entries }
}

/// The outcome of admitting a batch.
#[derive(Debug)]
pub struct PreparedBatch {
  pub accepted:   Vec<Post>,
  pub rejections: RejectionLog,
  /// Accepted rows whose timestamp needed the sentinel fallback.
  pub fallbacks:  usize,
}

impl PreparedBatch {
  pub fn rows_read(&self) -> usize { self.accepted.len() + self.rejections.total() }
}

/// Admit each row against `schema`. Rows that could not even be read arrive
/// as `Err(reason)` and are rejected as-is.
pub fn prepare_batch<I>(rows: I, schema: &SchemaDefinition, max_reported_rejections: usize) -> PreparedBatch
where
  I: IntoIterator<Item = Result<Document, String>>,
{
  let mut batch = PreparedBatch {
    accepted:   Vec::new(),
    rejections: RejectionLog::new(max_reported_rejections),
    fallbacks:  0,
  };

  for (row, candidate) in rows.into_iter().enumerate() {
    match candidate.and_then(|doc| admit(doc, schema).map_err(|e| e.to_string())) {
      Ok(post) => {
        if post.posted_day_of_week == DayOfWeek::Unknown {
          batch.fallbacks += 1;
        }
        batch.accepted.push(post);
      }
      Err(reason) => {
        debug!(row, %reason, "row rejected");
        batch.rejections.record(row, reason);
      }
    }
  }
  batch
}
