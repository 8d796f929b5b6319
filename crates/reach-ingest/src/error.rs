//! Error type for `reach-ingest`, and the structured failure payload handed
//! to callers.

use std::path::PathBuf;

use reach_core::{Classify, ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A store operation failed. The kind is captured before the concrete
  /// backend error is erased.
  #[error("store error: {source}")]
  Store {
    kind:   ErrorKind,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("cannot read source {path:?}: {source}")]
  Source {
    path:   PathBuf,
    #[source]
    source: csv::Error,
  },

  #[error("source {0:?} has no column matching the post schema")]
  NoUsableColumns(PathBuf),

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("background task failed: {0}")]
  Task(#[from] tokio::task::JoinError),

  #[error(transparent)]
  Core(#[from] reach_core::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Classify + Send + Sync + 'static,
  {
    Error::Store { kind: e.kind(), source: Box::new(e) }
  }
}

impl From<config::ConfigError> for Error {
  fn from(e: config::ConfigError) -> Self { Error::Config(e.to_string()) }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Store { kind, .. } => *kind,
      Error::Source { .. } | Error::NoUsableColumns(_) => ErrorKind::Source,
      Error::Config(_) => ErrorKind::Config,
      Error::Task(_) => ErrorKind::Internal,
      Error::Core(e) => e.kind(),
    }
  }
}

// ─── Payload ─────────────────────────────────────────────────────────────────

/// What a failed ingestion call reports: a machine-readable kind and a
/// human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePayload {
  pub kind:   ErrorKind,
  pub reason: String,
}

impl From<&Error> for FailurePayload {
  fn from(e: &Error) -> Self {
    Self { kind: e.kind(), reason: e.to_string() }
  }
}
