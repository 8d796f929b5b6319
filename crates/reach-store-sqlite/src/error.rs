//! Error type for `reach-store-sqlite`.

use std::time::Duration;

use reach_core::{Classify, ErrorKind, validate::ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] reach_core::Error),

  /// The endpoint could not be opened or failed its liveness probe.
  #[error("store unreachable at {endpoint}: {reason}")]
  Connection { endpoint: String, reason: String },

  #[error("connecting to {endpoint} timed out after {timeout:?}")]
  Timeout { endpoint: String, timeout: Duration },

  #[error("store is not connected; call connect() first")]
  NotConnected,

  #[error("collection {0:?} does not exist; call ensure_schema() first")]
  NoCollection(String),

  /// A document in a write failed the collection's enforced validator.
  #[error("document {index} rejected: {source}")]
  Validation {
    index:  usize,
    #[source]
    source: ValidationError,
  },

  #[error("collection {0:?} carries an unreadable validator")]
  CorruptValidator(String),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Core(e) => e.kind(),
      Error::Connection { .. } | Error::Timeout { .. } | Error::NotConnected => ErrorKind::Connection,
      Error::Database(tokio_rusqlite::Error::ConnectionClosed) => ErrorKind::Connection,
      Error::NoCollection(_) | Error::CorruptValidator(_) => ErrorKind::SchemaDrift,
      Error::Validation { .. } => ErrorKind::Validation,
      Error::Database(_) => ErrorKind::Storage,
      Error::Json(_) => ErrorKind::Internal,
    }
  }
}
