//! Error types for `reach-core`, plus the machine-readable error taxonomy
//! shared by every crate in the workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validate::ValidationError;

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(#[from] ValidationError),

  #[error("unknown {kind} value: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Taxonomy ────────────────────────────────────────────────────────────────

/// Machine-readable failure category, surfaced to callers alongside a
/// human-readable reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// The store is unreachable or the handle was never opened.
  Connection,
  /// A record does not satisfy the enforced schema.
  Validation,
  /// The live collection is missing or enforces a different definition.
  SchemaDrift,
  NotFound,
  /// The external tabular source could not be read.
  Source,
  Storage,
  Config,
  Internal,
}

impl ErrorKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ErrorKind::Connection => "connection",
      ErrorKind::Validation => "validation",
      ErrorKind::SchemaDrift => "schema_drift",
      ErrorKind::NotFound => "not_found",
      ErrorKind::Source => "source",
      ErrorKind::Storage => "storage",
      ErrorKind::Config => "config",
      ErrorKind::Internal => "internal",
    }
  }
}

impl std::fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Errors that can report which [`ErrorKind`] they belong to.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Validation(_) | Error::UnknownVariant { .. } => ErrorKind::Validation,
      Error::Serialization(_) => ErrorKind::Internal,
    }
  }
}
