//! One-shot import of a tabular source.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Instant,
};

use reach_core::{
  post::Document,
  schema::{BsonType, SchemaDefinition},
  store::PostStore,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  batch::{Rejection, admission_schema, prepare_batch},
};

/// What an import did, row by row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
  pub source:               PathBuf,
  pub rows_read:            usize,
  pub rows_accepted:        usize,
  pub rows_rejected:        usize,
  pub rows_written:         usize,
  /// At most `max_reported_rejections` entries; see `rejections_truncated`.
  pub rejection_reasons:    Vec<Rejection>,
  pub rejections_truncated: bool,
  /// Accepted rows stored with sentinel date fields.
  pub timestamp_fallbacks:  usize,
}

pub struct BulkImporter<S> {
  store:                   Arc<S>,
  max_reported_rejections: usize,
}

impl<S: PostStore> BulkImporter<S> {
  pub fn new(store: Arc<S>, max_reported_rejections: usize) -> Self {
    Self { store, max_reported_rejections }
  }

  /// Read `path`, admit each row against the schema the store enforces, and
  /// write the survivors in one call.
  pub async fn import_path(&self, path: impl AsRef<Path>) -> Result<ImportSummary> {
    let path = path.as_ref().to_path_buf();
    let started = Instant::now();
    let schema = admission_schema(self.store.as_ref()).await?;

    let rows = {
      let path = path.clone();
      let schema = schema.clone();
      tokio::task::spawn_blocking(move || read_rows(&path, &schema)).await??
    };

    let batch = prepare_batch(rows, &schema, self.max_reported_rejections);
    let rows_read = batch.rows_read();
    let rows_accepted = batch.accepted.len();
    let rows_rejected = batch.rejections.total();
    let timestamp_fallbacks = batch.fallbacks;
    let rejections_truncated = batch.rejections.is_truncated();

    if rows_rejected > 0 {
      warn!(source = ?path, rows_rejected, rejections_truncated, "rows rejected during import");
    }

    let rows_written = if batch.accepted.is_empty() {
      0
    } else {
      self.store.bulk_insert(batch.accepted).await.map_err(Error::store)?
    };

    info!(
      source = ?path,
      rows_read,
      rows_accepted,
      rows_rejected,
      rows_written,
      timestamp_fallbacks,
      elapsed_ms = started.elapsed().as_millis() as u64,
      "import finished"
    );

    Ok(ImportSummary {
      source: path,
      rows_read,
      rows_accepted,
      rows_rejected,
      rows_written,
      rejection_reasons: batch.rejections.into_entries(),
      rejections_truncated,
      timestamp_fallbacks,
    })
  }
}

// ─── Reading ─────────────────────────────────────────────────────────────────

struct Column {
  index: usize,
  name:  String,
  ty:    BsonType,
}

/// Read every data row of the CSV at `path`, keeping only the columns the
/// schema declares. Unreadable records come back as `Err(reason)`.
pub fn read_rows(path: &Path, schema: &SchemaDefinition) -> Result<Vec<Result<Document, String>>> {
  let source = |e: csv::Error| Error::Source { path: path.to_path_buf(), source: e };

  let mut reader = csv::ReaderBuilder::new()
    .flexible(true)
    .trim(csv::Trim::All)
    .from_path(path)
    .map_err(source)?;

  let headers = reader.headers().map_err(source)?.clone();
  let mut columns = Vec::new();
  let mut ignored = Vec::new();
  for (index, header) in headers.iter().enumerate() {
    let name = header.trim_start_matches('\u{feff}');
    match schema.rule(name) {
      Some(rule) => columns.push(Column { index, name: name.to_owned(), ty: rule.bson_type }),
      None => ignored.push(name.to_owned()),
    }
  }
  if columns.is_empty() {
    return Err(Error::NoUsableColumns(path.to_path_buf()));
  }
  if !ignored.is_empty() {
    debug!(source = ?path, ?ignored, "columns outside the schema are dropped");
  }

  Ok(
    reader
      .records()
      .map(|record| {
        record
          .map(|r| project(&r, &columns))
          .map_err(|e| format!("unreadable record: {e}"))
      })
      .collect(),
  )
}

fn project(record: &csv::StringRecord, columns: &[Column]) -> Document {
  let mut doc = Document::new();
  for column in columns {
    match record.get(column.index) {
      Some(cell) if !cell.is_empty() => {
        doc.insert(column.name.clone(), coerce_cell(cell, column.ty));
      }
      _ => {}
    }
  }
  doc
}

/// Turn a cell into the JSON type its schema rule expects, leaving it as a
/// string when it cannot be represented so the validator can report it.
fn coerce_cell(cell: &str, ty: BsonType) -> Value {
  match ty {
    BsonType::String => Value::from(cell),
    BsonType::Int => {
      if let Ok(n) = cell.parse::<i64>() {
        return Value::from(n);
      }
      // Spreadsheet exports often write integral counts as `150.0`.
      match cell.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::from(f as i64),
        _ => Value::from(cell),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use reach_core::schema::SchemaRegistry;

  use super::*;

  fn csv_file(contents: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f
  }

  #[test]
  fn coercion_follows_the_rule_type() {
    assert_eq!(coerce_cell("150", BsonType::Int), Value::from(150));
    assert_eq!(coerce_cell("150.0", BsonType::Int), Value::from(150));
    assert_eq!(coerce_cell("1.5", BsonType::Int), Value::from("1.5"));
    assert_eq!(coerce_cell("42", BsonType::String), Value::from("42"));
  }

  #[test]
  fn unknown_columns_are_projected_away() {
    let f = csv_file(
      "post_id,platform,post_type,likes,comments,shares,post_time,sentiment_score,region\n\
       7,Twitter,poll,3,4,5,1/2/2024 10:00,neutral,EU\n",
    );
    let rows = read_rows(f.path(), &SchemaRegistry::current()).unwrap();
    assert_eq!(rows.len(), 1);
    let doc = rows[0].as_ref().unwrap();
    assert!(!doc.contains_key("region"));
    assert_eq!(doc["post_id"], Value::from(7));
    assert_eq!(doc["likes"], Value::from(3));
  }

  #[test]
  fn empty_cells_are_absent() {
    let f = csv_file("platform,likes\nTwitter,\n");
    let rows = read_rows(f.path(), &SchemaRegistry::current()).unwrap();
    assert!(!rows[0].as_ref().unwrap().contains_key("likes"));
  }

  #[test]
  fn source_without_schema_columns_is_refused() {
    let f = csv_file("a,b\n1,2\n");
    let err = read_rows(f.path(), &SchemaRegistry::current()).unwrap_err();
    assert!(matches!(err, Error::NoUsableColumns(_)));
  }

  #[test]
  fn missing_source_is_a_source_error() {
    let err = read_rows(Path::new("/nonexistent/posts.csv"), &SchemaRegistry::current()).unwrap_err();
    assert!(matches!(err, Error::Source { .. }));
  }
}
