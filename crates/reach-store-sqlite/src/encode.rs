//! Encoding helpers between domain values and the text stored in SQLite
//! columns.
//!
//! Documents are compact JSON; timestamps are RFC 3339 strings; `post_id`
//! is mirrored into its own integer column for lookups.

use chrono::{DateTime, Utc};
use reach_core::post::{Document, Post, field};

use crate::Result;

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn now() -> String { encode_dt(Utc::now()) }

/// A document ready for the `documents` table.
pub struct EncodedDocument {
  pub post_id:  Option<i64>,
  pub body:     String,
  /// Kept for validation against the enforced schema before writing.
  pub document: Document,
}

pub fn encode_post(post: &Post) -> Result<EncodedDocument> {
  let document = post.to_document()?;
  Ok(EncodedDocument {
    post_id: post_id_column(&document),
    body: serde_json::to_string(&document)?,
    document,
  })
}

pub fn encode_document(document: &Document) -> Result<String> {
  Ok(serde_json::to_string(document)?)
}

pub fn decode_document(body: &str) -> Result<Document> {
  Ok(serde_json::from_str(body)?)
}

pub fn decode_post(body: &str) -> Result<Post> {
  Ok(serde_json::from_str(body)?)
}

/// The value for the `post_id` column; absent or out-of-range ids are NULL.
pub fn post_id_column(document: &Document) -> Option<i64> {
  document.get(field::POST_ID).and_then(serde_json::Value::as_i64)
}

/// `post_id` as bound in a query; ids beyond `i64::MAX` cannot be stored.
pub fn encode_post_id(post_id: u64) -> Option<i64> {
  i64::try_from(post_id).ok()
}
