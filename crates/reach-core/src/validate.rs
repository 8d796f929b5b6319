//! Record validator.
//!
//! Checks a candidate [`Document`] against a [`SchemaDefinition`] in a fixed
//! order and reports the first violation:
//!
//! 1. every required field is present,
//! 2. string fields are strings, within their enum, and long enough,
//! 3. integer fields are integers within their minimum and maximum,
//! 4. no undeclared field is present (unless the schema allows it).

use serde_json::Value;
use thiserror::Error;

use crate::{
  normalize::normalize_document,
  post::{Document, Post},
  schema::{BsonType, SchemaDefinition},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("missing required field `{0}`")]
  MissingField(String),

  #[error("field `{field}` must be of type {expected}")]
  WrongType { field: String, expected: &'static str },

  #[error("field `{field}` has value {value:?}, which is not one of the permitted values")]
  NotInEnum { field: String, value: String },

  #[error("field `{field}` must be at least {min} characters long")]
  TooShort { field: String, min: usize },

  #[error("field `{field}` must be an integer, got {value}")]
  NotAnInteger { field: String, value: String },

  #[error("field `{field}` is {value}, below the minimum of {min}")]
  BelowMinimum { field: String, value: i64, min: i64 },

  #[error("field `{field}` is {value}, above the maximum of {max}")]
  AboveMaximum { field: String, value: i64, max: i64 },

  #[error("field `{0}` is not part of the schema")]
  UnexpectedField(String),

  #[error("record satisfies the schema but not the post model: {0}")]
  Unrepresentable(String),
}

/// Validate `doc` against `schema`.
pub fn validate(doc: &Document, schema: &SchemaDefinition) -> Result<(), ValidationError> {
  // (1) presence
  if let Some(missing) = schema
    .required
    .iter()
    .find(|name| doc.get(name.as_str()).is_none_or(Value::is_null))
  {
    return Err(ValidationError::MissingField(missing.clone()));
  }

  // (2) strings and enums
  for (name, rule) in schema.properties.iter().filter(|(_, r)| r.bson_type == BsonType::String) {
    let Some(value) = doc.get(name).filter(|v| !v.is_null()) else {
      continue;
    };
    let Some(s) = value.as_str() else {
      return Err(ValidationError::WrongType { field: name.clone(), expected: "string" });
    };
    if let Some(allowed) = &rule.enum_values
      && !allowed.iter().any(|a| a == s)
    {
      return Err(ValidationError::NotInEnum { field: name.clone(), value: s.to_owned() });
    }
    if let Some(min) = rule.min_length
      && s.chars().count() < min
    {
      return Err(ValidationError::TooShort { field: name.clone(), min });
    }
  }

  // (3) integers
  for (name, rule) in schema.properties.iter().filter(|(_, r)| r.bson_type == BsonType::Int) {
    let Some(value) = doc.get(name).filter(|v| !v.is_null()) else {
      continue;
    };
    let n = match value {
      Value::Number(num) => num.as_i64().or_else(|| {
        // u64 beyond i64::MAX is still a non-negative integer.
        num.as_u64().map(|_| i64::MAX)
      }),
      _ => None,
    };
    let Some(n) = n else {
      return Err(ValidationError::NotAnInteger { field: name.clone(), value: value.to_string() });
    };
    if let Some(min) = rule.minimum
      && n < min
    {
      return Err(ValidationError::BelowMinimum { field: name.clone(), value: n, min });
    }
    if let Some(max) = rule.maximum
      && n > max
    {
      return Err(ValidationError::AboveMaximum { field: name.clone(), value: n, max });
    }
  }

  // (4) undeclared fields
  if !schema.additional_properties
    && let Some(extra) = doc.keys().find(|k| !schema.properties.contains_key(k.as_str()))
  {
    return Err(ValidationError::UnexpectedField(extra.clone()));
  }

  Ok(())
}

/// Normalize, validate, and convert one candidate record.
///
/// This is the single admission path shared by every writer.
pub fn admit(mut doc: Document, schema: &SchemaDefinition) -> Result<Post, ValidationError> {
  normalize_document(&mut doc);
  validate(&doc, schema)?;
  Post::from_document(doc).map_err(|e| ValidationError::Unrepresentable(e.to_string()))
}
