//! Schema registry: the structural definition every persisted post must
//! satisfy.
//!
//! The definition is a typed value rather than a loose document so that
//! "is the live collection enforcing what we expect?" is a plain `==`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::post::{DayOfWeek, Month, Platform, PostType, Sentiment, field};

// ─── Rules ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BsonType {
  String,
  Int,
}

impl BsonType {
  pub fn as_str(self) -> &'static str {
    match self {
      BsonType::String => "string",
      BsonType::Int => "int",
    }
  }
}

/// Constraints on a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
  pub bson_type:   BsonType,
  #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
  pub enum_values: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub minimum:     Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub maximum:     Option<i64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub min_length:  Option<usize>,
}

impl FieldRule {
  pub fn string() -> Self {
    Self {
      bson_type:   BsonType::String,
      enum_values: None,
      minimum:     None,
      maximum:     None,
      min_length:  None,
    }
  }

  pub fn int() -> Self {
    Self { bson_type: BsonType::Int, ..Self::string() }
  }

  pub fn one_of<I, S>(mut self, values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.enum_values = Some(values.into_iter().map(Into::into).collect());
    self
  }

  pub fn minimum(mut self, min: i64) -> Self {
    self.minimum = Some(min);
    self
  }

  pub fn maximum(mut self, max: i64) -> Self {
    self.maximum = Some(max);
    self
  }

  pub fn min_length(mut self, len: usize) -> Self {
    self.min_length = Some(len);
    self
  }
}

// ─── Definition ──────────────────────────────────────────────────────────────

/// A complete structural validator for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
  pub required:              Vec<String>,
  pub properties:            BTreeMap<String, FieldRule>,
  #[serde(default)]
  pub additional_properties: bool,
}

impl SchemaDefinition {
  pub fn rule(&self, name: &str) -> Option<&FieldRule> {
    self.properties.get(name)
  }

  pub fn is_required(&self, name: &str) -> bool {
    self.required.iter().any(|r| r == name)
  }

  /// Names of fields whose rule or required-ness differs between `self` and
  /// `other`, in sorted order. Empty iff the definitions are equal apart
  /// from the `additional_properties` flag.
  pub fn diff(&self, other: &SchemaDefinition) -> Vec<String> {
    let mut names: Vec<&String> = self.properties.keys().chain(other.properties.keys()).collect();
    names.extend(self.required.iter().chain(other.required.iter()));
    names.sort();
    names.dedup();

    names
      .into_iter()
      .filter(|n| {
        self.properties.get(*n) != other.properties.get(*n)
          || self.is_required(n) != other.is_required(n)
      })
      .cloned()
      .collect()
  }

  pub fn to_json(&self) -> serde_json::Result<String> {
    serde_json::to_string(self)
  }

  pub fn from_json(s: &str) -> serde_json::Result<Self> {
    serde_json::from_str(s)
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// The authoritative source of the post schema.
pub struct SchemaRegistry;

impl SchemaRegistry {
  /// The definition new collections are created with and live collections
  /// are reconciled against.
  pub fn current() -> SchemaDefinition {
    fn names<T: Copy>(all: &[T], f: fn(T) -> &'static str) -> Vec<&'static str> {
      all.iter().copied().map(f).collect()
    }

    // Counts and ids are the store's 32-bit `int`.
    fn counter() -> FieldRule {
      FieldRule::int().minimum(0).maximum(i64::from(i32::MAX))
    }

    let properties = BTreeMap::from([
      (field::POST_ID.to_owned(), counter()),
      (
        field::PLATFORM.to_owned(),
        FieldRule::string().one_of(names(Platform::ALL, Platform::as_str)),
      ),
      (
        field::POST_TYPE.to_owned(),
        FieldRule::string().one_of(names(PostType::ALL, PostType::as_str)),
      ),
      (
        field::SENTIMENT_SCORE.to_owned(),
        FieldRule::string().one_of(names(Sentiment::ALL, Sentiment::as_str)),
      ),
      (field::LIKES.to_owned(), counter()),
      (field::COMMENTS.to_owned(), counter()),
      (field::SHARES.to_owned(), counter()),
      (field::POST_TIME.to_owned(), FieldRule::string().min_length(1)),
      (field::POSTED_DATE.to_owned(), FieldRule::string()),
      (field::POSTED_TIME.to_owned(), FieldRule::string()),
      (
        field::POSTED_DAY_OF_WEEK.to_owned(),
        FieldRule::string().one_of(names(DayOfWeek::ALL, DayOfWeek::as_str)),
      ),
      (
        field::POSTED_MONTH.to_owned(),
        FieldRule::string().one_of(names(Month::ALL, Month::as_str)),
      ),
    ]);

    let required = [
      field::PLATFORM,
      field::POST_TYPE,
      field::SENTIMENT_SCORE,
      field::LIKES,
      field::COMMENTS,
      field::SHARES,
      field::POST_TIME,
      field::POSTED_DATE,
      field::POSTED_TIME,
      field::POSTED_DAY_OF_WEEK,
      field::POSTED_MONTH,
    ]
    .into_iter()
    .map(str::to_owned)
    .collect();

    SchemaDefinition { required, properties, additional_properties: false }
  }
}
