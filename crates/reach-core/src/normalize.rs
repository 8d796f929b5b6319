//! Timestamp normalizer.
//!
//! Turns one raw, format-ambiguous `post_time` value into a canonical
//! ISO-8601 string plus the four derived fields. Parsing is attempted in a
//! fixed order and never fails outright: an unparseable value yields the
//! sentinel bundle and a logged [`ParseFallback`].

use chrono::{DateTime, Datelike as _, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::post::{DayOfWeek, Document, Month, field};

/// Tabular-import convention, e.g. `8/17/2023 14:45`. Tried first.
pub const TABULAR_FORMAT: &str = "%m/%d/%Y %H:%M";
/// Strict ISO-8601 without offset, e.g. `2023-08-17T14:45:00`. Tried second.
pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub const CANONICAL_FORMAT: &str = ISO_FORMAT;
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Naive layouts accepted by free-form detection. Each is unambiguous with
/// respect to day/month order.
const FREE_FORM_DATETIMES: &[&str] = &[
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%d %H:%M",
  "%m/%d/%Y %H:%M:%S",
  "%Y/%m/%d %H:%M:%S",
  "%Y/%m/%d %H:%M",
  "%B %d, %Y %H:%M",
  "%b %d, %Y %H:%M",
  "%d %B %Y %H:%M",
  "%d %b %Y %H:%M",
];

const FREE_FORM_DATES: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%d %B %Y"];

// ─── Result types ────────────────────────────────────────────────────────────

/// Which strategy produced a successful parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
  Tabular,
  Iso8601,
  FreeForm,
}

/// Diagnostic record of a value no strategy could parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFallback {
  pub raw:       String,
  pub attempted: Vec<String>,
}

/// Canonical timestamp plus derived fields. All string-typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedTimestamp {
  pub post_time:          String,
  pub posted_date:        String,
  pub posted_time:        String,
  pub posted_day_of_week: DayOfWeek,
  pub posted_month:       Month,
  pub format:             Option<TimestampFormat>,
  pub fallback:           Option<ParseFallback>,
}

impl NormalizedTimestamp {
  fn parsed(dt: NaiveDateTime, format: TimestampFormat) -> Self {
    Self {
      post_time:          dt.format(CANONICAL_FORMAT).to_string(),
      posted_date:        dt.format(DATE_FORMAT).to_string(),
      posted_time:        dt.format(TIME_FORMAT).to_string(),
      posted_day_of_week: dt.weekday().into(),
      posted_month:       Month::from_number(dt.month()),
      format:             Some(format),
      fallback:           None,
    }
  }

  fn sentinel(raw: &str) -> Self {
    Self {
      post_time:          raw.to_owned(),
      posted_date:        String::new(),
      posted_time:        String::new(),
      posted_day_of_week: DayOfWeek::Unknown,
      posted_month:       Month::Unknown,
      format:             None,
      fallback:           Some(ParseFallback {
        raw:       raw.to_owned(),
        attempted: vec![TABULAR_FORMAT.to_owned(), ISO_FORMAT.to_owned(), "free-form".to_owned()],
      }),
    }
  }

  pub fn is_fallback(&self) -> bool {
    self.fallback.is_some()
  }

  /// Write the canonical and derived fields into `doc`.
  pub fn write_into(&self, doc: &mut Document) {
    use serde_json::Value;
    doc.insert(field::POST_TIME.into(), Value::from(self.post_time.as_str()));
    doc.insert(field::POSTED_DATE.into(), Value::from(self.posted_date.as_str()));
    doc.insert(field::POSTED_TIME.into(), Value::from(self.posted_time.as_str()));
    doc.insert(
      field::POSTED_DAY_OF_WEEK.into(),
      Value::from(self.posted_day_of_week.as_str()),
    );
    doc.insert(field::POSTED_MONTH.into(), Value::from(self.posted_month.as_str()));
  }
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Normalize a single raw timestamp. Never fails.
pub fn normalize_timestamp(raw: &str) -> NormalizedTimestamp {
  let trimmed = raw.trim();

  if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, TABULAR_FORMAT) {
    return NormalizedTimestamp::parsed(dt, TimestampFormat::Tabular);
  }
  if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, ISO_FORMAT) {
    return NormalizedTimestamp::parsed(dt, TimestampFormat::Iso8601);
  }
  if let Some(dt) = parse_free_form(trimmed) {
    return NormalizedTimestamp::parsed(dt, TimestampFormat::FreeForm);
  }

  let out = NormalizedTimestamp::sentinel(trimmed);
  tracing::warn!(
    raw = %raw,
    attempted = ?out.fallback.as_ref().map(|f| &f.attempted),
    "timestamp parse fallback; derived fields set to sentinels"
  );
  out
}

/// Best-effort detection over offset-aware and unambiguous naive layouts.
/// Offset-aware inputs are converted to UTC.
fn parse_free_form(s: &str) -> Option<NaiveDateTime> {
  if s.is_empty() {
    return None;
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc).naive_utc());
  }
  if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
    return Some(dt.with_timezone(&Utc).naive_utc());
  }
  FREE_FORM_DATETIMES
    .iter()
    .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
    .or_else(|| {
      FREE_FORM_DATES
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

/// Normalize the `post_time` field of a candidate record in place.
///
/// A missing or non-string `post_time` is left untouched so the validator
/// reports it; `None` is returned in that case.
pub fn normalize_document(doc: &mut Document) -> Option<NormalizedTimestamp> {
  let raw = doc.get(field::POST_TIME)?.as_str()?.to_owned();
  let normalized = normalize_timestamp(&raw);
  normalized.write_into(doc);
  Some(normalized)
}
