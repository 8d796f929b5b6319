//! Post record: the unit of storage.
//!
//! A post is written once by the importer or the scheduler and afterwards
//! only changed through an explicit [`PostUpdate`]. Every date-derived field
//! is a plain string; no native date or time value ever reaches the store.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A loosely typed candidate record, as read from a tabular row or produced
/// by the synthetic generator, before normalization and validation.
pub type Document = serde_json::Map<String, serde_json::Value>;

// ─── Field names ─────────────────────────────────────────────────────────────

pub mod field {
  pub const POST_ID: &str = "post_id";
  pub const PLATFORM: &str = "platform";
  pub const POST_TYPE: &str = "post_type";
  pub const SENTIMENT_SCORE: &str = "sentiment_score";
  pub const LIKES: &str = "likes";
  pub const COMMENTS: &str = "comments";
  pub const SHARES: &str = "shares";
  pub const POST_TIME: &str = "post_time";
  pub const POSTED_DATE: &str = "posted_date";
  pub const POSTED_TIME: &str = "posted_time";
  pub const POSTED_DAY_OF_WEEK: &str = "posted_day_of_week";
  pub const POSTED_MONTH: &str = "posted_month";
}

// ─── Enumerations ────────────────────────────────────────────────────────────

macro_rules! wire_enum {
  (
    $(#[$meta:meta])*
    $name:ident, $label:literal { $($variant:ident => $wire:literal),+ $(,)? }
  ) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub enum $name {
      $(#[serde(rename = $wire)] $variant),+
    }

    impl $name {
      pub const ALL: &'static [$name] = &[$($name::$variant),+];

      pub fn as_str(self) -> &'static str {
        match self {
          $($name::$variant => $wire),+
        }
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl FromStr for $name {
      type Err = Error;

      fn from_str(s: &str) -> Result<Self> {
        match s {
          $($wire => Ok($name::$variant),)+
          other => Err(Error::UnknownVariant { kind: $label, value: other.to_owned() }),
        }
      }
    }
  };
}

wire_enum! {
  /// Social network the post was published on.
  Platform, "platform" {
    Facebook => "Facebook",
    Twitter => "Twitter",
    LinkedIn => "LinkedIn",
    Instagram => "Instagram",
  }
}

wire_enum! {
  PostType, "post type" {
    Text => "text",
    Image => "image",
    Video => "video",
    Poll => "poll",
    Carousel => "carousel",
    Story => "story",
  }
}

wire_enum! {
  Sentiment, "sentiment" {
    Positive => "positive",
    Negative => "negative",
    Neutral => "neutral",
  }
}

wire_enum! {
  /// Weekday derived from `post_time`; `Unknown` when derivation failed.
  DayOfWeek, "day of week" {
    Monday => "Monday",
    Tuesday => "Tuesday",
    Wednesday => "Wednesday",
    Thursday => "Thursday",
    Friday => "Friday",
    Saturday => "Saturday",
    Sunday => "Sunday",
    Unknown => "Unknown",
  }
}

wire_enum! {
  /// Calendar month derived from `post_time`; `Unknown` when derivation failed.
  Month, "month" {
    January => "January",
    February => "February",
    March => "March",
    April => "April",
    May => "May",
    June => "June",
    July => "July",
    August => "August",
    September => "September",
    October => "October",
    November => "November",
    December => "December",
    Unknown => "Unknown",
  }
}

impl From<chrono::Weekday> for DayOfWeek {
  fn from(w: chrono::Weekday) -> Self {
    match w {
      chrono::Weekday::Mon => DayOfWeek::Monday,
      chrono::Weekday::Tue => DayOfWeek::Tuesday,
      chrono::Weekday::Wed => DayOfWeek::Wednesday,
      chrono::Weekday::Thu => DayOfWeek::Thursday,
      chrono::Weekday::Fri => DayOfWeek::Friday,
      chrono::Weekday::Sat => DayOfWeek::Saturday,
      chrono::Weekday::Sun => DayOfWeek::Sunday,
    }
  }
}

impl Month {
  /// Month for a 1-based month number; anything out of range is `Unknown`.
  pub fn from_number(n: u32) -> Self {
    Month::ALL
      .get(n.wrapping_sub(1) as usize)
      .copied()
      .filter(|m| *m != Month::Unknown)
      .unwrap_or(Month::Unknown)
  }
}

// ─── Post ────────────────────────────────────────────────────────────────────

/// A validated, persisted engagement record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub post_id:            Option<u64>,
  pub platform:           Platform,
  pub post_type:          PostType,
  pub sentiment_score:    Sentiment,
  pub likes:              u64,
  pub comments:           u64,
  pub shares:             u64,
  /// Canonical ISO-8601 timestamp; the source of truth for ordering.
  pub post_time:          String,
  /// `YYYY-MM-DD`, recomputed from `post_time`; empty after a parse fallback.
  pub posted_date:        String,
  /// `HH:MM:SS`, recomputed from `post_time`; empty after a parse fallback.
  pub posted_time:        String,
  pub posted_day_of_week: DayOfWeek,
  pub posted_month:       Month,
}

impl Post {
  /// The document form handed to the store.
  pub fn to_document(&self) -> Result<Document> {
    Ok(serde_json::from_value(serde_json::to_value(self)?)?)
  }

  pub fn from_document(doc: Document) -> Result<Self> {
    Ok(serde_json::from_value(serde_json::Value::Object(doc))?)
  }
}

// ─── PostUpdate ──────────────────────────────────────────────────────────────

/// Field-wise overwrite of an existing post, addressed by `post_id`.
///
/// Setting `post_time` re-derives every date field; the derived fields
/// themselves cannot be written directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostUpdate {
  pub platform:        Option<Platform>,
  pub post_type:       Option<PostType>,
  pub sentiment_score: Option<Sentiment>,
  pub likes:           Option<u64>,
  pub comments:        Option<u64>,
  pub shares:          Option<u64>,
  pub post_time:       Option<String>,
}

impl PostUpdate {
  pub fn is_empty(&self) -> bool {
    *self == PostUpdate::default()
  }

  /// Overwrite the set fields in `doc`. Returns `true` when `post_time`
  /// changed and the derived fields need recomputing.
  pub fn apply_to(&self, doc: &mut Document) -> bool {
    use serde_json::Value;

    if let Some(p) = self.platform {
      doc.insert(field::PLATFORM.into(), Value::from(p.as_str()));
    }
    if let Some(t) = self.post_type {
      doc.insert(field::POST_TYPE.into(), Value::from(t.as_str()));
    }
    if let Some(s) = self.sentiment_score {
      doc.insert(field::SENTIMENT_SCORE.into(), Value::from(s.as_str()));
    }
    if let Some(n) = self.likes {
      doc.insert(field::LIKES.into(), Value::from(n));
    }
    if let Some(n) = self.comments {
      doc.insert(field::COMMENTS.into(), Value::from(n));
    }
    if let Some(n) = self.shares {
      doc.insert(field::SHARES.into(), Value::from(n));
    }
    match &self.post_time {
      Some(t) => {
        doc.insert(field::POST_TIME.into(), Value::from(t.as_str()));
        true
      }
      None => false,
    }
  }
}
