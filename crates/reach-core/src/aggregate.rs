//! Named aggregation pipelines and their grouped result rows.
//!
//! A [`PipelineSpec`] is an [`Aggregation`] plus an optional pre-filter
//! stage. Backends compile it into whatever their query language is; every
//! pipeline is read-only.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::post::{Platform, PostType, Sentiment, field};

/// Engagement counter a per-date average is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
  Likes,
  Comments,
  Shares,
}

impl Metric {
  pub fn field(self) -> &'static str {
    match self {
      Metric::Likes => field::LIKES,
      Metric::Comments => field::COMMENTS,
      Metric::Shares => field::SHARES,
    }
  }
}

/// A categorical field posts can be counted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
  Platform,
  PostType,
  Sentiment,
  DayOfWeek,
  Month,
}

impl Dimension {
  pub fn field(self) -> &'static str {
    match self {
      Dimension::Platform => field::PLATFORM,
      Dimension::PostType => field::POST_TYPE,
      Dimension::Sentiment => field::SENTIMENT_SCORE,
      Dimension::DayOfWeek => field::POSTED_DAY_OF_WEEK,
      Dimension::Month => field::POSTED_MONTH,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "by", rename_all = "snake_case")]
pub enum Aggregation {
  /// Total likes/comments/shares per platform, highest engagement first.
  PlatformEngagement,
  /// Post count per (platform, sentiment).
  SentimentByPlatform,
  /// Post count per (post type, sentiment).
  SentimentByPostType,
  /// Average of one metric per (posted date, platform), oldest date first.
  /// Posts whose date could not be derived are left out.
  AverageByDatePlatform(Metric),
  /// Total and average shares per post type, most shared first.
  SharesByPostType,
  /// Counts and totals per platform → post type → sentiment.
  DecompositionTree,
  /// Average engagement per weekday, Monday first.
  EngagementByDay,
  /// Post count per value of one dimension, largest first.
  CountBy(Dimension),
  /// Collection-wide averages and post count; no rows when empty.
  EngagementSummary,
}

// ─── Filter ──────────────────────────────────────────────────────────────────

/// Optional pre-filter stage; `None` fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
  pub platform:  Option<Platform>,
  pub post_type: Option<PostType>,
  pub sentiment: Option<Sentiment>,
  /// Inclusive lower bound on `posted_date`.
  pub date_from: Option<NaiveDate>,
  /// Inclusive upper bound on `posted_date`.
  pub date_to:   Option<NaiveDate>,
}

impl Filter {
  pub fn is_empty(&self) -> bool {
    *self == Filter::default()
  }

  pub fn platform(mut self, p: Platform) -> Self {
    self.platform = Some(p);
    self
  }

  pub fn post_type(mut self, t: PostType) -> Self {
    self.post_type = Some(t);
    self
  }

  pub fn sentiment(mut self, s: Sentiment) -> Self {
    self.sentiment = Some(s);
    self
  }

  pub fn between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
    self.date_from = from;
    self.date_to = to;
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
  pub aggregation: Aggregation,
  #[serde(default)]
  pub filter:      Filter,
}

impl PipelineSpec {
  pub fn new(aggregation: Aggregation) -> Self {
    Self { aggregation, filter: Filter::default() }
  }

  pub fn filtered(mut self, filter: Filter) -> Self {
    self.filter = filter;
    self
  }
}

impl From<Aggregation> for PipelineSpec {
  fn from(aggregation: Aggregation) -> Self {
    Self::new(aggregation)
  }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// One grouped result: dimension values mapped to numeric summaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRow {
  pub dimensions: BTreeMap<String, String>,
  pub measures:   BTreeMap<String, f64>,
}

impl GroupRow {
  pub fn dimension(&self, name: &str) -> Option<&str> {
    self.dimensions.get(name).map(String::as_str)
  }

  pub fn measure(&self, name: &str) -> Option<f64> {
    self.measures.get(name).copied()
  }
}
