//! Synthetic engagement records.
//!
//! Engagement magnitudes are drawn from per-platform ranges and scaled by a
//! per-post-type multiplier. Posting hours follow a weighting that favours
//! business hours, and sentiment leans positive as engagement grows. Output
//! rows use the same wire format as the tabular source, so they take the
//! normalizer's first parse path.

use std::ops::RangeInclusive;

use chrono::{Duration, NaiveDateTime, Timelike as _, Utc};
use rand::{Rng, SeedableRng, distributions::WeightedIndex, prelude::Distribution, rngs::StdRng};
use reach_core::post::{Document, Platform, PostType, Sentiment, field};
use serde_json::Value;

use crate::{Error, Result};

/// The tabular source's timestamp layout, without zero padding.
pub const WIRE_FORMAT: &str = "%-m/%-d/%Y %H:%M";

/// Relative posting likelihood for each hour of the day, midnight first.
pub const BUSINESS_HOURS: [f64; 24] = [
  0.1, 0.05, 0.05, 0.05, 0.05, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, //
  0.8, 0.9, 1.0, 0.9, 0.8, 0.7, 0.6, 0.5, 0.4, 0.3, 0.2, 0.1,
];

/// How far back generated timestamps may reach.
const LOOKBACK_DAYS: i64 = 365;

struct Ranges {
  likes:    RangeInclusive<u64>,
  comments: RangeInclusive<u64>,
  shares:   RangeInclusive<u64>,
}

fn platform_ranges(platform: Platform) -> Ranges {
  match platform {
    Platform::Facebook => Ranges { likes: 50..=800, comments: 10..=200, shares: 5..=150 },
    Platform::Twitter => Ranges { likes: 20..=500, comments: 5..=100, shares: 10..=300 },
    Platform::Instagram => Ranges { likes: 100..=1000, comments: 15..=250, shares: 2..=50 },
    Platform::LinkedIn => Ranges { likes: 30..=400, comments: 8..=120, shares: 15..=200 },
  }
}

/// (likes, comments, shares) multipliers.
fn post_type_multipliers(post_type: PostType) -> (f64, f64, f64) {
  match post_type {
    PostType::Text => (0.8, 1.2, 0.9),
    PostType::Image => (1.3, 1.0, 1.1),
    PostType::Video => (1.5, 1.3, 1.4),
    PostType::Poll => (1.1, 1.5, 0.8),
    PostType::Carousel => (1.2, 1.1, 1.2),
    PostType::Story => (0.9, 0.7, 0.6),
  }
}

/// Sampling order for the sentiment tiers below.
const SENTIMENTS: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Negative, Sentiment::Neutral];

const HIGH_ENGAGEMENT: [f64; 3] = [0.7, 0.1, 0.2];
const MEDIUM_ENGAGEMENT: [f64; 3] = [0.5, 0.2, 0.3];
const LOW_ENGAGEMENT: [f64; 3] = [0.3, 0.3, 0.4];

// ─── Generator ───────────────────────────────────────────────────────────────

pub struct SyntheticGenerator {
  rng:       StdRng,
  hours:     WeightedIndex<f64>,
  sentiment: [WeightedIndex<f64>; 3],
  anchor:    Option<NaiveDateTime>,
}

impl SyntheticGenerator {
  /// A generator seeded from the operating system.
  pub fn from_entropy() -> Result<Self> {
    Self::new(StdRng::from_entropy(), &BUSINESS_HOURS)
  }

  /// A reproducible generator.
  pub fn seeded(seed: u64) -> Result<Self> {
    Self::new(StdRng::seed_from_u64(seed), &BUSINESS_HOURS)
  }

  pub fn new(rng: StdRng, hour_weights: &[f64; 24]) -> Result<Self> {
    let weights = |w: &[f64]| {
      WeightedIndex::new(w).map_err(|e| Error::Config(format!("invalid generator weights: {e}")))
    };
    Ok(Self {
      rng,
      hours: weights(&hour_weights[..])?,
      sentiment: [
        weights(&HIGH_ENGAGEMENT[..])?,
        weights(&MEDIUM_ENGAGEMENT[..])?,
        weights(&LOW_ENGAGEMENT[..])?,
      ],
      anchor: None,
    })
  }

  /// Generate timestamps relative to `anchor` instead of the current time.
  pub fn anchored_at(mut self, anchor: NaiveDateTime) -> Self {
    self.anchor = Some(anchor);
    self
  }

  /// A batch size drawn uniformly from `bounds`.
  pub fn batch_size(&mut self, bounds: RangeInclusive<usize>) -> usize {
    if bounds.is_empty() {
      return *bounds.start();
    }
    self.rng.gen_range(bounds)
  }

  /// `count` raw records with consecutive ids starting at `first_post_id`.
  pub fn generate(&mut self, count: usize, first_post_id: u64) -> Vec<Document> {
    let now = self.anchor.unwrap_or_else(|| Utc::now().naive_utc());
    (0..count as u64).map(|i| self.record(first_post_id + i, now)).collect()
  }

  fn record(&mut self, post_id: u64, now: NaiveDateTime) -> Document {
    let platform = Platform::ALL[self.rng.gen_range(0..Platform::ALL.len())];
    let post_type = PostType::ALL[self.rng.gen_range(0..PostType::ALL.len())];

    let ranges = platform_ranges(platform);
    let (lm, cm, sm) = post_type_multipliers(post_type);
    let likes = self.scaled(ranges.likes, lm);
    let comments = self.scaled(ranges.comments, cm);
    let shares = self.scaled(ranges.shares, sm);

    let sentiment = self.sentiment(likes + comments + shares);
    let post_time = self.timestamp(now);

    let mut doc = Document::new();
    doc.insert(field::POST_ID.into(), Value::from(post_id));
    doc.insert(field::PLATFORM.into(), Value::from(platform.as_str()));
    doc.insert(field::POST_TYPE.into(), Value::from(post_type.as_str()));
    doc.insert(field::LIKES.into(), Value::from(likes));
    doc.insert(field::COMMENTS.into(), Value::from(comments));
    doc.insert(field::SHARES.into(), Value::from(shares));
    doc.insert(field::POST_TIME.into(), Value::from(post_time.format(WIRE_FORMAT).to_string()));
    doc.insert(field::SENTIMENT_SCORE.into(), Value::from(sentiment.as_str()));
    doc
  }

  fn scaled(&mut self, range: RangeInclusive<u64>, multiplier: f64) -> u64 {
    (self.rng.gen_range(range) as f64 * multiplier).round() as u64
  }

  fn sentiment(&mut self, total_engagement: u64) -> Sentiment {
    let tier = match total_engagement {
      t if t > 500 => 0,
      t if t > 200 => 1,
      _ => 2,
    };
    SENTIMENTS[self.sentiment[tier].sample(&mut self.rng)]
  }

  fn timestamp(&mut self, now: NaiveDateTime) -> NaiveDateTime {
    let days = self.rng.gen_range(0..=LOOKBACK_DAYS);
    let minutes = self.rng.gen_range(0..24 * 60);
    let base = now - Duration::days(days) - Duration::minutes(minutes);
    let hour = self.hours.sample(&mut self.rng) as u32;
    base.with_hour(hour).unwrap_or(base)
  }
}
