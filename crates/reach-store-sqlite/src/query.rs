//! Compiles [`PipelineSpec`]s into SQL over the JSON document bodies.
//!
//! Every identifier that reaches the SQL text comes from a fixed field
//! constant; user-supplied values are always bound parameters.

use reach_core::{
  aggregate::{Aggregation, Dimension, Filter, Metric, PipelineSpec},
  post::{DayOfWeek, field},
};
use rusqlite::types::Value as SqlValue;

/// `json_extract` over the document body.
pub fn jx(name: &str) -> String {
  format!("json_extract(body, '$.{name}')")
}

/// A ready-to-run statement plus the shape of its result rows.
#[derive(Debug)]
pub struct CompiledQuery {
  pub sql:        String,
  pub params:     Vec<SqlValue>,
  pub dimensions: Vec<&'static str>,
  pub measures:   Vec<&'static str>,
}

// ─── Filter stage ────────────────────────────────────────────────────────────

/// Conditions scoping a query to one collection and an optional filter.
pub struct Conditions {
  pub clauses: Vec<String>,
  pub params:  Vec<SqlValue>,
}

impl Conditions {
  pub fn new(collection: &str, filter: &Filter) -> Self {
    let mut c = Self {
      clauses: vec!["collection = ?".to_owned()],
      params:  vec![SqlValue::Text(collection.to_owned())],
    };

    if let Some(p) = filter.platform {
      c.push_eq(field::PLATFORM, p.as_str());
    }
    if let Some(t) = filter.post_type {
      c.push_eq(field::POST_TYPE, t.as_str());
    }
    if let Some(s) = filter.sentiment {
      c.push_eq(field::SENTIMENT_SCORE, s.as_str());
    }
    if filter.date_from.is_some() || filter.date_to.is_some() {
      c.require_date();
    }
    if let Some(from) = filter.date_from {
      c.clauses.push(format!("{} >= ?", jx(field::POSTED_DATE)));
      c.params.push(SqlValue::Text(from.format("%Y-%m-%d").to_string()));
    }
    if let Some(to) = filter.date_to {
      c.clauses.push(format!("{} <= ?", jx(field::POSTED_DATE)));
      c.params.push(SqlValue::Text(to.format("%Y-%m-%d").to_string()));
    }
    c
  }

  fn push_eq(&mut self, name: &str, value: &str) {
    self.clauses.push(format!("{} = ?", jx(name)));
    self.params.push(SqlValue::Text(value.to_owned()));
  }

  /// Exclude documents whose date could not be derived.
  fn require_date(&mut self) {
    let clause = format!("{} != ''", jx(field::POSTED_DATE));
    if !self.clauses.contains(&clause) {
      self.clauses.push(clause);
    }
  }

  pub fn where_sql(&self) -> String {
    self.clauses.join(" AND ")
  }
}

// ─── Aggregation plans ───────────────────────────────────────────────────────

struct Plan {
  dimensions: Vec<(&'static str, String)>,
  measures:   Vec<(&'static str, String)>,
  order_by:   Vec<String>,
  dated:      bool,
}

fn dim(name: &'static str) -> (&'static str, String) {
  (name, format!("COALESCE({}, '')", jx(name)))
}

fn count(label: &'static str) -> (&'static str, String) {
  (label, "COUNT(*)".to_owned())
}

/// `TOTAL` sums in floating point, so large counts cannot overflow.
fn sum(label: &'static str, name: &str) -> (&'static str, String) {
  (label, format!("TOTAL({})", jx(name)))
}

fn avg(label: &'static str, name: &str) -> (&'static str, String) {
  (label, format!("COALESCE(AVG({}), 0.0)", jx(name)))
}

fn total_engagement() -> (&'static str, String) {
  (
    "total_engagement",
    format!(
      "TOTAL({} + {} + {})",
      jx(field::LIKES),
      jx(field::COMMENTS),
      jx(field::SHARES)
    ),
  )
}

fn weekday_order() -> String {
  let arms: String = DayOfWeek::ALL
    .iter()
    .enumerate()
    .map(|(i, d)| format!(" WHEN '{}' THEN {i}", d.as_str()))
    .collect();
  format!("CASE {}{arms} END", jx(field::POSTED_DAY_OF_WEEK))
}

fn plan(aggregation: Aggregation) -> Plan {
  use field::*;

  match aggregation {
    Aggregation::PlatformEngagement => Plan {
      dimensions: vec![dim(PLATFORM)],
      measures:   vec![
        sum("total_likes", LIKES),
        sum("total_comments", COMMENTS),
        sum("total_shares", SHARES),
        total_engagement(),
        count("post_count"),
      ],
      order_by:   vec!["total_engagement DESC".into(), "platform ASC".into()],
      dated:      false,
    },
    Aggregation::SentimentByPlatform => Plan {
      dimensions: vec![dim(PLATFORM), dim(SENTIMENT_SCORE)],
      measures:   vec![count("count")],
      order_by:   vec!["platform ASC".into(), "sentiment_score ASC".into()],
      dated:      false,
    },
    Aggregation::SentimentByPostType => Plan {
      dimensions: vec![dim(POST_TYPE), dim(SENTIMENT_SCORE)],
      measures:   vec![count("count")],
      order_by:   vec!["post_type ASC".into(), "sentiment_score ASC".into()],
      dated:      false,
    },
    Aggregation::AverageByDatePlatform(metric) => {
      let label = match metric {
        Metric::Likes => "average_likes",
        Metric::Comments => "average_comments",
        Metric::Shares => "average_shares",
      };
      Plan {
        dimensions: vec![dim(POSTED_DATE), dim(PLATFORM)],
        measures:   vec![avg(label, metric.field()), count("post_count")],
        order_by:   vec!["posted_date ASC".into(), "platform ASC".into()],
        dated:      true,
      }
    }
    Aggregation::SharesByPostType => Plan {
      dimensions: vec![dim(POST_TYPE)],
      measures:   vec![
        sum("total_shares", SHARES),
        avg("average_shares", SHARES),
        count("total_posts"),
      ],
      order_by:   vec!["total_shares DESC".into(), "post_type ASC".into()],
      dated:      false,
    },
    Aggregation::DecompositionTree => Plan {
      dimensions: vec![dim(PLATFORM), dim(POST_TYPE), dim(SENTIMENT_SCORE)],
      measures:   vec![
        count("total_posts"),
        sum("total_likes", LIKES),
        sum("total_comments", COMMENTS),
        sum("total_shares", SHARES),
      ],
      order_by:   vec![
        "platform ASC".into(),
        "post_type ASC".into(),
        "sentiment_score ASC".into(),
      ],
      dated:      false,
    },
    Aggregation::EngagementByDay => Plan {
      dimensions: vec![dim(POSTED_DAY_OF_WEEK)],
      measures:   vec![
        avg("average_likes", LIKES),
        avg("average_comments", COMMENTS),
        avg("average_shares", SHARES),
        count("post_count"),
      ],
      order_by:   vec![weekday_order()],
      dated:      false,
    },
    Aggregation::CountBy(dimension) => {
      let name = match dimension {
        Dimension::Platform => PLATFORM,
        Dimension::PostType => POST_TYPE,
        Dimension::Sentiment => SENTIMENT_SCORE,
        Dimension::DayOfWeek => POSTED_DAY_OF_WEEK,
        Dimension::Month => POSTED_MONTH,
      };
      Plan {
        dimensions: vec![dim(name)],
        measures:   vec![count("count")],
        order_by:   vec!["count DESC".into(), format!("{name} ASC")],
        dated:      false,
      }
    }
    Aggregation::EngagementSummary => Plan {
      dimensions: vec![],
      measures:   vec![
        avg("average_likes", LIKES),
        avg("average_comments", COMMENTS),
        avg("average_shares", SHARES),
        count("total_posts"),
      ],
      order_by:   vec![],
      dated:      false,
    },
  }
}

/// Compile `spec` against `collection`.
pub fn compile(collection: &str, spec: &PipelineSpec) -> CompiledQuery {
  let plan = plan(spec.aggregation);
  let mut conditions = Conditions::new(collection, &spec.filter);
  if plan.dated {
    conditions.require_date();
  }

  let select = plan
    .dimensions
    .iter()
    .chain(plan.measures.iter())
    .map(|(label, expr)| format!("{expr} AS {label}"))
    .collect::<Vec<_>>()
    .join(", ");

  let mut sql = format!("SELECT {select} FROM documents WHERE {}", conditions.where_sql());
  if plan.dimensions.is_empty() {
    // A global aggregate over nothing yields no row, not a row of zeros.
    sql.push_str(" HAVING COUNT(*) > 0");
  } else {
    let group_by = plan
      .dimensions
      .iter()
      .map(|(_, expr)| expr.as_str())
      .collect::<Vec<_>>()
      .join(", ");
    sql.push_str(&format!(" GROUP BY {group_by}"));
  }
  if !plan.order_by.is_empty() {
    sql.push_str(&format!(" ORDER BY {}", plan.order_by.join(", ")));
  }

  CompiledQuery {
    sql,
    params: conditions.params,
    dimensions: plan.dimensions.iter().map(|(l, _)| *l).collect(),
    measures: plan.measures.iter().map(|(l, _)| *l).collect(),
  }
}
