//! Aggregation entry points for the visualization layer.
//!
//! Each method names one aggregation; all of them accept a pre-filter and
//! return ordered grouped rows.

use std::sync::Arc;

use reach_core::{
  aggregate::{Aggregation, Dimension, Filter, GroupRow, Metric, PipelineSpec},
  post::{Platform, PostType},
  store::PostStore,
};

use crate::{Error, Result};

pub struct Analytics<S> {
  store: Arc<S>,
}

impl<S> Clone for Analytics<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: PostStore> Analytics<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  pub async fn run(&self, spec: &PipelineSpec) -> Result<Vec<GroupRow>> {
    self.store.aggregate(spec).await.map_err(Error::store)
  }

  async fn named(&self, aggregation: Aggregation, filter: Filter) -> Result<Vec<GroupRow>> {
    self.run(&PipelineSpec::new(aggregation).filtered(filter)).await
  }

  /// Likes, comments, shares and their total per platform, highest total
  /// first.
  pub async fn platform_engagement(&self, filter: Filter) -> Result<Vec<GroupRow>> {
    self.named(Aggregation::PlatformEngagement, filter).await
  }

  pub async fn sentiment_by_platform(&self, filter: Filter) -> Result<Vec<GroupRow>> {
    self.named(Aggregation::SentimentByPlatform, filter).await
  }

  pub async fn sentiment_by_post_type(&self, filter: Filter) -> Result<Vec<GroupRow>> {
    self.named(Aggregation::SentimentByPostType, filter).await
  }

  /// Daily average of `metric` per platform, oldest date first.
  pub async fn average_by_date_platform(&self, metric: Metric, filter: Filter) -> Result<Vec<GroupRow>> {
    self.named(Aggregation::AverageByDatePlatform(metric), filter).await
  }

  pub async fn shares_by_post_type(&self, filter: Filter) -> Result<Vec<GroupRow>> {
    self.named(Aggregation::SharesByPostType, filter).await
  }

  /// Platform, then post type, then sentiment, optionally narrowed to one
  /// platform and/or post type.
  pub async fn decomposition_tree(
    &self,
    platform: Option<Platform>,
    post_type: Option<PostType>,
  ) -> Result<Vec<GroupRow>> {
    let filter = Filter { platform, post_type, ..Filter::default() };
    self.named(Aggregation::DecompositionTree, filter).await
  }

  pub async fn engagement_by_day(&self, filter: Filter) -> Result<Vec<GroupRow>> {
    self.named(Aggregation::EngagementByDay, filter).await
  }

  pub async fn count_by(&self, dimension: Dimension, filter: Filter) -> Result<Vec<GroupRow>> {
    self.named(Aggregation::CountBy(dimension), filter).await
  }

  /// Averages and the post count across the whole (filtered) collection.
  /// `None` when there are no posts.
  pub async fn engagement_summary(&self, filter: Filter) -> Result<Option<GroupRow>> {
    Ok(self.named(Aggregation::EngagementSummary, filter).await?.into_iter().next())
  }
}
