//! The `PostStore` trait, the store gateway abstraction.
//!
//! Implemented by storage backends (e.g. `reach-store-sqlite`). The importer,
//! scheduler and analytics layers depend on this trait, never on a concrete
//! backend. Only implementations of this trait change connection state or
//! issue schema-altering operations.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  Classify,
  aggregate::{Filter, GroupRow, PipelineSpec},
  post::{Post, PostUpdate},
  schema::SchemaDefinition,
};

// ─── Schema lifecycle ────────────────────────────────────────────────────────

/// Where the gateway stands with respect to the live collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaState {
  Disconnected,
  /// Connected, but the collection does not exist yet.
  NoCollection,
  /// The live validator equals the desired definition.
  SchemaCurrent,
  /// The live validator differs from the desired definition.
  SchemaStale,
}

/// What [`PostStore::ensure_schema`] had to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SchemaOutcome {
  Created,
  AlreadyCurrent,
  /// Schema drift was reconciled by dropping and recreating the collection.
  Recreated {
    dropped_documents: u64,
    changed_fields:    Vec<String>,
  },
}

/// Liveness signal for the excluded routing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
  pub reachable:    bool,
  pub record_count: Option<u64>,
  pub schema:       SchemaState,
  pub detail:       String,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a post document store.
///
/// All methods return `Send` futures so the trait can be driven from
/// background tasks on a multi-threaded tokio runtime.
pub trait PostStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Connection ────────────────────────────────────────────────────────

  /// Open the endpoint and run a liveness probe. Idempotent.
  fn connect(&self) -> impl Future<Output = Result<SchemaState, Self::Error>> + Send + '_;

  fn disconnect(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn schema_state(&self) -> impl Future<Output = Result<SchemaState, Self::Error>> + Send + '_;

  // ── Schema ────────────────────────────────────────────────────────────

  /// Bring the live collection in line with the desired definition.
  ///
  /// A stale collection is dropped and recreated; its documents are lost.
  fn ensure_schema(&self) -> impl Future<Output = Result<SchemaOutcome, Self::Error>> + Send + '_;

  /// The validator the live collection currently enforces, if it exists.
  fn enforced_schema(
    &self,
  ) -> impl Future<Output = Result<Option<SchemaDefinition>, Self::Error>> + Send + '_;

  /// Drop the collection and all of its documents.
  fn drop_collection(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Drop and recreate the collection with the desired definition in one
  /// step. Returns the number of documents discarded.
  fn reset(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Write all `posts` or none. Every post is re-validated against the
  /// enforced schema; one failure rejects the call.
  fn bulk_insert(
    &self,
    posts: Vec<Post>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Overwrite fields of the post with `post_id`. Returns `false` if no such
  /// post exists.
  fn update_post(
    &self,
    post_id: u64,
    update: PostUpdate,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Delete the post with `post_id`. Returns `false` if no such post exists.
  fn delete_post(&self, post_id: u64) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_post(&self, post_id: u64) -> impl Future<Output = Result<Option<Post>, Self::Error>> + Send + '_;

  fn list_posts<'a>(
    &'a self,
    filter: &'a Filter,
    limit: Option<usize>,
  ) -> impl Future<Output = Result<Vec<Post>, Self::Error>> + Send + 'a;

  fn count(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Highest `post_id` in the collection, or 0 when there is none.
  fn max_post_id(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Execute a read-only aggregation pipeline.
  fn aggregate<'a>(
    &'a self,
    spec: &'a PipelineSpec,
  ) -> impl Future<Output = Result<Vec<GroupRow>, Self::Error>> + Send + 'a;

  /// Reachability plus record count. Never fails; problems go in `detail`.
  fn health(&self) -> impl Future<Output = Health> + Send + '_;
}
