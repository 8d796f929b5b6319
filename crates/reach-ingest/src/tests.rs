//! End-to-end tests for the ingestion drivers against an in-memory store.

use std::{
  io::Write as _,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use reach_core::{
  ErrorKind,
  aggregate::{Filter, GroupRow, Metric, PipelineSpec},
  post::{DayOfWeek, Month, Platform, Post, PostUpdate},
  schema::{FieldRule, SchemaDefinition, SchemaRegistry},
  store::{Health, PostStore, SchemaOutcome, SchemaState},
};
use reach_store_sqlite::{SqliteStore, StoreConfig};

use crate::{
  Analytics, IngestService, SchedulerConfig, SchedulerState,
  generator::SyntheticGenerator,
  scheduler::IngestionScheduler,
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

const THREE_ROWS: &str = "\
post_id,platform,post_type,likes,comments,shares,post_time,sentiment_score
1,Facebook,text,150,25,10,8/17/2023 14:45,positive
2,Twitter,image,75,15,5,8/18/2023 09:30,negative
3,LinkedIn,video,200,40,20,8/19/2023 16:20,neutral
";

fn csv_file(contents: &str) -> tempfile::NamedTempFile {
  let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
  f.write_all(contents.as_bytes()).unwrap();
  f
}

async fn store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

/// An in-memory store whose collection enforces `schema` instead of the
/// registry's definition.
async fn store_enforcing(schema: SchemaDefinition) -> Arc<SqliteStore> {
  let s = SqliteStore::with_schema(StoreConfig::in_memory(), schema);
  s.connect().await.unwrap();
  s.ensure_schema().await.unwrap();
  Arc::new(s)
}

fn service<S: PostStore + 'static>(store: Arc<S>, interval: Duration) -> IngestService<S> {
  let config = SchedulerConfig { interval, batch: 3..=5, max_reported_rejections: 10 };
  IngestService::new(store, config, 10, SyntheticGenerator::seeded(42).unwrap())
}

/// Wait until `cond` holds, polling every few milliseconds.
async fn eventually(mut cond: impl FnMut() -> bool, within: Duration) -> bool {
  let deadline = tokio::time::Instant::now() + within;
  while tokio::time::Instant::now() < deadline {
    if cond() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  cond()
}

// ─── Slow store ──────────────────────────────────────────────────────────────

/// Delegates to a real store but holds every bulk write for `delay`, and
/// records how many writes were ever in progress at once.
struct SlowStore {
  inner:      SqliteStore,
  delay:      Duration,
  active:     AtomicUsize,
  max_active: AtomicUsize,
  writes:     AtomicUsize,
}

impl SlowStore {
  async fn new(delay: Duration) -> Self {
    Self {
      inner: SqliteStore::open_in_memory().await.unwrap(),
      delay,
      active: AtomicUsize::new(0),
      max_active: AtomicUsize::new(0),
      writes: AtomicUsize::new(0),
    }
  }
}

impl PostStore for SlowStore {
  type Error = reach_store_sqlite::Error;

  async fn connect(&self) -> Result<SchemaState, Self::Error> { self.inner.connect().await }

  async fn disconnect(&self) -> Result<(), Self::Error> { self.inner.disconnect().await }

  async fn schema_state(&self) -> Result<SchemaState, Self::Error> { self.inner.schema_state().await }

  async fn ensure_schema(&self) -> Result<SchemaOutcome, Self::Error> {
    self.inner.ensure_schema().await
  }

  async fn enforced_schema(&self) -> Result<Option<SchemaDefinition>, Self::Error> {
    self.inner.enforced_schema().await
  }

  async fn drop_collection(&self) -> Result<u64, Self::Error> { self.inner.drop_collection().await }

  async fn reset(&self) -> Result<u64, Self::Error> { self.inner.reset().await }

  async fn bulk_insert(&self, posts: Vec<Post>) -> Result<usize, Self::Error> {
    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_active.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(self.delay).await;
    let result = self.inner.bulk_insert(posts).await;
    self.active.fetch_sub(1, Ordering::SeqCst);
    self.writes.fetch_add(1, Ordering::SeqCst);
    result
  }

  async fn update_post(&self, post_id: u64, update: PostUpdate) -> Result<bool, Self::Error> {
    self.inner.update_post(post_id, update).await
  }

  async fn delete_post(&self, post_id: u64) -> Result<bool, Self::Error> {
    self.inner.delete_post(post_id).await
  }

  async fn get_post(&self, post_id: u64) -> Result<Option<Post>, Self::Error> {
    self.inner.get_post(post_id).await
  }

  async fn list_posts<'a>(
    &'a self,
    filter: &'a Filter,
    limit: Option<usize>,
  ) -> Result<Vec<Post>, Self::Error> {
    self.inner.list_posts(filter, limit).await
  }

  async fn count(&self) -> Result<u64, Self::Error> { self.inner.count().await }

  async fn max_post_id(&self) -> Result<u64, Self::Error> { self.inner.max_post_id().await }

  async fn aggregate<'a>(&'a self, spec: &'a PipelineSpec) -> Result<Vec<GroupRow>, Self::Error> {
    self.inner.aggregate(spec).await
  }

  async fn health(&self) -> Health { self.inner.health().await }
}

// ─── Bulk import ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_row_import_end_to_end() {
  let s = store().await;
  let svc = service(s.clone(), Duration::from_secs(60));
  let f = csv_file(THREE_ROWS);

  let summary = svc.ingest_from_source(f.path()).await.unwrap();
  assert_eq!(summary.rows_read, 3);
  assert_eq!(summary.rows_accepted, 3);
  assert_eq!(summary.rows_rejected, 0);
  assert_eq!(summary.rows_written, 3);
  assert_eq!(summary.timestamp_fallbacks, 0);

  let posts = s.list_posts(&Filter::default(), None).await.unwrap();
  let dates: Vec<_> = posts.iter().map(|p| p.posted_date.as_str()).collect();
  assert_eq!(dates, vec!["2023-08-17", "2023-08-18", "2023-08-19"]);
  assert!(posts.iter().all(|p| p.posted_day_of_week != DayOfWeek::Unknown));
  assert!(posts.iter().all(|p| p.posted_month == Month::August));
  assert_eq!(posts[1].posted_time, "09:30:00");
}

#[tokio::test]
async fn import_keeps_valid_rows_and_reports_bad_ones() {
  let s = store().await;
  let svc = service(s.clone(), Duration::from_secs(60));
  let f = csv_file(
    "platform,post_type,likes,comments,shares,post_time,sentiment_score\n\
     Facebook,text,1,2,3,1/1/2024 10:00,positive\n\
     Myspace,text,1,2,3,1/1/2024 10:00,positive\n\
     Twitter,poll,-4,2,3,1/1/2024 10:00,neutral\n\
     Twitter,poll,4,2,3,someday,neutral\n",
  );

  let summary = svc.ingest_from_source(f.path()).await.unwrap();
  assert_eq!(summary.rows_read, 4);
  assert_eq!(summary.rows_accepted, 2);
  assert_eq!(summary.rows_rejected, 2);
  assert_eq!(summary.rows_written, 2);
  assert_eq!(summary.timestamp_fallbacks, 1);
  assert_eq!(
    summary.rejection_reasons.iter().map(|r| r.row).collect::<Vec<_>>(),
    vec![1, 2]
  );
  assert!(!summary.rejections_truncated);
  assert_eq!(s.count().await.unwrap(), 2);
}

#[tokio::test]
async fn import_filters_against_the_enforced_schema() {
  let mut strict = SchemaRegistry::current();
  strict.properties.insert("posted_date".into(), FieldRule::string().min_length(10));
  let s = store_enforcing(strict).await;
  let svc = service(s.clone(), Duration::from_secs(60));
  let f = csv_file(
    "platform,post_type,likes,comments,shares,post_time,sentiment_score\n\
     Facebook,text,1,2,3,1/1/2024 10:00,positive\n\
     Twitter,image,4,5,6,1/2/2024 11:30,neutral\n\
     LinkedIn,video,7,8,9,someday,negative\n",
  );

  let summary = svc.ingest_from_source(f.path()).await.unwrap();
  assert_eq!(summary.rows_read, 3);
  assert_eq!(summary.rows_written, 2);
  assert_eq!(summary.rows_rejected, 1);
  assert_eq!(summary.rejection_reasons[0].row, 2);
  assert_eq!(summary.timestamp_fallbacks, 0);
  assert_eq!(s.count().await.unwrap(), 2);
}

#[tokio::test]
async fn rejection_reasons_are_capped() {
  let s = store().await;
  let svc = service(s.clone(), Duration::from_secs(60));
  let mut contents = String::from("platform,post_type,likes,comments,shares,post_time,sentiment_score\n");
  for _ in 0..40 {
    contents.push_str("Nowhere,text,1,1,1,1/1/2024 10:00,positive\n");
  }
  let f = csv_file(&contents);

  let summary = svc.ingest_from_source(f.path()).await.unwrap();
  assert_eq!(summary.rows_rejected, 40);
  assert_eq!(summary.rejection_reasons.len(), 10);
  assert!(summary.rejections_truncated);
  assert_eq!(summary.rows_written, 0);
}

#[tokio::test]
async fn import_into_disconnected_store_is_a_connection_failure() {
  let s = Arc::new(SqliteStore::new(StoreConfig::in_memory()));
  let svc = service(s, Duration::from_secs(60));
  let f = csv_file(THREE_ROWS);

  let err = svc.ingest_from_source(f.path()).await.unwrap_err();
  let payload = crate::FailurePayload::from(&err);
  assert_eq!(payload.kind, ErrorKind::Connection);
}

#[tokio::test]
async fn reset_and_reingest_replaces_contents() {
  let s = store().await;
  let svc = service(s.clone(), Duration::from_secs(60));
  let f = csv_file(THREE_ROWS);

  svc.ingest_from_source(f.path()).await.unwrap();
  svc.ingest_from_source(f.path()).await.unwrap();
  assert_eq!(s.count().await.unwrap(), 6);

  let summary = svc.reset_and_reingest(f.path()).await.unwrap();
  assert_eq!(summary.rows_written, 3);
  assert_eq!(s.count().await.unwrap(), 3);
}

#[tokio::test]
async fn reset_with_missing_source_keeps_data() {
  let s = store().await;
  let svc = service(s.clone(), Duration::from_secs(60));
  let f = csv_file(THREE_ROWS);
  svc.ingest_from_source(f.path()).await.unwrap();

  let err = svc.reset_and_reingest("/nonexistent/source.csv").await.unwrap_err();
  assert_eq!(crate::FailurePayload::from(&err).kind, ErrorKind::Source);
  assert_eq!(s.count().await.unwrap(), 3);
}

#[tokio::test]
async fn bootstrap_imports_only_into_an_empty_store() {
  let s = Arc::new(SqliteStore::new(StoreConfig::in_memory()));
  let svc = service(s.clone(), Duration::from_secs(60));
  let f = csv_file(THREE_ROWS);

  let first = svc.bootstrap(Some(f.path())).await.unwrap();
  assert_eq!(first.schema, SchemaOutcome::Created);
  assert_eq!(first.import.map(|i| i.rows_written), Some(3));

  let second = svc.bootstrap(Some(f.path())).await.unwrap();
  assert_eq!(second.schema, SchemaOutcome::AlreadyCurrent);
  assert_eq!(second.existing_posts, 3);
  assert!(second.import.is_none());
  assert_eq!(s.count().await.unwrap(), 3);
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_and_stop_are_idempotent() {
  let s = store().await;
  let svc = service(s, Duration::from_secs(60));

  assert_eq!(svc.scheduler_status().state, SchedulerState::Stopped);
  assert!(!svc.stop_scheduler());

  assert!(svc.start_scheduler());
  assert!(!svc.start_scheduler());
  assert_eq!(svc.scheduler_status().state, SchedulerState::Running);

  assert!(svc.stop_scheduler());
  assert!(!svc.stop_scheduler());
  assert!(
    eventually(|| svc.scheduler_status().state == SchedulerState::Stopped, Duration::from_secs(1)).await
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ticks_write_generated_posts() {
  let s = store().await;
  let svc = service(s.clone(), Duration::from_millis(30));

  svc.start_scheduler();
  assert!(eventually(|| svc.scheduler_status().ticks_completed >= 2, Duration::from_secs(5)).await);
  svc.stop_scheduler();
  assert!(eventually(|| !svc.scheduler_status().tick_in_flight, Duration::from_secs(5)).await);

  let status = svc.scheduler_status();
  let stored = s.count().await.unwrap();
  assert_eq!(stored, status.records_written);
  assert!(stored >= 6);
  // Ids continue from the highest stored id.
  assert_eq!(s.max_post_id().await.unwrap(), stored);
}

#[tokio::test]
async fn tick_now_numbers_after_existing_posts() {
  let s = store().await;
  let svc = service(s.clone(), Duration::from_secs(60));
  let f = csv_file(THREE_ROWS);
  svc.ingest_from_source(f.path()).await.unwrap();

  let report = svc.scheduler().tick_now().await.unwrap().unwrap();
  assert!((3..=5).contains(&report.generated));
  assert_eq!(report.written, report.generated);
  assert!(s.get_post(4).await.unwrap().is_some());

  let by_date = Analytics::new(s.clone())
    .average_by_date_platform(Metric::Likes, Filter::default())
    .await
    .unwrap();
  assert!(by_date.iter().all(|r| !r.dimension("posted_date").unwrap_or("").is_empty()));
}

#[tokio::test]
async fn ticks_filter_against_the_enforced_schema() {
  let mut strict = SchemaRegistry::current();
  strict.properties.insert("platform".into(), FieldRule::string().one_of(["Facebook"]));
  let s = store_enforcing(strict).await;
  let svc = service(s.clone(), Duration::from_secs(60));

  let mut generated = 0;
  for _ in 0..5 {
    let report = svc.scheduler().tick_now().await.unwrap().unwrap();
    assert_eq!(report.written + report.rejected, report.generated);
    generated += report.generated;
  }

  let status = svc.scheduler_status();
  assert_eq!(status.ticks_completed, 5);
  assert_eq!(status.ticks_failed, 0);
  let stored = s.list_posts(&Filter::default(), None).await.unwrap();
  assert!(stored.len() < generated);
  assert!(stored.iter().all(|p| p.platform == Platform::Facebook));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_writes_skip_ticks_instead_of_overlapping() {
  let slow = Arc::new(SlowStore::new(Duration::from_millis(150)).await);
  let scheduler = IngestionScheduler::new(
    slow.clone(),
    SchedulerConfig { interval: Duration::from_millis(40), batch: 1..=2, max_reported_rejections: 10 },
    SyntheticGenerator::seeded(9).unwrap(),
  );

  scheduler.start();
  tokio::time::sleep(Duration::from_millis(700)).await;
  scheduler.stop();
  assert!(eventually(|| !scheduler.status().tick_in_flight, Duration::from_secs(2)).await);

  let status = scheduler.status();
  assert_eq!(slow.max_active.load(Ordering::SeqCst), 1);
  assert!(status.ticks_completed >= 2, "{status:?}");
  assert!(status.ticks_skipped >= 1, "{status:?}");
  assert_eq!(status.ticks_failed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_during_a_tick_does_not_overlap_writes() {
  let slow = Arc::new(SlowStore::new(Duration::from_millis(200)).await);
  let scheduler = IngestionScheduler::new(
    slow.clone(),
    SchedulerConfig { interval: Duration::from_millis(20), batch: 1..=1, max_reported_rejections: 10 },
    SyntheticGenerator::seeded(5).unwrap(),
  );

  scheduler.start();
  assert!(eventually(|| scheduler.status().tick_in_flight, Duration::from_secs(2)).await);
  assert!(scheduler.stop());
  assert!(scheduler.start());

  tokio::time::sleep(Duration::from_millis(300)).await;
  scheduler.stop();
  assert!(eventually(|| !scheduler.status().tick_in_flight, Duration::from_secs(2)).await);

  assert_eq!(slow.max_active.load(Ordering::SeqCst), 1);
  assert!(scheduler.status().ticks_skipped >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_ticks_do_not_stop_the_schedule() {
  // Never connected: every write fails with a connection error.
  let s = Arc::new(SqliteStore::new(StoreConfig::in_memory()));
  let svc = service(s, Duration::from_millis(20));

  svc.start_scheduler();
  assert!(eventually(|| svc.scheduler_status().ticks_failed >= 3, Duration::from_secs(5)).await);

  let status = svc.scheduler_status();
  assert_eq!(status.state, SchedulerState::Running);
  assert_eq!(status.last_error_kind(), Some(ErrorKind::Connection));
  assert_eq!(status.records_written, 0);
  svc.stop_scheduler();
}

#[tokio::test]
async fn health_combines_store_and_scheduler() {
  let s = store().await;
  let svc = service(s, Duration::from_secs(60));
  let f = csv_file(THREE_ROWS);
  svc.ingest_from_source(f.path()).await.unwrap();

  let report = svc.health().await;
  assert!(report.store.reachable);
  assert_eq!(report.store.record_count, Some(3));
  assert_eq!(report.scheduler.state, SchedulerState::Stopped);
}

// ─── Analytics ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn analytics_over_imported_rows() {
  let s = store().await;
  let svc = service(s.clone(), Duration::from_secs(60));
  let f = csv_file(THREE_ROWS);
  svc.ingest_from_source(f.path()).await.unwrap();
  let analytics = Analytics::new(s);

  let engagement = analytics.platform_engagement(Filter::default()).await.unwrap();
  let order: Vec<_> = engagement.iter().filter_map(|r| r.dimension("platform")).collect();
  assert_eq!(order, vec!["LinkedIn", "Facebook", "Twitter"]);

  let tree = analytics.decomposition_tree(Some(Platform::Twitter), None).await.unwrap();
  assert_eq!(tree.len(), 1);
  assert_eq!(tree[0].dimension("post_type"), Some("image"));

  let summary = analytics.engagement_summary(Filter::default()).await.unwrap().unwrap();
  assert_eq!(summary.measure("total_posts"), Some(3.0));
  assert_eq!(summary.measure("average_likes"), Some(425.0 / 3.0));

  let empty = analytics
    .engagement_summary(Filter::default().platform(Platform::Instagram))
    .await
    .unwrap();
  assert!(empty.is_none());
}
