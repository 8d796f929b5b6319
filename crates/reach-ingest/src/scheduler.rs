//! Recurring background ingestion of synthetic records.
//!
//! The scheduler is an owned object: `start` and `stop` are its only
//! transitions and are serialized by a mutex. While running, one task drives
//! an interval timer and runs each tick to completion before polling the
//! timer again, so a task never overlaps itself. A shared tick gate covers
//! the case where a stop and a restart happen while a tick is still writing:
//! the new task skips its ticks until the old one releases the gate.
//!
//! A tick failure, or even a panic, is logged and counted; the schedule
//! keeps going until `stop` is called.

use std::{
  ops::RangeInclusive,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use reach_core::{ErrorKind, store::PostStore};
use serde::{Deserialize, Serialize};
use tokio::{
  sync::{OwnedMutexGuard, watch},
  task::JoinHandle,
  time::{Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  Error, FailurePayload, Result,
  batch::{admission_schema, prepare_batch},
  generator::SyntheticGenerator,
};

// ─── Configuration and status ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
  pub interval:                Duration,
  /// Records generated per tick, drawn uniformly from this range.
  pub batch:                   RangeInclusive<usize>,
  pub max_reported_rejections: usize,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self { interval: Duration::from_secs(30), batch: 10..=50, max_reported_rejections: 1000 }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
  Stopped,
  Running,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
  pub state:           SchedulerState,
  pub tick_in_flight:  bool,
  pub ticks_completed: u64,
  pub ticks_failed:    u64,
  /// Due ticks that did not run because an earlier tick was still busy.
  pub ticks_skipped:   u64,
  pub records_written: u64,
  pub last_error:      Option<FailurePayload>,
}

/// What one successful tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
  pub generated: usize,
  pub rejected:  usize,
  pub written:   usize,
}

#[derive(Default)]
struct Counters {
  completed:  AtomicU64,
  failed:     AtomicU64,
  skipped:    AtomicU64,
  written:    AtomicU64,
  last_error: Mutex<Option<FailurePayload>>,
}

impl Counters {
  fn fail(&self, payload: FailurePayload) {
    self.failed.fetch_add(1, Ordering::Relaxed);
    *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload);
  }
}

// ─── Shared tick state ───────────────────────────────────────────────────────

struct Shared<S> {
  store:     Arc<S>,
  config:    SchedulerConfig,
  generator: Mutex<SyntheticGenerator>,
  gate:      Arc<tokio::sync::Mutex<()>>,
  counters:  Counters,
}

impl<S: PostStore + 'static> Shared<S> {
  /// Generate, admit and write one batch.
  async fn tick(&self, tick_id: Uuid) -> Result<TickReport> {
    let schema = admission_schema(self.store.as_ref()).await?;
    let first_post_id = match self.store.max_post_id().await {
      Ok(max) => max + 1,
      Err(e) => {
        warn!(%tick_id, error = %e, "could not read the highest post_id; numbering from 1");
        1
      }
    };

    let rows = {
      let mut generator = self.generator.lock().unwrap_or_else(PoisonError::into_inner);
      let count = generator.batch_size(self.config.batch.clone());
      generator.generate(count, first_post_id)
    };
    let generated = rows.len();

    let batch = prepare_batch(rows.into_iter().map(Ok), &schema, self.config.max_reported_rejections);
    let rejected = batch.rejections.total();
    if rejected > 0 {
      warn!(%tick_id, rejected, reasons = ?batch.rejections.entries(), "generated rows rejected");
    }

    let written = if batch.accepted.is_empty() {
      0
    } else {
      self.store.bulk_insert(batch.accepted).await.map_err(Error::store)?
    };
    Ok(TickReport { generated, rejected, written })
  }

  /// Run one tick behind the gate, isolated in its own task. Returns `None`
  /// when the tick was skipped.
  async fn guarded_tick(self: &Arc<Self>) -> Option<Result<TickReport>> {
    let Ok(permit) = self.gate.clone().try_lock_owned() else {
      self.counters.skipped.fetch_add(1, Ordering::Relaxed);
      warn!("previous tick still in flight; skipping this one");
      return None;
    };
    Some(self.clone().spawn_tick(permit).await)
  }

  async fn spawn_tick(self: Arc<Self>, permit: OwnedMutexGuard<()>) -> Result<TickReport> {
    let tick_id = Uuid::new_v4();
    let started = Instant::now();
    let shared = self.clone();

    let joined = tokio::spawn(async move {
      let _permit = permit;
      shared.tick(tick_id).await
    })
    .await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let outcome = match joined {
      Ok(outcome) => outcome,
      Err(join) => Err(Error::Task(join)),
    };

    match &outcome {
      Ok(report) => {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        self.counters.written.fetch_add(report.written as u64, Ordering::Relaxed);
        info!(
          %tick_id,
          generated = report.generated,
          rejected = report.rejected,
          written = report.written,
          elapsed_ms,
          "tick completed"
        );
      }
      Err(e) => {
        let payload = FailurePayload::from(e);
        error!(%tick_id, kind = %payload.kind, error = %e, elapsed_ms, "tick failed; schedule continues");
        self.counters.fail(payload);
      }
    }
    outcome
  }
}

async fn run_loop<S: PostStore + 'static>(shared: Arc<Shared<S>>, mut stop: watch::Receiver<bool>) {
  let period = shared.config.interval;
  let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      biased;

      changed = stop.changed() => {
        if changed.is_err() || *stop.borrow() {
          break;
        }
      }

      _ = ticker.tick() => {
        let started = Instant::now();
        shared.guarded_tick().await;

        // Due ticks that passed while this one ran are dropped by the timer.
        let overran = (started.elapsed().as_nanos() / period.as_nanos().max(1)) as u64;
        if overran > 0 {
          shared.counters.skipped.fetch_add(overran, Ordering::Relaxed);
          warn!(skipped = overran, "tick outlasted the interval; due ticks skipped");
        }
      }
    }
  }
  debug!("scheduler loop exited");
}

// ─── Scheduler ───────────────────────────────────────────────────────────────

struct RunningTask {
  stop:   watch::Sender<bool>,
  handle: JoinHandle<()>,
}

pub struct IngestionScheduler<S> {
  shared: Arc<Shared<S>>,
  task:   Mutex<Option<RunningTask>>,
}

impl<S: PostStore + 'static> IngestionScheduler<S> {
  pub fn new(store: Arc<S>, config: SchedulerConfig, generator: SyntheticGenerator) -> Self {
    Self {
      shared: Arc::new(Shared {
        store,
        config,
        generator: Mutex::new(generator),
        gate: Arc::new(tokio::sync::Mutex::new(())),
        counters: Counters::default(),
      }),
      task:   Mutex::new(None),
    }
  }

  pub fn config(&self) -> &SchedulerConfig { &self.shared.config }

  /// Launch the recurring task. Returns `false` if it was already running.
  ///
  /// Must be called from within a tokio runtime.
  pub fn start(&self) -> bool {
    let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
    if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
      debug!("scheduler already running");
      return false;
    }

    let (stop, rx) = watch::channel(false);
    let handle = tokio::spawn(run_loop(self.shared.clone(), rx));
    *task = Some(RunningTask { stop, handle });
    info!(
      interval_secs = self.shared.config.interval.as_secs_f64(),
      batch_min = *self.shared.config.batch.start(),
      batch_max = *self.shared.config.batch.end(),
      "scheduler started"
    );
    true
  }

  /// Prevent any further tick from starting. A tick already in flight runs
  /// to completion; this returns without waiting for it. Returns `false` if
  /// the scheduler was not running.
  pub fn stop(&self) -> bool {
    let taken = self.task.lock().unwrap_or_else(PoisonError::into_inner).take();
    match taken {
      Some(task) => {
        // The receiver may already be gone if the loop exited.
        let _ = task.stop.send(true);
        info!(tick_in_flight = self.tick_in_flight(), "scheduler stopped");
        true
      }
      None => {
        debug!("scheduler already stopped");
        false
      }
    }
  }

  pub fn status(&self) -> SchedulerStatus {
    let running = self
      .task
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .is_some_and(|t| !t.handle.is_finished());
    let c = &self.shared.counters;

    SchedulerStatus {
      state:           if running { SchedulerState::Running } else { SchedulerState::Stopped },
      tick_in_flight:  self.tick_in_flight(),
      ticks_completed: c.completed.load(Ordering::Relaxed),
      ticks_failed:    c.failed.load(Ordering::Relaxed),
      ticks_skipped:   c.skipped.load(Ordering::Relaxed),
      records_written: c.written.load(Ordering::Relaxed),
      last_error:      c.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone(),
    }
  }

  /// Run one tick now, outside the timer, subject to the same gate.
  /// Returns `None` if another tick is in flight.
  pub async fn tick_now(&self) -> Option<Result<TickReport>> {
    self.shared.guarded_tick().await
  }

  fn tick_in_flight(&self) -> bool { self.shared.gate.try_lock().is_err() }
}

impl SchedulerStatus {
  pub fn last_error_kind(&self) -> Option<ErrorKind> {
    self.last_error.as_ref().map(|p| p.kind)
  }
}
