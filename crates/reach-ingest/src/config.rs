//! Runtime settings.
//!
//! Read from an optional TOML file and `REACH_*` environment variables,
//! falling back to built-in defaults for every key.

use std::{ops::RangeInclusive, path::{Path, PathBuf}, time::Duration};

use reach_store_sqlite::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, scheduler::SchedulerConfig};

pub const ENV_PREFIX: &str = "REACH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_endpoint:          String,
  pub database:                String,
  pub collection:              String,
  pub connect_timeout_secs:    u64,
  pub tick_interval_secs:      u64,
  pub batch_min:               usize,
  pub batch_max:               usize,
  pub max_reported_rejections: usize,
  /// Tabular source used by the first-run import and by re-ingestion.
  pub source_path:             PathBuf,
}

impl Default for Settings {
  fn default() -> Self {
    let store = StoreConfig::default();
    Self {
      store_endpoint:          store.endpoint,
      database:                store.database,
      collection:              store.collection,
      connect_timeout_secs:    store.connect_timeout.as_secs(),
      tick_interval_secs:      30,
      batch_min:               10,
      batch_max:               50,
      max_reported_rejections: 1000,
      source_path:             PathBuf::from("Social_Media_Engagement.csv"),
    }
  }
}

impl Settings {
  /// Load from `file` (if it exists) layered under the process environment.
  pub fn load(file: Option<&Path>) -> Result<Self> {
    Self::load_from(file, config::Environment::with_prefix(ENV_PREFIX))
  }

  /// Load from `file` layered under an explicit environment source.
  pub fn load_from(file: Option<&Path>, env: config::Environment) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(path) = file {
      builder = builder.add_source(config::File::from(path).required(false));
    }
    let settings: Settings = builder
      .add_source(env.try_parsing(true))
      .build()?
      .try_deserialize()?;
    settings.validate()?;
    Ok(settings)
  }

  pub fn validate(&self) -> Result<()> {
    if self.tick_interval_secs == 0 {
      return Err(Error::Config("tick_interval_secs must be at least 1".into()));
    }
    if self.batch_min == 0 || self.batch_min > self.batch_max {
      return Err(Error::Config(format!(
        "batch bounds must satisfy 1 <= batch_min <= batch_max, got {}..={}",
        self.batch_min, self.batch_max
      )));
    }
    if self.collection.is_empty() || self.database.is_empty() {
      return Err(Error::Config("database and collection names must not be empty".into()));
    }
    Ok(())
  }

  pub fn store_config(&self) -> StoreConfig {
    StoreConfig {
      endpoint:        self.store_endpoint.clone(),
      database:        self.database.clone(),
      collection:      self.collection.clone(),
      connect_timeout: Duration::from_secs(self.connect_timeout_secs),
    }
  }

  pub fn batch_bounds(&self) -> RangeInclusive<usize> { self.batch_min..=self.batch_max }

  pub fn scheduler_config(&self) -> SchedulerConfig {
    SchedulerConfig {
      interval:                Duration::from_secs(self.tick_interval_secs),
      batch:                   self.batch_bounds(),
      max_reported_rejections: self.max_reported_rejections,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::HashMap, io::Write as _};

  use super::*;

  fn env(vars: &[(&str, &str)]) -> config::Environment {
    let map: HashMap<String, String> =
      vars.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
    config::Environment::with_prefix(ENV_PREFIX).source(Some(map))
  }

  #[test]
  fn defaults_apply_when_nothing_is_set() {
    let s = Settings::load_from(None, env(&[])).unwrap();
    assert_eq!(s, Settings::default());
    assert_eq!(s.scheduler_config().interval, Duration::from_secs(30));
    assert_eq!(s.batch_bounds(), 10..=50);
  }

  #[test]
  fn file_values_are_overridden_by_environment() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "collection = \"from_file\"\ntick_interval_secs = 5\nbatch_max = 20").unwrap();

    let s = Settings::load_from(Some(file.path()), env(&[("REACH_TICK_INTERVAL_SECS", "7")])).unwrap();
    assert_eq!(s.collection, "from_file");
    assert_eq!(s.tick_interval_secs, 7);
    assert_eq!(s.batch_max, 20);
    assert_eq!(s.store_config().collection, "from_file");
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let s = Settings::load_from(Some(Path::new("/nonexistent/reach.toml")), env(&[])).unwrap();
    assert_eq!(s.database, "social_media_analysis_db");
  }

  #[test]
  fn inverted_batch_bounds_are_rejected() {
    let err = Settings::load_from(None, env(&[("REACH_BATCH_MIN", "60")])).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
  }
}
