use std::{path::PathBuf, time::Duration};

/// Where the store lives and what it is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
  /// Directory holding the database file, or `:memory:`.
  pub endpoint:        String,
  /// Logical database name; the file is `<endpoint>/<database>.sqlite3`.
  pub database:        String,
  pub collection:      String,
  pub connect_timeout: Duration,
}

pub const IN_MEMORY: &str = ":memory:";

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      endpoint:        "./data".to_owned(),
      database:        "social_media_analysis_db".to_owned(),
      collection:      "social_media_posts".to_owned(),
      connect_timeout: Duration::from_secs(5),
    }
  }
}

impl StoreConfig {
  pub fn in_memory() -> Self {
    Self { endpoint: IN_MEMORY.to_owned(), ..Self::default() }
  }

  /// Path of the database file; `None` for an in-memory store.
  pub fn database_path(&self) -> Option<PathBuf> {
    (self.endpoint != IN_MEMORY)
      .then(|| PathBuf::from(&self.endpoint).join(format!("{}.sqlite3", self.database)))
  }
}
