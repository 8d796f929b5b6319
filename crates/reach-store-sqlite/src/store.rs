//! [`SqliteStore`], the SQLite implementation of [`PostStore`].

use std::{sync::Arc, time::Duration};

use reach_core::{
  aggregate::{Filter, GroupRow, PipelineSpec},
  normalize::normalize_document,
  post::{Document, Post, PostUpdate},
  schema::{SchemaDefinition, SchemaRegistry},
  store::{Health, PostStore, SchemaOutcome, SchemaState},
  validate::{ValidationError, validate},
};
use rusqlite::{OptionalExtension as _, types::Value as SqlValue};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
  Error, Result, StoreConfig,
  encode::{decode_document, decode_post, encode_post, encode_post_id, now},
  query::{Conditions, compile},
  schema::CATALOG,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── In-closure outcomes ─────────────────────────────────────────────────────

/// What a database closure concluded. Domain failures travel back as values
/// so the transaction can roll back before they become typed errors.
enum Outcome<T> {
  Done(T),
  NoCollection,
  CorruptValidator,
  Rejected { index: usize, error: ValidationError },
}

impl<T> Outcome<T> {
  fn finish(self, collection: &str) -> Result<T> {
    match self {
      Outcome::Done(v) => Ok(v),
      Outcome::NoCollection => Err(Error::NoCollection(collection.to_owned())),
      Outcome::CorruptValidator => Err(Error::CorruptValidator(collection.to_owned())),
      Outcome::Rejected { index, error } => Err(Error::Validation { index, source: error }),
    }
  }
}

enum Lookup {
  Found(SchemaDefinition),
  Missing,
  Corrupt,
}

fn load_validator(conn: &rusqlite::Connection, collection: &str) -> rusqlite::Result<Option<String>> {
  conn
    .query_row(
      "SELECT validator FROM collections WHERE name = ?1",
      rusqlite::params![collection],
      |r| r.get(0),
    )
    .optional()
}

fn lookup_validator(conn: &rusqlite::Connection, collection: &str) -> rusqlite::Result<Lookup> {
  Ok(match load_validator(conn, collection)? {
    None => Lookup::Missing,
    Some(json) => match SchemaDefinition::from_json(&json) {
      Ok(def) => Lookup::Found(def),
      Err(_) => Lookup::Corrupt,
    },
  })
}

/// Delete the collection and its documents. Returns the document count.
fn drop_in(conn: &rusqlite::Connection, collection: &str) -> rusqlite::Result<u64> {
  let dropped = conn.execute(
    "DELETE FROM documents WHERE collection = ?1",
    rusqlite::params![collection],
  )?;
  conn.execute("DELETE FROM collections WHERE name = ?1", rusqlite::params![collection])?;
  Ok(dropped as u64)
}

fn create_in(
  conn: &rusqlite::Connection,
  collection: &str,
  validator: &str,
  created_at: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO collections (name, validator, created_at) VALUES (?1, ?2, ?3)",
    rusqlite::params![collection, validator, created_at],
  )?;
  Ok(())
}

fn to_db_error(e: impl std::error::Error + Send + Sync + 'static) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

// ─── Store ───────────────────────────────────────────────────────────────────

struct Inner {
  config:  StoreConfig,
  desired: SchemaDefinition,
  conn:    RwLock<Option<tokio_rusqlite::Connection>>,
}

/// A post store backed by a single SQLite file (or an in-memory database).
///
/// Cloning is cheap; clones share one connection handle.
#[derive(Clone)]
pub struct SqliteStore {
  inner: Arc<Inner>,
}

impl SqliteStore {
  /// A disconnected store that will enforce the registry's current schema.
  pub fn new(config: StoreConfig) -> Self {
    Self::with_schema(config, SchemaRegistry::current())
  }

  /// A disconnected store that will enforce `desired` instead of the
  /// registry's definition.
  pub fn with_schema(config: StoreConfig, desired: SchemaDefinition) -> Self {
    Self {
      inner: Arc::new(Inner { config, desired, conn: RwLock::new(None) }),
    }
  }

  /// Connect and provision the collection.
  pub async fn open(config: StoreConfig) -> Result<Self> {
    let store = Self::new(config);
    store.connect().await?;
    store.ensure_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open(StoreConfig::in_memory()).await
  }

  pub fn config(&self) -> &StoreConfig { &self.inner.config }

  pub fn desired_schema(&self) -> &SchemaDefinition { &self.inner.desired }

  fn collection(&self) -> String { self.inner.config.collection.clone() }

  async fn conn(&self) -> Result<tokio_rusqlite::Connection> {
    self.inner.conn.read().await.clone().ok_or(Error::NotConnected)
  }

  /// Open the endpoint, install the catalog and run the liveness probe.
  async fn open_connection(config: &StoreConfig) -> Result<tokio_rusqlite::Connection> {
    let unreachable = |reason: String| Error::Connection { endpoint: config.endpoint.clone(), reason };

    let conn = match config.database_path() {
      Some(path) => {
        if let Some(dir) = path.parent() {
          tokio::fs::create_dir_all(dir).await.map_err(|e| unreachable(e.to_string()))?;
        }
        tokio_rusqlite::Connection::open(path).await
      }
      None => tokio_rusqlite::Connection::open_in_memory().await,
    }
    .map_err(|e| unreachable(e.to_string()))?;

    conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(CATALOG)?;
        conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
        Ok(())
      })
      .await
      .map_err(|e| unreachable(e.to_string()))?;

    Ok(conn)
  }

  async fn count_in(&self, conn: &tokio_rusqlite::Connection) -> Result<u64> {
    let collection = self.collection();
    let n: i64 = conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM documents WHERE collection = ?1",
          rusqlite::params![collection],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(n.max(0) as u64)
  }
}

// ─── PostStore impl ──────────────────────────────────────────────────────────

impl PostStore for SqliteStore {
  type Error = Error;

  // ── Connection ────────────────────────────────────────────────────────────

  async fn connect(&self) -> Result<SchemaState> {
    {
      let mut guard = self.inner.conn.write().await;
      if guard.is_none() {
        let config = &self.inner.config;
        let conn = tokio::time::timeout(config.connect_timeout, Self::open_connection(config))
          .await
          .map_err(|_| Error::Timeout {
            endpoint: config.endpoint.clone(),
            timeout:  config.connect_timeout,
          })??;
        info!(endpoint = %config.endpoint, database = %config.database, "connected to store");
        *guard = Some(conn);
      }
    }
    self.schema_state().await
  }

  async fn disconnect(&self) -> Result<()> {
    let taken = self.inner.conn.write().await.take();
    if let Some(conn) = taken {
      conn.close().await?;
      info!(endpoint = %self.inner.config.endpoint, "disconnected from store");
    }
    Ok(())
  }

  async fn schema_state(&self) -> Result<SchemaState> {
    let Ok(conn) = self.conn().await else {
      return Ok(SchemaState::Disconnected);
    };
    let collection = self.collection();
    let lookup = conn.call(move |conn| Ok(lookup_validator(conn, &collection)?)).await?;

    Ok(match lookup {
      Lookup::Missing => SchemaState::NoCollection,
      Lookup::Found(def) if def == self.inner.desired => SchemaState::SchemaCurrent,
      Lookup::Found(_) | Lookup::Corrupt => SchemaState::SchemaStale,
    })
  }

  // ── Schema ────────────────────────────────────────────────────────────────

  async fn ensure_schema(&self) -> Result<SchemaOutcome> {
    let conn = self.conn().await?;
    let collection = self.collection();
    let desired = self.inner.desired.clone();
    let validator = desired.to_json()?;
    let created_at = now();

    let name = collection.clone();
    let outcome = conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let outcome = match lookup_validator(&tx, &name)? {
          Lookup::Missing => {
            create_in(&tx, &name, &validator, &created_at)?;
            SchemaOutcome::Created
          }
          Lookup::Found(live) if live == desired => SchemaOutcome::AlreadyCurrent,
          found => {
            let changed_fields = match found {
              Lookup::Found(live) => desired.diff(&live),
              _ => desired.properties.keys().cloned().collect(),
            };
            let dropped_documents = drop_in(&tx, &name)?;
            create_in(&tx, &name, &validator, &created_at)?;
            SchemaOutcome::Recreated { dropped_documents, changed_fields }
          }
        };
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    match &outcome {
      SchemaOutcome::Created => info!(%collection, "collection created with enforced schema"),
      SchemaOutcome::AlreadyCurrent => debug!(%collection, "enforced schema is current"),
      SchemaOutcome::Recreated { dropped_documents, changed_fields } => error!(
        %collection,
        dropped_documents,
        changed_fields = ?changed_fields,
        "schema drift detected; collection dropped and recreated"
      ),
    }
    Ok(outcome)
  }

  async fn enforced_schema(&self) -> Result<Option<SchemaDefinition>> {
    let conn = self.conn().await?;
    let collection = self.collection();
    let name = collection.clone();
    let raw = conn.call(move |conn| Ok(load_validator(conn, &name)?)).await?;

    raw
      .map(|json| SchemaDefinition::from_json(&json).map_err(|_| Error::CorruptValidator(collection.clone())))
      .transpose()
  }

  async fn drop_collection(&self) -> Result<u64> {
    let conn = self.conn().await?;
    let collection = self.collection();
    let name = collection.clone();
    let dropped = conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let dropped = drop_in(&tx, &name)?;
        tx.commit()?;
        Ok(dropped)
      })
      .await?;
    warn!(%collection, dropped, "collection dropped");
    Ok(dropped)
  }

  async fn reset(&self) -> Result<u64> {
    let conn = self.conn().await?;
    let collection = self.collection();
    let validator = self.inner.desired.to_json()?;
    let created_at = now();

    let name = collection.clone();
    let dropped = conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let dropped = drop_in(&tx, &name)?;
        create_in(&tx, &name, &validator, &created_at)?;
        tx.commit()?;
        Ok(dropped)
      })
      .await?;
    warn!(%collection, dropped, "collection reset");
    Ok(dropped)
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn bulk_insert(&self, posts: Vec<Post>) -> Result<usize> {
    if posts.is_empty() {
      return Ok(0);
    }
    let encoded = posts.iter().map(encode_post).collect::<Result<Vec<_>>>()?;
    let conn = self.conn().await?;
    let collection = self.collection();
    let inserted_at = now();

    let name = collection.clone();
    let outcome = conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let schema = match lookup_validator(&tx, &name)? {
          Lookup::Found(s) => s,
          Lookup::Missing => return Ok(Outcome::NoCollection),
          Lookup::Corrupt => return Ok(Outcome::CorruptValidator),
        };
        {
          let mut stmt = tx.prepare(
            "INSERT INTO documents (collection, post_id, body, inserted_at) VALUES (?1, ?2, ?3, ?4)",
          )?;
          for (index, doc) in encoded.iter().enumerate() {
            if let Err(error) = validate(&doc.document, &schema) {
              return Ok(Outcome::Rejected { index, error });
            }
            stmt.execute(rusqlite::params![name, doc.post_id, doc.body, inserted_at])?;
          }
        }
        tx.commit()?;
        Ok(Outcome::Done(encoded.len()))
      })
      .await?;

    let written = outcome.finish(&collection)?;
    debug!(%collection, written, "bulk insert committed");
    Ok(written)
  }

  async fn update_post(&self, post_id: u64, update: PostUpdate) -> Result<bool> {
    let Some(id) = encode_post_id(post_id) else {
      return Ok(false);
    };
    let conn = self.conn().await?;
    let collection = self.collection();

    let name = collection.clone();
    let outcome = conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let schema = match lookup_validator(&tx, &name)? {
          Lookup::Found(s) => s,
          Lookup::Missing => return Ok(Outcome::NoCollection),
          Lookup::Corrupt => return Ok(Outcome::CorruptValidator),
        };
        let row: Option<(i64, String)> = tx
          .query_row(
            "SELECT doc_id, body FROM documents
             WHERE collection = ?1 AND post_id = ?2
             ORDER BY doc_id LIMIT 1",
            rusqlite::params![name, id],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        let Some((doc_id, body)) = row else {
          return Ok(Outcome::Done(false));
        };

        let mut doc: Document = serde_json::from_str(&body).map_err(to_db_error)?;
        if update.apply_to(&mut doc) {
          normalize_document(&mut doc);
        }
        if let Err(error) = validate(&doc, &schema) {
          return Ok(Outcome::Rejected { index: 0, error });
        }
        let body = serde_json::to_string(&doc).map_err(to_db_error)?;
        tx.execute(
          "UPDATE documents SET body = ?1 WHERE doc_id = ?2",
          rusqlite::params![body, doc_id],
        )?;
        tx.commit()?;
        Ok(Outcome::Done(true))
      })
      .await?;

    let updated = outcome.finish(&collection)?;
    debug!(%collection, post_id, updated, "post update");
    Ok(updated)
  }

  async fn delete_post(&self, post_id: u64) -> Result<bool> {
    let Some(id) = encode_post_id(post_id) else {
      return Ok(false);
    };
    let conn = self.conn().await?;
    let collection = self.collection();

    let deleted = conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM documents WHERE doc_id = (
             SELECT doc_id FROM documents
             WHERE collection = ?1 AND post_id = ?2
             ORDER BY doc_id LIMIT 1
           )",
          rusqlite::params![collection, id],
        )?)
      })
      .await?;
    Ok(deleted > 0)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_post(&self, post_id: u64) -> Result<Option<Post>> {
    let Some(id) = encode_post_id(post_id) else {
      return Ok(None);
    };
    let conn = self.conn().await?;
    let collection = self.collection();

    let body: Option<String> = conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT body FROM documents
             WHERE collection = ?1 AND post_id = ?2
             ORDER BY doc_id LIMIT 1",
            rusqlite::params![collection, id],
            |r| r.get(0),
          )
          .optional()?)
      })
      .await?;

    body.as_deref().map(decode_post).transpose()
  }

  async fn list_posts<'a>(&'a self, filter: &'a Filter, limit: Option<usize>) -> Result<Vec<Post>> {
    let conn = self.conn().await?;
    let mut conditions = Conditions::new(&self.inner.config.collection, filter);
    let sql = format!(
      "SELECT body FROM documents WHERE {} ORDER BY doc_id LIMIT ?",
      conditions.where_sql()
    );
    // A negative LIMIT means no limit in SQLite.
    let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
    conditions.params.push(SqlValue::Integer(limit));
    let params = conditions.params;

    let bodies: Vec<String> = conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |r| r.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    bodies.iter().map(|b| decode_post(b)).collect()
  }

  async fn count(&self) -> Result<u64> {
    let conn = self.conn().await?;
    self.count_in(&conn).await
  }

  async fn max_post_id(&self) -> Result<u64> {
    let conn = self.conn().await?;
    let collection = self.collection();
    let max: i64 = conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COALESCE(MAX(post_id), 0) FROM documents WHERE collection = ?1",
          rusqlite::params![collection],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(u64::try_from(max).unwrap_or(0))
  }

  async fn aggregate<'a>(&'a self, spec: &'a PipelineSpec) -> Result<Vec<GroupRow>> {
    let conn = self.conn().await?;
    let compiled = compile(&self.inner.config.collection, spec);
    debug!(aggregation = ?spec.aggregation, sql = %compiled.sql, "running aggregation");

    let rows = conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&compiled.sql)?;
        let dims = compiled.dimensions.len();
        let rows = stmt
          .query_map(rusqlite::params_from_iter(compiled.params), |r| {
            let mut row = GroupRow::default();
            for (i, name) in compiled.dimensions.iter().enumerate() {
              row.dimensions.insert((*name).to_owned(), r.get::<_, String>(i)?);
            }
            for (i, name) in compiled.measures.iter().enumerate() {
              row.measures.insert((*name).to_owned(), r.get::<_, f64>(dims + i)?);
            }
            Ok(row)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  async fn health(&self) -> Health {
    let Ok(conn) = self.conn().await else {
      return Health {
        reachable:    false,
        record_count: None,
        schema:       SchemaState::Disconnected,
        detail:       "not connected".to_owned(),
      };
    };

    let probe = conn
      .call(|conn| Ok(conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?))
      .await;
    if let Err(e) = probe {
      return Health {
        reachable:    false,
        record_count: None,
        schema:       SchemaState::Disconnected,
        detail:       format!("liveness probe failed: {e}"),
      };
    }

    let schema = self.schema_state().await.unwrap_or(SchemaState::SchemaStale);
    match self.count_in(&conn).await {
      Ok(n) => Health { reachable: true, record_count: Some(n), schema, detail: "ok".to_owned() },
      Err(e) => Health {
        reachable: true,
        record_count: None,
        schema,
        detail: format!("count failed: {e}"),
      },
    }
  }
}

impl SqliteStore {
  /// Raw document for `post_id`, as stored. Test and diagnostics helper.
  pub async fn raw_document(&self, post_id: u64) -> Result<Option<Document>> {
    let Some(id) = encode_post_id(post_id) else {
      return Ok(None);
    };
    let conn = self.conn().await?;
    let collection = self.collection();
    let body: Option<String> = conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT body FROM documents WHERE collection = ?1 AND post_id = ?2 ORDER BY doc_id LIMIT 1",
            rusqlite::params![collection, id],
            |r| r.get(0),
          )
          .optional()?)
      })
      .await?;
    body.as_deref().map(decode_document).transpose()
  }

  /// Write `document` as-is, bypassing the validator. Only used to seed
  /// legacy data when exercising drift handling.
  #[cfg(test)]
  pub(crate) async fn insert_unchecked(&self, document: &Document) -> Result<()> {
    let body = crate::encode::encode_document(document)?;
    let post_id = crate::encode::post_id_column(document);
    let conn = self.conn().await?;
    let collection = self.collection();
    let at = now();
    conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (collection, post_id, body, inserted_at) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![collection, post_id, body, at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
