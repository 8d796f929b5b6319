//! SQL catalog for the document store emulation.
//!
//! Executed on every connect. Each statement is idempotent, and
//! `user_version` only stamps the catalog version; nothing reads it back.
//! These tables are the store's own plumbing; the post schema itself is the
//! JSON validator held in `collections`.

/// Catalog DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const CATALOG: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS collections (
    name        TEXT PRIMARY KEY,
    validator   TEXT NOT NULL,   -- JSON-encoded SchemaDefinition
    created_at  TEXT NOT NULL    -- RFC 3339 UTC
);

CREATE TABLE IF NOT EXISTS documents (
    doc_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    collection  TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    post_id     INTEGER,         -- copy of body.post_id for lookups
    body        TEXT NOT NULL CHECK (json_valid(body)),
    inserted_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS documents_collection_idx ON documents(collection);
CREATE INDEX IF NOT EXISTS documents_post_id_idx    ON documents(collection, post_id);

PRAGMA user_version = 1;
";
