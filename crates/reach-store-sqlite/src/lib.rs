//! SQLite backend for the Reach post store.
//!
//! Emulates a document store on top of SQLite: each collection is a row in a
//! catalog table carrying its enforced validator, and documents are JSON
//! bodies queried through the JSON1 functions. All database access runs on
//! the [`tokio_rusqlite`] worker thread without blocking the async runtime.

mod config;
mod encode;
mod query;
mod schema;
mod store;

pub mod error;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use store::SqliteStore;
