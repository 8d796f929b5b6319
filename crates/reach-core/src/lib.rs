//! Core types and trait definitions for the Reach engagement pipeline.
//!
//! This crate is deliberately free of database and file I/O. It owns the
//! post record model, the schema registry, the timestamp normalizer, the
//! record validator, and the [`store::PostStore`] abstraction that storage
//! backends implement.

pub mod aggregate;
pub mod error;
pub mod normalize;
pub mod post;
pub mod schema;
pub mod store;
pub mod validate;

pub use error::{Classify, Error, ErrorKind, Result};
