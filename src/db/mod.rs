//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: queries, pool-bound or on a caller-held connection/transaction

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{NewStorable, StorableRecord};
pub use schema::SQLITE_INIT;
pub use sqlite::{DuplicateQuery, DuplicateScope, SqlitePool, StorableStorage};
