//! Database layer for Noted

mod connection;
mod kv;
mod migrations;

pub use connection::Database;
pub use kv::{KeyValueStore, LibSqlKeyValueStore, MemoryKeyValueStore};
