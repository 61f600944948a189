//! SQLite-backed storage for cache generations and page state.
//!
//! This module provides the persistent store owned by the cache controller,
//! using SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Named, versioned cache generations with enumerate/open/delete
//! - Request-keyed response entries with atomic multi-entry installs
//! - A recorded "current" generation consulted by background refreshes
//! - A flat key-value table for page-side state
//! - Automatic schema migrations and WAL mode

pub mod connection;
pub mod entries;
pub mod generations;
pub mod hash;
pub mod kv;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::StoredResponse;
