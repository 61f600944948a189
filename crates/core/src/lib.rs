//! Core types and shared functionality for tubeguide.
//!
//! This crate provides:
//! - Versioned cache generations and page storage with SQLite backend
//! - The analysis catalogue (records, search, favorites, history)
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod catalogue;
pub mod config;
pub mod error;

pub use cache::{CacheDb, StoredResponse};
pub use catalogue::{Analysis, Catalogue};
pub use config::AppConfig;
pub use error::Error;
