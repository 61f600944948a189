//! Recent searches, persisted under `searchHistory`.
//!
//! Newest first, capped, and pruned of entries older than the TTL each time
//! the list is read.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{CacheDb, Error};

pub const HISTORY_KEY: &str = "searchHistory";

/// Terms shorter than this (after trimming) are not recorded.
const MIN_TERM_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HistoryEntry {
    pub term: String,
    /// Milliseconds since the Unix epoch.
    pub time: i64,
}

#[derive(Debug, Clone)]
pub struct SearchHistory {
    db: CacheDb,
    max_entries: usize,
    ttl: Duration,
}

impl SearchHistory {
    pub fn new(db: CacheDb, max_entries: usize, ttl_days: i64) -> Self {
        Self { db, max_entries, ttl: Duration::days(ttl_days) }
    }

    pub async fn entries(&self) -> Result<Vec<HistoryEntry>, Error> {
        self.entries_at(Utc::now()).await
    }

    /// Entries still valid at `now`; expired ones are dropped from storage.
    pub async fn entries_at(&self, now: DateTime<Utc>) -> Result<Vec<HistoryEntry>, Error> {
        let stored = self.read().await?;
        let cutoff = (now - self.ttl).timestamp_millis();
        let valid: Vec<HistoryEntry> = stored.iter().filter(|e| e.time > cutoff).cloned().collect();
        if valid.len() != stored.len() {
            self.db.kv_set_json(HISTORY_KEY, &valid).await?;
        }
        Ok(valid)
    }

    pub async fn record(&self, term: &str) -> Result<bool, Error> {
        self.record_at(term, Utc::now()).await
    }

    /// Push `term` to the front, replacing a case-insensitive duplicate.
    ///
    /// Returns false when the term is too short to be worth keeping.
    pub async fn record_at(&self, term: &str, now: DateTime<Utc>) -> Result<bool, Error> {
        let term = term.trim();
        if term.chars().count() < MIN_TERM_CHARS {
            return Ok(false);
        }

        let lowered = term.to_lowercase();
        let mut entries = self.entries_at(now).await?;
        entries.retain(|e| e.term.to_lowercase() != lowered);
        entries.insert(0, HistoryEntry { term: term.to_string(), time: now.timestamp_millis() });
        entries.truncate(self.max_entries);

        self.db.kv_set_json(HISTORY_KEY, &entries).await?;
        Ok(true)
    }

    /// Remove the entry at `index` in the current listing.
    pub async fn remove(&self, index: usize) -> Result<bool, Error> {
        let mut entries = self.entries().await?;
        if index >= entries.len() {
            return Ok(false);
        }
        entries.remove(index);
        self.db.kv_set_json(HISTORY_KEY, &entries).await?;
        Ok(true)
    }

    pub async fn clear(&self) -> Result<(), Error> {
        self.db.kv_remove(HISTORY_KEY).await?;
        Ok(())
    }

    async fn read(&self) -> Result<Vec<HistoryEntry>, Error> {
        match self.db.kv_get_json::<Vec<HistoryEntry>>(HISTORY_KEY).await {
            Ok(entries) => Ok(entries.unwrap_or_default()),
            Err(Error::CorruptEntry(reason)) => {
                tracing::warn!(%reason, "discarding unreadable search history");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}
