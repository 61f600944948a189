//! The analysis catalogue: a static dataset searched by free-text query.
//!
//! Records are loaded once, indexed with a normalized search text, and
//! optionally persisted under `cachedData` as a last-resort offline source.

pub mod favorites;
pub mod history;
pub mod record;
pub mod search;

pub use favorites::Favorites;
pub use history::{HistoryEntry, SearchHistory};
pub use record::Analysis;
pub use search::{SortOrder, normalize, result_summary};

use crate::{CacheDb, Error};

/// Page-storage key holding the last dataset fetched from the network.
pub const DATASET_KEY: &str = "cachedData";

#[derive(Debug, Clone)]
struct Indexed {
    record: Analysis,
    search_text: String,
}

/// An indexed, read-only set of analysis records.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    entries: Vec<Indexed>,
}

impl Catalogue {
    pub fn from_records(records: Vec<Analysis>) -> Self {
        let entries = records
            .into_iter()
            .map(|record| Indexed { search_text: search::search_text(&record), record })
            .collect();
        Self { entries }
    }

    /// Parse a dataset body (a JSON array of records).
    pub fn from_json(bytes: &[u8]) -> Result<Self, Error> {
        let records: Vec<Analysis> =
            serde_json::from_slice(bytes).map_err(|e| Error::DataUnavailable(format!("invalid dataset: {e}")))?;
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Analysis> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn get(&self, id: &str) -> Option<&Analysis> {
        self.records().find(|r| r.id == id)
    }

    /// Records whose search text contains the normalized, trimmed query.
    ///
    /// An empty query matches nothing. Dataset order is preserved.
    pub fn search(&self, query: &str) -> Vec<&Analysis> {
        let needle = normalize(query);
        let needle = needle.trim();
        if needle.is_empty() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| e.search_text.contains(needle))
            .map(|e| &e.record)
            .collect()
    }

    /// Persist the records under [`DATASET_KEY`].
    pub async fn persist(&self, db: &CacheDb) -> Result<(), Error> {
        let records: Vec<&Analysis> = self.records().collect();
        db.kv_set_json(DATASET_KEY, &records).await
    }

    /// Load the records persisted by [`Catalogue::persist`], if any.
    pub async fn load_persisted(db: &CacheDb) -> Result<Option<Self>, Error> {
        let records: Option<Vec<Analysis>> = db.kv_get_json(DATASET_KEY).await?;
        Ok(records.map(Self::from_records))
    }
}
