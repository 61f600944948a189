//! Pinned analyses, persisted as a JSON array of ids under `favorites`.

use super::{Analysis, Catalogue, SortOrder};
use crate::{CacheDb, Error};

pub const FAVORITES_KEY: &str = "favorites";

/// The favorite ids, backed by page storage.
#[derive(Debug, Clone)]
pub struct Favorites {
    db: CacheDb,
    ids: Vec<String>,
}

impl Favorites {
    /// Load favorites. A missing or unreadable value yields an empty list.
    pub async fn load(db: CacheDb) -> Result<Self, Error> {
        let ids = match db.kv_get_json::<Vec<String>>(FAVORITES_KEY).await {
            Ok(ids) => ids.unwrap_or_default(),
            Err(Error::CorruptEntry(reason)) => {
                tracing::warn!(%reason, "discarding unreadable favorites");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        Ok(Self { db, ids })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn is_favorite(&self, id: &str) -> bool {
        self.ids.iter().any(|f| f == id)
    }

    /// Remove `id` if pinned, otherwise append it. Returns the new state.
    pub async fn toggle(&mut self, id: &str) -> Result<bool, Error> {
        let pinned = if self.is_favorite(id) {
            self.ids.retain(|f| f != id);
            false
        } else {
            self.ids.push(id.to_string());
            true
        };
        self.save().await?;
        Ok(pinned)
    }

    /// Returns how many favorites were removed.
    pub async fn clear(&mut self) -> Result<usize, Error> {
        let removed = self.ids.len();
        if removed > 0 {
            self.ids.clear();
            self.save().await?;
        }
        Ok(removed)
    }

    /// Pinned records present in `catalogue`, sorted by `order`.
    pub fn records<'a>(&self, catalogue: &'a Catalogue, order: SortOrder) -> Vec<&'a Analysis> {
        let mut records: Vec<&Analysis> = catalogue.records().filter(|r| self.is_favorite(&r.id)).collect();
        records.sort_by(|a, b| order.compare(a, b));
        records
    }

    async fn save(&self) -> Result<(), Error> {
        self.db.kv_set_json(FAVORITES_KEY, &self.ids).await
    }
}
