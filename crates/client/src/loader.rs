//! Dataset loading with a page-storage fallback.

use serde::{Deserialize, Serialize};
use tubeguide_core::{CacheDb, Catalogue, Error};

use crate::controller::{Page, ResponseSource};

/// Where the loaded dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fetched through the controller (network or cache generation)
    Fetched,
    /// The copy persisted under `cachedData` by an earlier load
    LocalCopy,
    /// Nothing could be loaded; the catalogue is empty
    Unavailable,
}

impl DataSource {
    pub fn status_message(self) -> &'static str {
        match self {
            DataSource::Fetched => "data loaded",
            DataSource::LocalCopy => "offline, local data loaded",
            DataSource::Unavailable => "data unavailable: offline with no local copy",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedCatalogue {
    pub catalogue: Catalogue,
    pub source: DataSource,
    /// How the fetch was answered, when it succeeded
    pub served_from: Option<ResponseSource>,
}

/// Load the dataset at `path` through `page`, falling back to the persisted copy.
///
/// A successful fetch replaces the persisted copy. This never fails: when no
/// source is usable the catalogue is empty and `source` says so.
pub async fn load_catalogue(page: &Page, db: &CacheDb, path: &str) -> LoadedCatalogue {
    match fetch_catalogue(page, path).await {
        Ok((catalogue, served_from)) => {
            if let Err(e) = catalogue.persist(db).await {
                tracing::warn!(error = %e, "failed to persist dataset copy");
            }
            tracing::info!(records = catalogue.len(), source = ?served_from, "dataset loaded");
            return LoadedCatalogue { catalogue, source: DataSource::Fetched, served_from: Some(served_from) };
        }
        Err(e) => tracing::warn!(path, error = %e, "dataset fetch failed, trying local copy"),
    }

    match Catalogue::load_persisted(db).await {
        Ok(Some(catalogue)) => {
            tracing::info!(records = catalogue.len(), "loaded local dataset copy");
            LoadedCatalogue { catalogue, source: DataSource::LocalCopy, served_from: None }
        }
        Ok(None) => {
            tracing::error!("no dataset available");
            LoadedCatalogue { catalogue: Catalogue::default(), source: DataSource::Unavailable, served_from: None }
        }
        Err(e) => {
            tracing::error!(error = %e, "local dataset copy is unreadable");
            LoadedCatalogue { catalogue: Catalogue::default(), source: DataSource::Unavailable, served_from: None }
        }
    }
}

async fn fetch_catalogue(page: &Page, path: &str) -> Result<(Catalogue, ResponseSource), Error> {
    let served = page.get(path).await?;
    if !served.response.status.is_success() {
        return Err(Error::HttpError(format!("{path}: status {}", served.response.status.as_u16())));
    }
    let catalogue = Catalogue::from_json(&served.response.bytes)?;
    Ok((catalogue, served.source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControllerOptions, Registration};
    use crate::fetch::MemoryNetwork;
    use reqwest::Url;
    use std::sync::Arc;

    const DATA: &str = "http://app.test/data.json";

    async fn page(network: &MemoryNetwork, db: &CacheDb) -> Page {
        let options = ControllerOptions::new(Url::parse("http://app.test/").unwrap());
        let registration = Registration::spawn(db.clone(), Arc::new(network.clone()), options).await.unwrap();
        registration.connect().await.unwrap()
    }

    #[tokio::test]
    async fn test_loads_and_persists_dataset() {
        let network = MemoryNetwork::new();
        network.serve(DATA, r#"[{"Analyse_id":1,"Analyse_nom":"Glycémie"}]"#);
        let db = CacheDb::open_in_memory().await.unwrap();
        let page = page(&network, &db).await;

        let loaded = load_catalogue(&page, &db, "./data.json").await;
        assert_eq!(loaded.source, DataSource::Fetched);
        assert_eq!(loaded.catalogue.len(), 1);
        assert!(db.kv_get("cachedData").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_offline_falls_back_to_local_copy() {
        let network = MemoryNetwork::new();
        network.serve(DATA, r#"[{"Analyse_id":1,"Analyse_nom":"Glycémie"}]"#);
        let db = CacheDb::open_in_memory().await.unwrap();
        let page = page(&network, &db).await;
        load_catalogue(&page, &db, "./data.json").await;

        network.set_offline(true);
        let loaded = load_catalogue(&page, &db, "./data.json").await;
        assert_eq!(loaded.source, DataSource::LocalCopy);
        assert_eq!(loaded.catalogue.len(), 1);
        assert_eq!(loaded.source.status_message(), "offline, local data loaded");
    }

    #[tokio::test]
    async fn test_error_status_and_bad_json_fall_back() {
        let network = MemoryNetwork::new();
        let db = CacheDb::open_in_memory().await.unwrap();
        let page = page(&network, &db).await;

        let loaded = load_catalogue(&page, &db, "./data.json").await;
        assert_eq!(loaded.source, DataSource::Unavailable);
        assert!(loaded.catalogue.is_empty());

        network.serve(DATA, "{not json");
        db.kv_set("cachedData", "also not json").await.unwrap();
        let loaded = load_catalogue(&page, &db, "./data.json").await;
        assert_eq!(loaded.source, DataSource::Unavailable);
    }
}
