//! Response entries stored inside a generation.

use super::connection::CacheDb;
use super::generations::{ensure_generation, read_active_version};
use super::hash::compute_request_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

/// A stored response snapshot for one request descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub request_key: String,
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: String,
}

impl StoredResponse {
    /// Build a snapshot for `method url`, stamping it with the current time.
    pub fn new(
        method: &str, url: &str, status_code: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            request_key: compute_request_key(method, url),
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            status_code,
            headers,
            body: body.into(),
            stored_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Body interpreted as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

fn upsert(conn: &rusqlite::Connection, generation: &str, entry: &StoredResponse) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&entry.headers)?;
    conn.execute(
        "INSERT INTO entries (
            generation, request_key, method, url, status_code, headers_json, body, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(generation, request_key) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            status_code = excluded.status_code,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            generation,
            &entry.request_key,
            &entry.method,
            &entry.url,
            entry.status_code,
            headers_json,
            &entry.body,
            &entry.stored_at,
        ],
    )?;
    Ok(())
}

impl CacheDb {
    /// Look up a request in one generation.
    ///
    /// Returns None if the generation or the entry doesn't exist.
    pub async fn match_entry(&self, generation: &str, method: &str, url: &str) -> Result<Option<StoredResponse>, Error> {
        let generation = generation.to_string();
        let key = compute_request_key(method, url);
        self.conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let row = conn
                    .query_row(
                        "SELECT request_key, method, url, status_code, headers_json, body, stored_at
                         FROM entries WHERE generation = ?1 AND request_key = ?2",
                        params![generation, key],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, u16>(3)?,
                                row.get::<_, String>(4)?,
                                row.get::<_, Vec<u8>>(5)?,
                                row.get::<_, String>(6)?,
                            ))
                        },
                    )
                    .optional()?;

                match row {
                    Some((request_key, method, url, status_code, headers_json, body, stored_at)) => {
                        let headers = serde_json::from_str(&headers_json)?;
                        Ok(Some(StoredResponse { request_key, method, url, status_code, headers, body, stored_at }))
                    }
                    None => Ok(None),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Store an entry, creating the generation if needed.
    pub async fn put_entry(&self, generation: &str, entry: &StoredResponse) -> Result<(), Error> {
        let generation = generation.to_string();
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_generation(&tx, &generation)?;
                upsert(&tx, &generation, &entry)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store an entry only while `generation` is still the recorded current one.
    ///
    /// Returns false when the write was discarded because another version has
    /// since become current. A deleted-but-current generation is recreated.
    pub async fn put_if_current(&self, generation: &str, entry: &StoredResponse) -> Result<bool, Error> {
        let generation = generation.to_string();
        let entry = entry.clone();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let tx = conn.transaction()?;
                if read_active_version(&tx)?.as_deref() != Some(generation.as_str()) {
                    return Ok(false);
                }
                ensure_generation(&tx, &generation)?;
                upsert(&tx, &generation, &entry)?;
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(Error::from)
    }

    /// Write a complete set of entries into a generation in one transaction.
    ///
    /// Either every entry lands or none does.
    pub async fn install_generation(&self, generation: &str, entries: Vec<StoredResponse>) -> Result<(), Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                ensure_generation(&tx, &generation)?;
                for entry in &entries {
                    upsert(&tx, &generation, entry)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries stored in a generation.
    pub async fn count_entries(&self, generation: &str) -> Result<u64, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE generation = ?1",
                    params![generation],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(url: &str, body: &str) -> StoredResponse {
        StoredResponse::new(
            "GET",
            url,
            200,
            vec![("content-type".to_string(), "text/plain".to_string())],
            body.as_bytes().to_vec(),
        )
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("https://app.test/style.css", "body{}");
        db.put_entry("v1", &entry).await.unwrap();

        let found = db
            .match_entry("v1", "GET", "https://app.test/style.css")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, entry);
        assert_eq!(found.body_text(), "body{}");
    }

    #[tokio::test]
    async fn test_match_is_scoped_to_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("v1", &make_entry("https://app.test/a", "old")).await.unwrap();

        let other = db.match_entry("v2", "GET", "https://app.test/a").await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("v1", &make_entry("https://app.test/a", "old")).await.unwrap();
        db.put_entry("v1", &make_entry("https://app.test/a", "new")).await.unwrap();

        let found = db.match_entry("v1", "GET", "https://app.test/a").await.unwrap().unwrap();
        assert_eq!(found.body_text(), "new");
        assert_eq!(db.count_entries("v1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_generation_cascades() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry("v1", &make_entry("https://app.test/a", "x")).await.unwrap();
        db.delete_generation("v1").await.unwrap();

        assert_eq!(db.count_entries("v1").await.unwrap(), 0);
        assert!(db.match_entry("v1", "GET", "https://app.test/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_if_current_discards_superseded_writes() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.set_active_version("v2").await.unwrap();

        let stored = db.put_if_current("v1", &make_entry("https://app.test/a", "late")).await.unwrap();
        assert!(!stored);
        assert!(!db.has_generation("v1").await.unwrap());

        let stored = db.put_if_current("v2", &make_entry("https://app.test/a", "fresh")).await.unwrap();
        assert!(stored);
        assert!(db.has_generation("v2").await.unwrap());
    }

    #[tokio::test]
    async fn test_install_generation_writes_all_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entries = vec![
            make_entry("https://app.test/", "index"),
            make_entry("https://app.test/app.js", "js"),
            make_entry("https://app.test/offline.html", "offline"),
        ];
        db.install_generation("v1", entries.clone()).await.unwrap();

        for entry in &entries {
            let found = db.match_entry("v1", "GET", &entry.url).await.unwrap();
            assert_eq!(found.as_ref(), Some(entry));
        }
    }
}
