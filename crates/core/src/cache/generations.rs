//! Cache generation bookkeeping.
//!
//! A generation is a named set of entries. The name is the version tag of the
//! controller that created it. The tag recorded under `active_version` is the
//! only generation lookups are served from.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

const ACTIVE_VERSION_KEY: &str = "active_version";

pub(crate) fn ensure_generation(conn: &rusqlite::Connection, name: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub(crate) fn read_active_version(conn: &rusqlite::Connection) -> Result<Option<String>, Error> {
    let value = conn
        .query_row(
            "SELECT value FROM controller_state WHERE key = ?1",
            params![ACTIVE_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

impl CacheDb {
    /// Enumerate generation names, oldest first.
    pub async fn list_generations(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Open a generation, creating it empty if it doesn't exist.
    pub async fn open_generation(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| ensure_generation(conn, &name))
            .await
            .map_err(Error::from)
    }

    /// Check whether a generation exists.
    pub async fn has_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM generations WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and all of its entries.
    ///
    /// Returns false if no such generation existed.
    pub async fn delete_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every generation whose name differs from `keep`.
    ///
    /// Returns the deleted names.
    pub async fn delete_generations_except(&self, keep: &str) -> Result<Vec<String>, Error> {
        let keep = keep.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let stale = {
                    let mut stmt = tx.prepare("SELECT name FROM generations WHERE name <> ?1 ORDER BY name")?;
                    stmt.query_map(params![keep], |row| row.get(0))?
                        .collect::<Result<Vec<String>, _>>()?
                };
                tx.execute("DELETE FROM generations WHERE name <> ?1", params![keep])?;
                tx.commit()?;
                Ok(stale)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every generation, including the current one.
    ///
    /// Returns the number of deleted generations.
    pub async fn delete_all_generations(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM generations", [])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// The version tag recorded as current, if any controller has activated.
    pub async fn active_version(&self) -> Result<Option<String>, Error> {
        self.conn
            .call(|conn| read_active_version(conn))
            .await
            .map_err(Error::from)
    }

    /// Record `version` as the current generation.
    pub async fn set_active_version(&self, version: &str) -> Result<(), Error> {
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO controller_state (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![ACTIVE_VERSION_KEY, version],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
