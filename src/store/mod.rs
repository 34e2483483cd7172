//! SQLite persistence for credentials, plays, rankings and audio features.
//!
//! The store owns a single connection behind a mutex. Every mutating sequence
//! goes through [`ListeningStore::write`], which runs inside one transaction:
//! the closure's `Ok` commits, any `Err` drops the transaction and rolls back.
//! Callers never hold the connection across a network call.

pub mod credentials;
pub mod features;
pub mod plays;
pub mod rankings;
pub mod schema;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use tracing::info;

use crate::error::{Error, Result};
use schema::{BASE_DB_VERSION, LISTENING_VERSIONED_SCHEMAS};

#[derive(Clone)]
pub struct ListeningStore {
    conn: Arc<Mutex<Connection>>,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    let latest_version = LISTENING_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &LISTENING_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |r| r.get(0),
    )?;

    if table_count == 0 {
        info!("Creating listening db schema at version {}", latest_version);
        let tx = conn.transaction()?;
        latest_schema.create(&tx)?;
        tx.commit()?;
        return Ok(());
    }

    let mut current_version = if db_version < BASE_DB_VERSION as i64 {
        0
    } else {
        (db_version - BASE_DB_VERSION as i64) as usize
    };

    if current_version >= latest_version {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for schema in LISTENING_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
        if let Some(migration_fn) = schema.migration {
            info!(
                "Migrating listening db from version {} to {}",
                current_version, schema.version
            );
            migration_fn(&tx)?;
        }
        current_version = schema.version;
    }
    tx.pragma_update(None, "user_version", (BASE_DB_VERSION + current_version) as i64)?;
    tx.commit()?;
    Ok(())
}

impl ListeningStore {
    /// Opens (and creates if needed) the database file at `db_path`.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Config(format!("Cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrate_if_needed(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied
        // transaction behind, so the connection is still usable.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs read-only queries against the connection.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock();
        f(&conn)
    }

    /// Runs `f` as one atomic unit: committed on `Ok`, rolled back on `Err`.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

pub(crate) fn millis_to_datetime(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_schema_once() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("listening.db");

        let store = ListeningStore::open(&db_path).unwrap();
        store
            .write(|tx| {
                tx.execute(
                    "INSERT INTO audio_features (track_id, danceability, energy, key, loudness, mode,
                     speechiness, acousticness, instrumentalness, liveness, valence, tempo,
                     duration_ms, time_signature)
                     VALUES ('t1', 0.1, 0.2, 1, -5.0, 1, 0.1, 0.1, 0.0, 0.1, 0.5, 120.0, 1000, 4)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        drop(store);

        // reopening must not try to create the tables again
        let store = ListeningStore::open(&db_path).unwrap();
        let count: i64 = store
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM audio_features", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let store = ListeningStore::open_in_memory().unwrap();

        let result: Result<()> = store.write(|tx| {
            tx.execute(
                "INSERT INTO top_artists (user_id, artist_id, artist_name, term, rank, genres, popularity)
                 VALUES ('u', 'a', 'A', 'short_term', 1, '', 10)",
                [],
            )?;
            Err(Error::Config("boom".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = store
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM top_artists", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_millis_round_trip() {
        let dt = millis_to_datetime(1_700_000_000_123).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_123);
    }
}
