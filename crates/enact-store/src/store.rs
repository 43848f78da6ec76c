use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use enact_core::Station;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, error, info};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::TacticalStore;

/// SQLite-backed tactical store.
///
/// Holds at most one connection for the life of the process. The connection
/// is opened by [`TacticalStore::connect`] and shared by every caller; it is
/// never opened per call.
pub struct SqliteTacticalStore {
    path: String,
    conn: Mutex<Option<Connection>>,
}

impl SqliteTacticalStore {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            conn: Mutex::new(None),
        }
    }

    /// Read back the stored record for `id`.
    pub fn get(&self, id: i64) -> Result<Option<Station>> {
        let guard = self.lock();
        let conn = connected(&guard)?;
        let record: Option<String> = conn
            .query_row(
                "SELECT record FROM stations WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        match record {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Number of stored stations.
    pub fn count(&self) -> Result<u64> {
        let guard = self.lock();
        let conn = connected(&guard)?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM stations", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open(&self) -> Result<Connection> {
        ensure_parent_dir(&self.path);
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        init_db(&conn)?;
        Ok(conn)
    }
}

#[async_trait]
impl TacticalStore for SqliteTacticalStore {
    async fn connect(&self) -> Result<()> {
        let mut guard = self.lock();
        if guard.is_some() {
            return Ok(());
        }
        match self.open() {
            Ok(conn) => {
                *guard = Some(conn);
                info!(path = %self.path, "connected to tactical store");
                Ok(())
            }
            Err(e) => {
                error!(path = %self.path, error = %e, "tactical store connection failed");
                Err(e)
            }
        }
    }

    async fn upsert(&self, station: &Station) -> Result<()> {
        let id = station.id.ok_or(StoreError::MissingIdentifier)?;
        let record = serde_json::to_string(station)?;
        let (latitude, longitude) = station.position().unzip();

        let guard = self.lock();
        let conn = connected(&guard)?;
        debug!(station_id = id, "save_station_data");
        conn.execute(
            "INSERT INTO stations (id, title, latitude, longitude, record)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                record = excluded.record",
            rusqlite::params![id, station.title(), latitude, longitude, record],
        )?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(conn) = self.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| StoreError::Database(e))?;
        info!(path = %self.path, "tactical store connection closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().is_some()
    }
}

fn connected<'a>(guard: &'a MutexGuard<'_, Option<Connection>>) -> Result<&'a Connection> {
    guard
        .as_ref()
        .ok_or_else(|| StoreError::Unavailable("not connected".to_string()))
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }
}
