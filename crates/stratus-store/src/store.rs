//! SQLite-backed cache store with namespaced collections.
//!
//! Each collection maps keys to JSON values stamped with a last-write
//! timestamp. Every public operation degrades on storage faults instead of
//! failing: `get` becomes a miss, `put`/`delete` report `false`, and a
//! structural fault (missing table, corrupt file) triggers a single
//! delete-and-rebuild of the database followed by one retry.

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Independent key namespaces within the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Normalized forecast payloads keyed by subject.
    Forecast,
    /// Reverse-geocode results keyed by rounded coordinates.
    Geocode,
    /// Locally persisted location list (backend-unreachable fallback).
    Locations,
}

impl Collection {
    pub const ALL: [Collection; 3] =
        [Collection::Forecast, Collection::Geocode, Collection::Locations];

    fn table(self) -> &'static str {
        match self {
            Collection::Forecast => "forecast_cache",
            Collection::Geocode => "geocode_cache",
            Collection::Locations => "locations_cache",
        }
    }
}

/// A cached value together with its last-write timestamp (ms since epoch).
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub updated_at: i64,
}

struct Inner {
    conn: Connection,
    path: Option<PathBuf>,
    rebuilt: bool,
}

/// Shared handle to the cache database.
///
/// Cloning is cheap; all clones serialize on one connection.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Mutex<Inner>>,
}

impl CacheStore {
    /// Open (or create) the cache database at the given path.
    ///
    /// An unreadable or structurally broken database is deleted and
    /// recreated from empty rather than reported as an error.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let conn = match Self::open_and_verify(&path) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Cache database unusable ({}), rebuilding from empty", e);
                let _ = std::fs::remove_file(&path);
                Self::open_and_verify(&path)?
            }
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                conn,
                path: Some(path),
                rebuilt: false,
            })),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                conn,
                path: None,
                rebuilt: false,
            })),
        })
    }

    fn open_and_verify(path: &Path) -> anyhow::Result<Connection> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;

        // All collections must exist after init; a database that still
        // lacks one is structurally broken.
        for collection in Collection::ALL {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![collection.table()],
                |row| row.get(0),
            )?;
            if count == 0 {
                anyhow::bail!("missing collection table {}", collection.table());
            }
        }

        Ok(conn)
    }

    /// Get the stored value for a key, or `None` on miss or storage fault.
    pub fn get(&self, collection: Collection, key: &str) -> Option<Value> {
        self.get_entry(collection, key).map(|entry| entry.value)
    }

    /// Get the stored value together with its last-write timestamp.
    pub fn get_entry(&self, collection: Collection, key: &str) -> Option<CacheEntry> {
        let row = self.run(collection, |conn| {
            let sql = format!(
                "SELECT value, updated_at FROM {} WHERE key = ?1",
                collection.table()
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![key])?;
            match rows.next()? {
                Some(row) => Ok(Some((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))),
                None => Ok(None),
            }
        });

        let (raw, updated_at) = match row {
            Some(Some(found)) => found,
            Some(None) => return None,
            None => return None,
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(CacheEntry { value, updated_at }),
            Err(e) => {
                tracing::warn!("Discarding unparseable cache entry {}: {}", key, e);
                self.delete(collection, key);
                None
            }
        }
    }

    /// Store a value under a key, overwriting any previous entry and
    /// stamping the current time. Returns `false` on storage fault.
    pub fn put(&self, collection: Collection, key: &str, value: &Value) -> bool {
        let raw = value.to_string();
        let now = Utc::now().timestamp_millis();

        self.run(collection, |conn| {
            let sql = format!(
                "INSERT OR REPLACE INTO {} (key, value, updated_at) VALUES (?1, ?2, ?3)",
                collection.table()
            );
            conn.execute(&sql, params![key, raw, now])?;
            Ok(())
        })
        .is_some()
    }

    /// Remove an entry. Returns `true` if a row was deleted.
    pub fn delete(&self, collection: Collection, key: &str) -> bool {
        self.run(collection, |conn| {
            let sql = format!("DELETE FROM {} WHERE key = ?1", collection.table());
            Ok(conn.execute(&sql, params![key])?)
        })
        .map(|n| n > 0)
        .unwrap_or(false)
    }

    /// Delete entries older than `max_age` from every collection.
    ///
    /// Best effort: a collection that fails to sweep is skipped and left
    /// for the next pass. Returns the number of entries removed.
    pub fn sweep(&self, max_age: Duration) -> u64 {
        let now = Utc::now().timestamp_millis();
        let cutoff = now - max_age.as_millis() as i64;
        let mut removed = 0u64;

        for collection in Collection::ALL {
            let swept = self.run(collection, |conn| {
                let sql = format!(
                    "DELETE FROM {} WHERE updated_at < ?1",
                    collection.table()
                );
                Ok(conn.execute(&sql, params![cutoff])? as u64)
            });
            removed += swept.unwrap_or(0);
        }

        if removed > 0 {
            tracing::debug!("Swept {} expired cache entries", removed);
        }
        removed
    }

    /// Run an operation against the connection, rebuilding the database
    /// once per process and retrying if the first attempt faults.
    fn run<T>(
        &self,
        collection: Collection,
        op: impl Fn(&Connection) -> rusqlite::Result<T>,
    ) -> Option<T> {
        let mut inner = self.inner.lock();

        match op(&inner.conn) {
            Ok(value) => Some(value),
            Err(first) => {
                if inner.rebuilt {
                    tracing::warn!(
                        "Cache operation on {} failed: {}",
                        collection.table(),
                        first
                    );
                    return None;
                }

                tracing::warn!(
                    "Cache operation on {} failed ({}), rebuilding store",
                    collection.table(),
                    first
                );
                inner.rebuilt = true;

                if let Err(e) = rebuild(&mut inner) {
                    tracing::warn!("Cache rebuild failed: {}", e);
                    return None;
                }

                match op(&inner.conn) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::warn!("Cache operation failed after rebuild: {}", e);
                        None
                    }
                }
            }
        }
    }

    /// Store a value with an explicit timestamp (for expiry tests).
    #[cfg(test)]
    pub(crate) fn put_at(
        &self,
        collection: Collection,
        key: &str,
        value: &Value,
        updated_at: i64,
    ) -> bool {
        let raw = value.to_string();
        self.run(collection, |conn| {
            let sql = format!(
                "INSERT OR REPLACE INTO {} (key, value, updated_at) VALUES (?1, ?2, ?3)",
                collection.table()
            );
            conn.execute(&sql, params![key, raw, updated_at])?;
            Ok(())
        })
        .is_some()
    }

    /// Execute raw SQL against the store (for fault-injection tests).
    #[cfg(test)]
    fn execute_for_test(&self, sql: &str) {
        let inner = self.inner.lock();
        #[allow(clippy::unwrap_used)]
        inner.conn.execute_batch(sql).unwrap();
    }
}

fn rebuild(inner: &mut Inner) -> anyhow::Result<()> {
    // Release the old handle before touching the file.
    let fresh = Connection::open_in_memory()?;
    drop(std::mem::replace(&mut inner.conn, fresh));

    if let Some(path) = &inner.path {
        let _ = std::fs::remove_file(path);
        inner.conn = Connection::open(path)?;
    }

    init_schema(&inner.conn)?;
    Ok(())
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS forecast_cache (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS geocode_cache (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS locations_cache (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_forecast_updated ON forecast_cache(updated_at);
        CREATE INDEX IF NOT EXISTS idx_geocode_updated ON geocode_cache(updated_at);
        CREATE INDEX IF NOT EXISTS idx_locations_updated ON locations_cache(updated_at);
        "#,
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_and_get() {
        let store = CacheStore::in_memory().unwrap();
        let value = json!({"current": {"temperature_2m": 28.4}});

        assert!(store.put(Collection::Forecast, "weather:13.75:100.5", &value));
        let got = store.get(Collection::Forecast, "weather:13.75:100.5").unwrap();
        assert_eq!(got, value);
    }

    #[test]
    fn test_miss_returns_none() {
        let store = CacheStore::in_memory().unwrap();
        assert!(store.get(Collection::Forecast, "nonexistent").is_none());
    }

    #[test]
    fn test_put_overwrites_and_restamps() {
        let store = CacheStore::in_memory().unwrap();
        let key = "weather:1:2";

        store.put_at(Collection::Forecast, key, &json!({"v": 1}), 1_000);
        store.put(Collection::Forecast, key, &json!({"v": 2}));

        let entry = store.get_entry(Collection::Forecast, key).unwrap();
        assert_eq!(entry.value, json!({"v": 2}));
        assert!(entry.updated_at > 1_000);
    }

    #[test]
    fn test_collections_do_not_collide() {
        let store = CacheStore::in_memory().unwrap();
        let key = "13.756,100.502";

        store.put(Collection::Forecast, key, &json!("forecast"));
        store.put(Collection::Geocode, key, &json!("geocode"));

        assert_eq!(store.get(Collection::Forecast, key).unwrap(), json!("forecast"));
        assert_eq!(store.get(Collection::Geocode, key).unwrap(), json!("geocode"));

        store.delete(Collection::Forecast, key);
        assert!(store.get(Collection::Forecast, key).is_none());
        assert_eq!(store.get(Collection::Geocode, key).unwrap(), json!("geocode"));
    }

    #[test]
    fn test_delete() {
        let store = CacheStore::in_memory().unwrap();
        store.put(Collection::Forecast, "k", &json!(1));

        assert!(store.delete(Collection::Forecast, "k"));
        assert!(store.get(Collection::Forecast, "k").is_none());
        assert!(!store.delete(Collection::Forecast, "k"));
    }

    #[test]
    fn test_sweep_deletes_only_expired() {
        let store = CacheStore::in_memory().unwrap();
        let max_age = Duration::from_secs(60 * 60);
        let now = Utc::now().timestamp_millis();

        store.put_at(Collection::Forecast, "fresh", &json!(1), now - 1);
        store.put_at(
            Collection::Forecast,
            "expired",
            &json!(2),
            now - (max_age.as_millis() as i64 + 1),
        );

        let removed = store.sweep(max_age);

        assert_eq!(removed, 1);
        assert!(store.get(Collection::Forecast, "fresh").is_some());
        assert!(store.get(Collection::Forecast, "expired").is_none());
    }

    #[test]
    fn test_sweep_covers_all_collections() {
        let store = CacheStore::in_memory().unwrap();
        let max_age = Duration::from_secs(1);
        let old = Utc::now().timestamp_millis() - 10_000;

        store.put_at(Collection::Forecast, "a", &json!(1), old);
        store.put_at(Collection::Geocode, "b", &json!(2), old);
        store.put_at(Collection::Locations, "c", &json!(3), old);

        assert_eq!(store.sweep(max_age), 3);
    }

    #[test]
    fn test_missing_table_rebuilds_once_and_retries() {
        let store = CacheStore::in_memory().unwrap();
        store.put(Collection::Geocode, "kept-elsewhere", &json!(1));

        store.execute_for_test("DROP TABLE forecast_cache;");

        // The failed put rebuilds the schema and retries transparently.
        assert!(store.put(Collection::Forecast, "k", &json!({"v": 1})));
        assert_eq!(store.get(Collection::Forecast, "k").unwrap(), json!({"v": 1}));
    }

    #[test]
    fn test_unparseable_entry_degrades_to_miss() {
        let store = CacheStore::in_memory().unwrap();
        store.execute_for_test(
            "INSERT INTO forecast_cache (key, value, updated_at) VALUES ('bad', '{not json', 0);",
        );

        assert!(store.get(Collection::Forecast, "bad").is_none());
    }

    #[test]
    fn test_open_rebuilds_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        std::fs::write(&path, b"definitely not a sqlite database, promise").unwrap();

        let store = CacheStore::open(&path).unwrap();
        assert!(store.put(Collection::Forecast, "k", &json!(1)));
        assert_eq!(store.get(Collection::Forecast, "k").unwrap(), json!(1));
    }

    #[test]
    fn test_open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let store = CacheStore::open(&path).unwrap();
            store.put(Collection::Forecast, "k", &json!({"v": 42}));
        }

        let reopened = CacheStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(Collection::Forecast, "k").unwrap(),
            json!({"v": 42})
        );
    }
}
