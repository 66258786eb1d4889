//! SQLite-backed cache storage.
//!
//! Buckets survive process restarts. Each trait call locks the connection
//! once and never awaits while holding it.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use swcache_net::Request;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::CacheStorage;
use crate::cache::{cache_key, vary_satisfied, CacheEntry, CacheError};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS caches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cache_id INTEGER NOT NULL REFERENCES caches(id) ON DELETE CASCADE,
        url TEXT NOT NULL,
        method TEXT NOT NULL,
        vary TEXT NOT NULL,
        status INTEGER NOT NULL,
        response_url TEXT NOT NULL,
        headers TEXT NOT NULL,
        body BLOB NOT NULL,
        cached_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entries_url ON entries(url);
    CREATE INDEX IF NOT EXISTS idx_entries_cache ON entries(cache_id);
"#;

const DEFAULT_DB_FILE: &str = "caches.db";

const ENTRY_COLUMNS: &str =
    "e.url, e.method, e.vary, e.status, e.response_url, e.headers, e.body, e.cached_at";

/// Cache storage persisted in a SQLite database.
pub struct SqliteCacheStorage {
    conn: Mutex<Connection>,
}

impl SqliteCacheStorage {
    /// Open (or create) a database file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!(path = %path.display(), "Opening cache database");
        Self::with_connection(Connection::open(path)?)
    }

    /// Open the database under the platform data directory.
    pub fn open_default() -> Result<Self, CacheError> {
        Self::new(swcache_common::default_data_dir().join(DEFAULT_DB_FILE))
    }

    /// Create a database that lives only as long as this value.
    pub fn new_in_memory() -> Result<Self, CacheError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn cache_id(conn: &Connection, name: &str) -> Result<Option<i64>, CacheError> {
    Ok(conn
        .query_row(
            "SELECT id FROM caches WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?)
}

fn read_entries(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<CacheEntry>, CacheError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, u16>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, Vec<u8>>(6)?,
            row.get::<_, i64>(7)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (url, method, vary, status, response_url, headers, body, cached_at) = row?;
        entries.push(CacheEntry {
            url,
            method,
            vary_headers: serde_json::from_str(&vary)?,
            status,
            response_url,
            headers: serde_json::from_str(&headers)?,
            body,
            cached_at: cached_at as u64,
        });
    }
    Ok(entries)
}

/// Row ids of the entries in bucket `cache_id` that `request` matches.
fn matching_rows(
    conn: &Connection,
    cache_id: i64,
    request: &Request,
) -> Result<Vec<i64>, CacheError> {
    if request.method != http::Method::GET {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT id, vary FROM entries WHERE cache_id = ?1 AND url = ?2 AND method = ?3",
    )?;
    let rows = stmt.query_map(
        params![cache_id, cache_key(&request.url), request.method.as_str()],
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
    )?;

    let mut ids = Vec::new();
    for row in rows {
        let (id, vary) = row?;
        let pairs: Vec<(String, Option<String>)> = serde_json::from_str(&vary)?;
        if vary_satisfied(&pairs, &request.headers) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        let conn = self.conn.lock().await;
        let created = conn.execute(
            "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, strftime('%s', 'now'))",
            params![name],
        )?;
        if created > 0 {
            debug!(cache = %name, "Created cache");
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        let conn = self.conn.lock().await;
        Ok(cache_id(&conn, name)?.is_some())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let Some(id) = cache_id(&tx, name)? else {
            return Ok(false);
        };
        tx.execute("DELETE FROM entries WHERE cache_id = ?1", params![id])?;
        tx.execute("DELETE FROM caches WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(true)
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    async fn match_request(
        &self,
        request: &Request,
        cache_name: Option<&str>,
    ) -> Result<Option<CacheEntry>, CacheError> {
        if request.method != http::Method::GET {
            return Ok(None);
        }

        let key = cache_key(&request.url);
        let conn = self.conn.lock().await;
        let candidates = match cache_name {
            Some(name) => read_entries(
                &conn,
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries e JOIN caches c ON e.cache_id = c.id \
                     WHERE e.url = ?1 AND c.name = ?2 ORDER BY e.id"
                ),
                params![key, name],
            )?,
            None => read_entries(
                &conn,
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM entries e JOIN caches c ON e.cache_id = c.id \
                     WHERE e.url = ?1 ORDER BY c.id, e.id"
                ),
                params![key],
            )?,
        };

        Ok(candidates.into_iter().find(|entry| entry.matches(request)))
    }

    async fn put_all(
        &self,
        cache_name: &str,
        entries: Vec<(Request, CacheEntry)>,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let id = cache_id(&tx, cache_name)?
            .ok_or_else(|| CacheError::NotFound(cache_name.to_string()))?;

        for (request, entry) in &entries {
            for stale in matching_rows(&tx, id, request)? {
                tx.execute("DELETE FROM entries WHERE id = ?1", params![stale])?;
            }

            let vary = serde_json::to_string(&entry.vary_headers)?;
            tx.execute(
                "INSERT INTO entries
                    (cache_id, url, method, vary, status, response_url, headers, body, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    entry.url,
                    entry.method,
                    vary,
                    entry.status,
                    entry.response_url,
                    serde_json::to_string(&entry.headers)?,
                    entry.body,
                    entry.cached_at as i64,
                ],
            )?;
        }

        tx.commit()?;
        debug!(cache = %cache_name, count = entries.len(), "Stored entries");
        Ok(())
    }

    async fn entries(&self, cache_name: &str) -> Result<Vec<CacheEntry>, CacheError> {
        let conn = self.conn.lock().await;
        if cache_id(&conn, cache_name)?.is_none() {
            return Err(CacheError::NotFound(cache_name.to_string()));
        }
        read_entries(
            &conn,
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM entries e JOIN caches c ON e.cache_id = c.id \
                 WHERE c.name = ?1 ORDER BY e.id"
            ),
            params![cache_name],
        )
    }
}
