use std::path::Path;

use log::warn;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::MediaUri;
use crate::store::UriStore;

/// SQLite file holding the selected URIs and the flat preference record.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS selected_uris (
              seq INTEGER PRIMARY KEY AUTOINCREMENT,
              uri TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_selected_uris_uri ON selected_uris(uri);

            CREATE TABLE IF NOT EXISTS import_origins (
              source TEXT PRIMARY KEY NOT NULL,
              stored TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS preferences (
              key TEXT PRIMARY KEY NOT NULL,
              value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn list_uris(&self) -> Result<Vec<MediaUri>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uri FROM selected_uris ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut uris = Vec::new();
        for row in rows {
            uris.push(MediaUri::new(row?));
        }
        Ok(uris)
    }

    pub fn contains_uri(&self, uri: &MediaUri) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT seq FROM selected_uris WHERE uri = ?1 LIMIT 1",
                params![uri.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Raw append without the presence check. Only legacy data and tests
    /// should ever produce duplicates this way.
    pub fn append_uri(&self, uri: &MediaUri) -> Result<()> {
        self.conn.execute(
            "INSERT INTO selected_uris (uri) VALUES (?1)",
            params![uri.as_str()],
        )?;
        Ok(())
    }

    pub fn delete_uri(&self, uri: &MediaUri) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM selected_uris WHERE uri = ?1",
            params![uri.as_str()],
        )?;
        Ok(removed)
    }

    pub fn count_uris(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM selected_uris", [], |r| r.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn set_origin(&self, source: &MediaUri, stored: &MediaUri) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO import_origins (source, stored) VALUES (?1, ?2)
            ON CONFLICT(source) DO UPDATE SET stored=excluded.stored
            "#,
            params![source.as_str(), stored.as_str()],
        )?;
        Ok(())
    }

    pub fn get_origin(&self, source: &MediaUri) -> Result<Option<MediaUri>> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT stored FROM import_origins WHERE source = ?1",
                params![source.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(stored.map(MediaUri::new))
    }

    pub fn get_pref(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_pref(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO preferences (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }
}

impl UriStore for SqliteStore {
    fn all(&self) -> Vec<MediaUri> {
        match self.list_uris() {
            Ok(uris) => uris,
            Err(err) => {
                warn!("failed to read selected URIs, treating store as empty: {err}");
                Vec::new()
            }
        }
    }

    fn add(&mut self, uri: &MediaUri) -> Result<()> {
        if !self.contains_uri(uri)? {
            self.append_uri(uri)?;
        }
        Ok(())
    }

    fn remove(&mut self, uri: &MediaUri) -> Result<()> {
        self.delete_uri(uri)?;
        Ok(())
    }

    fn record_origin(&mut self, source: &MediaUri, stored: &MediaUri) -> Result<()> {
        self.set_origin(source, stored)
    }

    fn stored_for(&self, source: &MediaUri) -> Option<MediaUri> {
        match self.get_origin(source) {
            Ok(stored) => stored,
            Err(err) => {
                warn!("failed to look up import origin of {source}: {err}");
                None
            }
        }
    }
}
