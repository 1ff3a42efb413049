use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::broadcast;

use super::{LocalHistoryStore, LocalStoreError};
use crate::clipboard::item::{hash_content, now_millis, ClipboardEntry, EntryKind, EntryPatch};

pub const DEFAULT_HISTORY_LIMIT: u32 = 500;

/// Same content captured again within this window is treated as one capture.
const DEDUP_WINDOW_MS: i64 = 2000;

const SELECT_COLUMNS: &str =
    "SELECT id, content, kind, captured_at, updated_at, is_favorite FROM clipboard_items";

type DbResult<T> = Result<T, LocalStoreError>;

/// Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<Vec<ClipboardEntry>>,
}

impl Database {
    pub fn new(data_dir: &Path) -> DbResult<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| LocalStoreError::Unavailable(format!("create data dir: {}", e)))?;
        let db_path = data_dir.join("clipsync.db");
        log::info!("Database: {}", db_path.display());
        Self::with_connection(Connection::open(&db_path)?)
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> DbResult<Self> {
        let (changes, _) = broadcast::channel(32);
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn();

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS clipboard_items (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'text',
                captured_at INTEGER NOT NULL,
                updated_at INTEGER,
                is_favorite INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_captured_at ON clipboard_items(captured_at DESC);
            CREATE INDEX IF NOT EXISTS idx_content_hash ON clipboard_items(content_hash);
            CREATE INDEX IF NOT EXISTS idx_is_favorite ON clipboard_items(is_favorite);

            CREATE TABLE IF NOT EXISTS app_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO app_config (key, value) VALUES ('history_limit', ?1)",
            params![DEFAULT_HISTORY_LIMIT.to_string()],
        )?;

        log::debug!("Database migrations complete");
        Ok(())
    }

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<ClipboardEntry> {
        let kind: String = row.get(2)?;
        Ok(ClipboardEntry {
            id: row.get(0)?,
            content: row.get(1)?,
            kind: kind.parse().unwrap_or(EntryKind::Text),
            captured_at: row.get(3)?,
            created_at: None,
            updated_at: row.get(4)?,
            is_favorite: row.get::<_, i32>(5)? != 0,
            owner_id: None,
            provenance: None,
        })
    }

    /// Insert a captured entry, skipping it if the same content was captured in the
    /// last 2 seconds. Returns true if inserted.
    pub fn insert_item(&self, entry: &ClipboardEntry) -> DbResult<bool> {
        let inserted = {
            let conn = self.conn();
            let content_hash = hash_content(&entry.content);

            let cutoff = entry.captured_at - DEDUP_WINDOW_MS;
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM clipboard_items WHERE content_hash = ?1 AND captured_at > ?2)",
                params![content_hash, cutoff],
                |row| row.get(0),
            )?;

            if exists {
                false
            } else {
                conn.execute(
                    "INSERT OR REPLACE INTO clipboard_items
                     (id, content, content_hash, kind, captured_at, updated_at, is_favorite)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        entry.id,
                        entry.content,
                        content_hash,
                        entry.kind.as_str(),
                        entry.captured_at,
                        entry.updated_at,
                        entry.is_favorite as i32,
                    ],
                )?;
                true
            }
        };

        if inserted {
            if let Err(e) = self.enforce_history_limit() {
                log::warn!("Failed to enforce history limit: {}", e);
            }
            self.notify_changed();
        }
        Ok(inserted)
    }

    pub fn get_all(&self) -> DbResult<Vec<ClipboardEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{} ORDER BY captured_at DESC", SELECT_COLUMNS))?;
        let items = stmt
            .query_map([], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    pub fn delete_item(&self, id: &str) -> DbResult<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM clipboard_items WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.notify_changed();
        }
        Ok(rows > 0)
    }

    pub fn update_item(&self, id: &str, patch: &EntryPatch) -> DbResult<bool> {
        let rows = {
            let conn = self.conn();
            let now = now_millis();
            let mut rows = 0;
            // An edit counts as a fresh capture and moves to the head
            if let Some(content) = &patch.content {
                rows = conn.execute(
                    "UPDATE clipboard_items
                     SET content = ?1, content_hash = ?2, captured_at = ?3, updated_at = ?3
                     WHERE id = ?4",
                    params![content, hash_content(content), now, id],
                )?;
            }
            if let Some(favorite) = patch.is_favorite {
                rows = conn.execute(
                    "UPDATE clipboard_items SET is_favorite = ?1, updated_at = ?2 WHERE id = ?3",
                    params![favorite as i32, now, id],
                )?;
            }
            rows
        };
        if rows > 0 {
            self.notify_changed();
        }
        Ok(rows > 0)
    }

    pub fn get_count(&self) -> DbResult<u32> {
        let count: u32 =
            self.conn()
                .query_row("SELECT COUNT(*) FROM clipboard_items", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn get_history_limit(&self) -> u32 {
        self.get_setting("history_limit")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    pub fn set_history_limit(&self, limit: u32) -> DbResult<()> {
        self.set_setting("history_limit", &limit.to_string())
    }

    /// Trim the oldest non-favorite entries beyond the history limit.
    pub fn enforce_history_limit(&self) -> DbResult<u32> {
        let limit = self.get_history_limit();
        let count = self.get_count()?;

        if count <= limit {
            return Ok(0);
        }

        let excess = count - limit;
        let rows = self.conn().execute(
            "DELETE FROM clipboard_items WHERE id IN (
                SELECT id FROM clipboard_items
                WHERE is_favorite = 0
                ORDER BY captured_at ASC
                LIMIT ?1
            )",
            params![excess],
        )?;

        if rows > 0 {
            log::info!("Expired {} old items (limit: {})", rows, limit);
        }

        Ok(rows as u32)
    }

    pub fn get_setting(&self, key: &str) -> Option<String> {
        self.conn()
            .query_row(
                "SELECT value FROM app_config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|e| {
                log::warn!("Failed to read setting {}: {}", key, e);
                None
            })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> DbResult<()> {
        self.conn().execute(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn notify_changed(&self) {
        if self.changes.receiver_count() == 0 {
            return;
        }
        match self.get_all() {
            Ok(items) => {
                let _ = self.changes.send(items);
            }
            Err(e) => log::error!("Failed to read history for change notification: {}", e),
        }
    }
}

impl Database {
    /// Run a store call on tokio's blocking pool.
    async fn blocking<T, F>(&self, work: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> DbResult<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || work(&db))
            .await
            .map_err(|e| LocalStoreError::Unavailable(format!("database task failed: {}", e)))?
    }
}

#[async_trait]
impl LocalHistoryStore for Database {
    async fn history(&self) -> Result<Vec<ClipboardEntry>, LocalStoreError> {
        self.blocking(|db| db.get_all()).await
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<ClipboardEntry>> {
        self.changes.subscribe()
    }

    async fn delete(&self, id: &str) -> Result<bool, LocalStoreError> {
        let id = id.to_string();
        self.blocking(move |db| db.delete_item(&id)).await
    }

    async fn update(&self, id: &str, patch: &EntryPatch) -> Result<bool, LocalStoreError> {
        let id = id.to_string();
        let patch = patch.clone();
        self.blocking(move |db| db.update_item(&id, &patch)).await
    }
}
