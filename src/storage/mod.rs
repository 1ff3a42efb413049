pub mod database;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::clipboard::item::{ClipboardEntry, EntryPatch};

#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("local store unavailable: {0}")]
    Unavailable(String),
}

/// The durable, append-at-head history owned by the desktop shell.
///
/// It stays the offline-safe mirror regardless of which identity is active:
/// deletes always land here first.
#[async_trait]
pub trait LocalHistoryStore: Send + Sync {
    /// Full local history, newest first.
    async fn history(&self) -> Result<Vec<ClipboardEntry>, LocalStoreError>;

    /// Receives the full updated list after every capture or local mutation.
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<Vec<ClipboardEntry>>;

    /// Returns whether an entry existed and was removed.
    async fn delete(&self, id: &str) -> Result<bool, LocalStoreError>;

    /// Returns whether an entry existed and was updated.
    async fn update(&self, id: &str, patch: &EntryPatch) -> Result<bool, LocalStoreError>;
}
