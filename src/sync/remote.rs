use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::error::{MigrationError, RemoteError};
use super::migration::{self, MigrationReport};
use crate::clipboard::item::{ClipboardEntry, EntryPatch, NewEntry};

/// What a live subscription delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// Full ordered history of the owner, newest first. Always replaces the previous one.
    Snapshot(Vec<ClipboardEntry>),
    /// Transport dropped; the channel keeps trying to come back on its own.
    Disconnected(String),
}

/// A live push stream for one owner. Dropping it unsubscribes.
pub struct Subscription {
    events: mpsc::Receiver<RemoteEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<RemoteEvent>, shutdown: oneshot::Sender<()>) -> Self {
        Self {
            events,
            shutdown: Some(shutdown),
        }
    }

    /// `None` once the channel has ended the subscription for good.
    pub async fn next_event(&mut self) -> Option<RemoteEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// A per-owner remote collection of history entries.
#[async_trait]
pub trait RemoteHistoryChannel: Send + Sync {
    /// Insert and return the store-assigned id. The store stamps `created_at`.
    async fn add(&self, owner_id: &str, entry: &NewEntry) -> Result<String, RemoteError>;

    /// Apply a partial change; the store stamps `updated_at`.
    async fn update(&self, owner_id: &str, id: &str, patch: &EntryPatch)
        -> Result<(), RemoteError>;

    async fn delete(&self, id: &str, owner_id: &str) -> Result<(), RemoteError>;

    async fn subscribe(&self, owner_id: &str) -> Result<Subscription, RemoteError>;

    /// Every entry filed under the owner, newest first.
    async fn list(&self, owner_id: &str) -> Result<Vec<ClipboardEntry>, RemoteError>;

    /// Atomically write all entries (ids kept) into the owner's collection.
    async fn copy_batch(&self, owner_id: &str, entries: &[ClipboardEntry])
        -> Result<(), RemoteError>;

    /// Atomically delete the given ids from the owner's collection.
    async fn delete_batch(&self, owner_id: &str, ids: &[String]) -> Result<(), RemoteError>;

    /// Move every entry from one owner to another: copy batch first, delete batch after.
    async fn migrate_all(
        &self,
        from_owner: &str,
        to_owner: &str,
    ) -> Result<MigrationReport, MigrationError> {
        migration::migrate_all(self, from_owner, to_owner).await
    }
}
