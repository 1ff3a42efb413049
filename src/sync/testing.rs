//! In-memory fakes of the engine's ports. Every fake records the calls it receives.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Notify};

use super::error::RemoteError;
use super::remote::{RemoteEvent, RemoteHistoryChannel, Subscription};
use crate::clipboard::item::{now_millis, sort_newest_first, ClipboardEntry, EntryKind, EntryPatch, NewEntry};
use crate::identity::{Identity, IdentityProvider};
use crate::storage::{LocalHistoryStore, LocalStoreError};

pub fn remote_entry(id: &str, content: &str, created_at: i64) -> ClipboardEntry {
    ClipboardEntry {
        id: id.to_string(),
        content: content.to_string(),
        kind: EntryKind::Text,
        captured_at: created_at,
        created_at: Some(created_at),
        updated_at: None,
        is_favorite: false,
        owner_id: None,
        provenance: None,
    }
}

pub fn local_entry(id: &str, content: &str, captured_at: i64) -> ClipboardEntry {
    ClipboardEntry {
        id: id.to_string(),
        ..ClipboardEntry::captured(content, captured_at)
    }
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached in time");
}

// ── Remote ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Add { owner: String, content: String },
    Update { owner: String, id: String },
    Delete { owner: String, id: String },
    Subscribe(String),
    List(String),
    CopyBatch(String, usize),
    DeleteBatch(String, usize),
}

#[derive(Default)]
struct RemoteInner {
    collections: HashMap<String, Vec<ClipboardEntry>>,
    calls: Vec<RemoteCall>,
    subscribers: Vec<(String, mpsc::Sender<RemoteEvent>)>,
    next_id: u32,
    fail_delete: bool,
    fail_add_transient: bool,
    fail_subscribe: bool,
    fail_copy_batch: bool,
    fail_delete_batch: bool,
    fail_update: bool,
    hold_initial_snapshot: bool,
    delete_gate: Option<Arc<Notify>>,
    update_gate: Option<Arc<Notify>>,
}

impl RemoteInner {
    fn sorted(&self, owner: &str) -> Vec<ClipboardEntry> {
        let mut entries = self.collections.get(owner).cloned().unwrap_or_default();
        sort_newest_first(&mut entries);
        entries
    }

    fn send_to(&mut self, owner: &str, event: RemoteEvent) {
        self.subscribers.retain(|(_, tx)| !tx.is_closed());
        for (subscribed, tx) in &self.subscribers {
            if subscribed == owner {
                let _ = tx.try_send(event.clone());
            }
        }
    }

    fn publish(&mut self, owner: &str) {
        let snapshot = self.sorted(owner);
        self.send_to(owner, RemoteEvent::Snapshot(snapshot));
    }
}

#[derive(Default)]
pub struct FakeRemote {
    inner: Mutex<RemoteInner>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteInner> {
        self.inner.lock().unwrap()
    }

    pub fn seed(&self, owner: &str, entries: Vec<ClipboardEntry>) {
        let entries = entries
            .into_iter()
            .map(|e| ClipboardEntry {
                owner_id: Some(owner.to_string()),
                ..e
            })
            .collect();
        self.lock().collections.insert(owner.to_string(), entries);
    }

    pub fn entries(&self, owner: &str) -> Vec<ClipboardEntry> {
        self.lock().sorted(owner)
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Deliver a snapshot to subscribers without touching the stored collection.
    pub fn push_snapshot(&self, owner: &str, entries: Vec<ClipboardEntry>) {
        self.lock().send_to(owner, RemoteEvent::Snapshot(entries));
    }

    pub fn disconnect(&self, owner: &str) {
        self.lock()
            .send_to(owner, RemoteEvent::Disconnected("connection reset".to_string()));
    }

    /// Hold every remote delete until the returned gate is notified.
    pub fn gate_deletes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().delete_gate = Some(gate.clone());
        gate
    }

    pub fn gate_updates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().update_gate = Some(gate.clone());
        gate
    }

    pub fn fail_delete(&self, fail: bool) {
        self.lock().fail_delete = fail;
    }

    pub fn fail_add_transient(&self, fail: bool) {
        self.lock().fail_add_transient = fail;
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.lock().fail_subscribe = fail;
    }

    pub fn fail_copy_batch(&self, fail: bool) {
        self.lock().fail_copy_batch = fail;
    }

    pub fn fail_delete_batch(&self, fail: bool) {
        self.lock().fail_delete_batch = fail;
    }

    pub fn fail_update(&self, fail: bool) {
        self.lock().fail_update = fail;
    }

    /// New subscriptions get no snapshot until one is pushed.
    pub fn hold_initial_snapshot(&self, hold: bool) {
        self.lock().hold_initial_snapshot = hold;
    }
}

fn server_error(message: &str) -> RemoteError {
    RemoteError::Status {
        code: 500,
        message: message.to_string(),
    }
}

#[async_trait]
impl RemoteHistoryChannel for FakeRemote {
    async fn add(&self, owner_id: &str, entry: &NewEntry) -> Result<String, RemoteError> {
        let mut inner = self.lock();
        inner.calls.push(RemoteCall::Add {
            owner: owner_id.to_string(),
            content: entry.content.clone(),
        });
        if inner.fail_add_transient {
            return Err(RemoteError::Network("connection refused".to_string()));
        }
        inner.next_id += 1;
        let n = inner.next_id;
        let id = format!("new-{}", n);
        let stored = ClipboardEntry {
            id: id.clone(),
            content: entry.content.clone(),
            kind: entry.kind,
            captured_at: entry.captured_at,
            created_at: Some(10_000 + 1_000 * n as i64),
            updated_at: None,
            is_favorite: entry.is_favorite,
            owner_id: Some(owner_id.to_string()),
            provenance: None,
        };
        inner
            .collections
            .entry(owner_id.to_string())
            .or_default()
            .push(stored);
        inner.publish(owner_id);
        Ok(id)
    }

    async fn update(
        &self,
        owner_id: &str,
        id: &str,
        patch: &EntryPatch,
    ) -> Result<(), RemoteError> {
        let gate = {
            let mut inner = self.lock();
            inner.calls.push(RemoteCall::Update {
                owner: owner_id.to_string(),
                id: id.to_string(),
            });
            inner.update_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut inner = self.lock();
        if inner.fail_update {
            return Err(server_error("update failed"));
        }
        let entry = inner
            .collections
            .get_mut(owner_id)
            .and_then(|entries| entries.iter_mut().find(|e| e.id == id))
            .ok_or_else(|| RemoteError::Status {
                code: 404,
                message: "not found".to_string(),
            })?;
        entry.apply_patch(patch, now_millis());
        inner.publish(owner_id);
        Ok(())
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<(), RemoteError> {
        let gate = {
            let mut inner = self.lock();
            inner.calls.push(RemoteCall::Delete {
                owner: owner_id.to_string(),
                id: id.to_string(),
            });
            inner.delete_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut inner = self.lock();
        if inner.fail_delete {
            return Err(server_error("delete failed"));
        }
        if let Some(entries) = inner.collections.get_mut(owner_id) {
            entries.retain(|e| e.id != id);
        }
        inner.publish(owner_id);
        Ok(())
    }

    async fn subscribe(&self, owner_id: &str) -> Result<Subscription, RemoteError> {
        let mut inner = self.lock();
        inner.calls.push(RemoteCall::Subscribe(owner_id.to_string()));
        if inner.fail_subscribe {
            return Err(RemoteError::Unauthorized("token rejected".to_string()));
        }
        let (tx, rx) = mpsc::channel(64);
        let (shutdown, _) = oneshot::channel();
        if !inner.hold_initial_snapshot {
            let _ = tx.try_send(RemoteEvent::Snapshot(inner.sorted(owner_id)));
        }
        inner.subscribers.push((owner_id.to_string(), tx));
        Ok(Subscription::new(rx, shutdown))
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<ClipboardEntry>, RemoteError> {
        let mut inner = self.lock();
        inner.calls.push(RemoteCall::List(owner_id.to_string()));
        Ok(inner.sorted(owner_id))
    }

    async fn copy_batch(
        &self,
        owner_id: &str,
        entries: &[ClipboardEntry],
    ) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner
            .calls
            .push(RemoteCall::CopyBatch(owner_id.to_string(), entries.len()));
        if inner.fail_copy_batch {
            return Err(server_error("batch write failed"));
        }
        inner
            .collections
            .entry(owner_id.to_string())
            .or_default()
            .extend(entries.iter().cloned());
        inner.publish(owner_id);
        Ok(())
    }

    async fn delete_batch(&self, owner_id: &str, ids: &[String]) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        inner
            .calls
            .push(RemoteCall::DeleteBatch(owner_id.to_string(), ids.len()));
        if inner.fail_delete_batch {
            return Err(server_error("batch delete failed"));
        }
        if let Some(entries) = inner.collections.get_mut(owner_id) {
            entries.retain(|e| !ids.contains(&e.id));
        }
        inner.publish(owner_id);
        Ok(())
    }
}

// ── Local ───────────────────────────────────────────────────────────────────

pub struct FakeLocal {
    items: Mutex<Vec<ClipboardEntry>>,
    calls: Mutex<Vec<String>>,
    fail_delete: AtomicBool,
    changes: broadcast::Sender<Vec<ClipboardEntry>>,
}

impl FakeLocal {
    pub fn with(mut items: Vec<ClipboardEntry>) -> Self {
        sort_newest_first(&mut items);
        let (changes, _) = broadcast::channel(16);
        Self {
            items: Mutex::new(items),
            calls: Mutex::new(Vec::new()),
            fail_delete: AtomicBool::new(false),
            changes,
        }
    }

    /// What the shell's poll loop does: store at the head and notify.
    pub fn capture(&self, entry: ClipboardEntry) {
        let snapshot = {
            let mut items = self.items.lock().unwrap();
            items.insert(0, entry);
            sort_newest_first(&mut items);
            items.clone()
        };
        let _ = self.changes.send(snapshot);
    }

    pub fn items(&self) -> Vec<ClipboardEntry> {
        self.items.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    fn notify(&self) {
        let _ = self.changes.send(self.items());
    }
}

#[async_trait]
impl LocalHistoryStore for FakeLocal {
    async fn history(&self) -> Result<Vec<ClipboardEntry>, LocalStoreError> {
        Ok(self.items())
    }

    fn subscribe(&self) -> broadcast::Receiver<Vec<ClipboardEntry>> {
        self.changes.subscribe()
    }

    async fn delete(&self, id: &str) -> Result<bool, LocalStoreError> {
        self.calls.lock().unwrap().push(format!("delete:{}", id));
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(LocalStoreError::Unavailable("disk full".to_string()));
        }
        let removed = {
            let mut items = self.items.lock().unwrap();
            let before = items.len();
            items.retain(|e| e.id != id);
            items.len() != before
        };
        if removed {
            self.notify();
        }
        Ok(removed)
    }

    async fn update(&self, id: &str, patch: &EntryPatch) -> Result<bool, LocalStoreError> {
        self.calls.lock().unwrap().push(format!("update:{}", id));
        let updated = {
            let mut items = self.items.lock().unwrap();
            let found = match items.iter_mut().find(|e| e.id == id) {
                Some(entry) => {
                    entry.apply_patch(patch, now_millis());
                    true
                }
                None => false,
            };
            if found {
                sort_newest_first(&mut items);
            }
            found
        };
        if updated {
            self.notify();
        }
        Ok(updated)
    }
}

// ── Identity ────────────────────────────────────────────────────────────────

pub struct FakeIdentity {
    current: watch::Sender<Option<Identity>>,
}

impl FakeIdentity {
    pub fn new(initial: Option<Identity>) -> Arc<Self> {
        let (current, _) = watch::channel(initial);
        Arc::new(Self { current })
    }

    pub fn set(&self, identity: Option<Identity>) {
        self.current.send_replace(identity);
    }
}

impl IdentityProvider for FakeIdentity {
    fn current_identity(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    fn on_identity_changed(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}
