use std::collections::HashMap;

use super::types::{EngineState, SyncStatus};
use crate::clipboard::item::{sort_newest_first, ClipboardEntry};
use crate::identity::Identity;

/// A mutation that has been started but not yet confirmed.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOp {
    /// Holds the removed entry so a failed delete can put it back.
    Delete { entry: ClipboardEntry },
    Update,
}

#[derive(Debug, PartialEq)]
pub enum DeleteStart {
    Started,
    AlreadyPending,
    NotFound,
}

#[derive(Debug, PartialEq)]
pub enum UpdateStart {
    Started,
    AlreadyPending,
    NotFound,
}

/// View, pending operations and status for the active identity.
///
/// Every view-producing step goes through here, so pending deletes are filtered
/// out of local refreshes and remote snapshots alike.
#[derive(Debug, Default)]
pub struct ViewState {
    view: Vec<ClipboardEntry>,
    pending: HashMap<String, PendingOp>,
    status: SyncStatus,
    last_error: Option<String>,
}

impl ViewState {
    pub fn view(&self) -> &[ClipboardEntry] {
        &self.view
    }

    pub fn get(&self, id: &str) -> Option<&ClipboardEntry> {
        self.view.iter().find(|e| e.id == id)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    fn is_pending_delete(&self, id: &str) -> bool {
        matches!(self.pending.get(id), Some(PendingOp::Delete { .. }))
    }

    /// Replace the whole view with a fresh snapshot.
    pub fn replace_view(&mut self, mut entries: Vec<ClipboardEntry>) {
        entries.retain(|e| !self.is_pending_delete(&e.id));
        sort_newest_first(&mut entries);
        self.view = entries;
    }

    /// Put a fresh local capture at the head of the view.
    pub fn push_captured(&mut self, entry: ClipboardEntry) {
        if self.is_pending_delete(&entry.id) || self.get(&entry.id).is_some() {
            return;
        }
        self.view.insert(0, entry);
        sort_newest_first(&mut self.view);
    }

    pub fn begin_delete(&mut self, id: &str) -> DeleteStart {
        if self.pending.contains_key(id) {
            return DeleteStart::AlreadyPending;
        }
        let Some(index) = self.view.iter().position(|e| e.id == id) else {
            return DeleteStart::NotFound;
        };
        let entry = self.view.remove(index);
        self.pending
            .insert(id.to_string(), PendingOp::Delete { entry });
        DeleteStart::Started
    }

    /// Clear a pending delete, handing back the entry it removed.
    pub fn finish_delete(&mut self, id: &str) -> Option<ClipboardEntry> {
        match self.pending.remove(id) {
            Some(PendingOp::Delete { entry }) => Some(entry),
            Some(other) => {
                self.pending.insert(id.to_string(), other);
                None
            }
            None => None,
        }
    }

    /// Put an entry back after a failed delete.
    pub fn restore(&mut self, entry: ClipboardEntry) {
        if self.get(&entry.id).is_some() {
            return;
        }
        self.view.push(entry);
        sort_newest_first(&mut self.view);
    }

    pub fn begin_update(&mut self, id: &str) -> UpdateStart {
        if self.pending.contains_key(id) {
            return UpdateStart::AlreadyPending;
        }
        if self.get(id).is_none() {
            return UpdateStart::NotFound;
        }
        self.pending.insert(id.to_string(), PendingOp::Update);
        UpdateStart::Started
    }

    pub fn finish_update(&mut self, id: &str) {
        if matches!(self.pending.get(id), Some(PendingOp::Update)) {
            self.pending.remove(id);
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn set_status(&mut self, status: SyncStatus) {
        if self.status != status {
            log::debug!("Sync status {:?} -> {:?}", self.status, status);
            self.status = status;
        }
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    /// Forget everything tied to the previous identity.
    pub fn reset(&mut self, status: SyncStatus) {
        self.view.clear();
        self.pending.clear();
        self.last_error = None;
        self.status = status;
    }

    pub fn snapshot(&self, identity: Option<Identity>) -> EngineState {
        EngineState {
            view: self.view.clone(),
            sync_status: self.status,
            last_error: self.last_error.clone(),
            identity,
        }
    }
}
