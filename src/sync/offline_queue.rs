use std::collections::VecDeque;

use crate::clipboard::item::ClipboardEntry;

#[derive(Debug, Clone, PartialEq)]
struct QueuedCapture {
    owner_id: String,
    entry: ClipboardEntry,
}

/// Captures that could not be mirrored to the remote store while offline.
/// Keeps only the latest capture per content and owner.
#[derive(Debug, Default)]
pub struct OfflineQueue {
    queue: VecDeque<QueuedCapture>,
}

impl OfflineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, owner_id: &str, entry: ClipboardEntry) {
        self.queue
            .retain(|q| !(q.owner_id == owner_id && q.entry.content == entry.content));
        self.queue.push_back(QueuedCapture {
            owner_id: owner_id.to_string(),
            entry,
        });
    }

    pub fn contains(&self, owner_id: &str, content: &str) -> bool {
        self.queue
            .iter()
            .any(|q| q.owner_id == owner_id && q.entry.content == content)
    }

    /// Take every capture queued for `owner_id`, oldest first.
    pub fn drain_for(&mut self, owner_id: &str) -> Vec<ClipboardEntry> {
        let mut drained = Vec::new();
        self.queue.retain(|q| {
            if q.owner_id == owner_id {
                drained.push(q.entry.clone());
                false
            } else {
                true
            }
        });
        drained
    }

    /// Drop captures that belong to any other owner.
    pub fn retain_owner(&mut self, owner_id: Option<&str>) {
        let before = self.queue.len();
        self.queue.retain(|q| Some(q.owner_id.as_str()) == owner_id);
        let dropped = before - self.queue.len();
        if dropped > 0 {
            log::info!("Dropped {} queued captures of a previous identity", dropped);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
