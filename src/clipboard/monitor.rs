use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use super::item::{hash_content, now_millis, ClipboardEntry};
use super::{ClipboardError, SystemClipboard};
use crate::storage::database::Database;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Hash of text the app itself put on the clipboard, waiting to be seen once.
type PendingSelfCopy = Mutex<Option<String>>;

/// Decides which clipboard reads become captures.
#[derive(Debug, Default)]
struct CaptureFilter {
    last_hash: Option<String>,
}

impl CaptureFilter {
    /// Remember what is on the clipboard at start-up without capturing it.
    fn prime(&mut self, text: &str) {
        if !text.trim().is_empty() {
            self.last_hash = Some(hash_content(text));
        }
    }

    fn accept(&mut self, text: String, self_copy: &PendingSelfCopy) -> Option<ClipboardEntry> {
        if text.trim().is_empty() {
            return None;
        }

        let hash = hash_content(&text);
        let mut pending = self_copy.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.last_hash.as_ref() == Some(&hash) {
            // Copied back what was already there: nothing will change
            if pending.as_ref() == Some(&hash) {
                *pending = None;
            }
            return None;
        }
        self.last_hash = Some(hash);

        // The app wrote this one. Any other change means the marker is stale.
        if pending.take().as_ref() == self.last_hash.as_ref() {
            return None;
        }

        Some(ClipboardEntry::captured(text, now_millis()))
    }
}

/// Polls the system clipboard and appends new text to the local store.
pub struct ClipboardMonitor {
    self_copy: Arc<PendingSelfCopy>,
    poll_interval: Duration,
}

impl ClipboardMonitor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            self_copy: Arc::new(Mutex::new(None)),
            poll_interval,
        }
    }

    /// Tell the monitor that `text` is about to appear because the app wrote it.
    pub fn expect_self_copy(&self, text: &str) {
        *self
            .self_copy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(hash_content(text));
    }

    fn forget_self_copy(&self) {
        *self
            .self_copy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    /// Run the poll loop on its own thread; it never waits on the sync engine.
    pub fn start(&self, db: Arc<Database>) -> JoinHandle<()> {
        let self_copy = self.self_copy.clone();
        let poll_interval = self.poll_interval;

        std::thread::spawn(move || {
            let mut clipboard = match arboard::Clipboard::new() {
                Ok(clipboard) => clipboard,
                Err(e) => {
                    log::error!("Clipboard unavailable, capture disabled: {}", e);
                    return;
                }
            };
            let mut filter = CaptureFilter::default();
            if let Ok(text) = clipboard.get_text() {
                filter.prime(&text);
            }
            log::info!("Monitor started (existing clipboard content ignored)");

            loop {
                std::thread::sleep(poll_interval);

                // Non-text content reads as an error
                let Ok(text) = clipboard.get_text() else {
                    continue;
                };
                let Some(entry) = filter.accept(text, &self_copy) else {
                    continue;
                };

                match db.insert_item(&entry) {
                    Ok(true) => log::debug!(
                        "Captured: id={} hash={}.. len={}",
                        entry.id,
                        &entry.content_hash()[..12],
                        entry.content.len()
                    ),
                    Ok(false) => {}
                    Err(e) => log::error!("Failed to persist capture: {}", e),
                }
            }
        })
    }
}

impl SystemClipboard for ClipboardMonitor {
    fn copy_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.expect_self_copy(text);
        let written = arboard::Clipboard::new()
            .map_err(|e| ClipboardError::Unavailable(e.to_string()))
            .and_then(|mut clipboard| {
                clipboard
                    .set_text(text.to_string())
                    .map_err(|e| ClipboardError::Write(e.to_string()))
            });
        if written.is_err() {
            self.forget_self_copy();
        }
        written
    }
}
