pub mod filter;

use std::sync::Arc;

use crate::clipboard::item::{now_millis, ClipboardEntry, EntryPatch};
use crate::clipboard::SystemClipboard;
use crate::sync::error::SyncError;
use crate::sync::handle::EngineHandle;
use crate::sync::types::{EngineState, MutationOutcome};
use filter::{filter_entries, Tab, TabCounts};

/// Translates user gestures into engine calls and serves the rendered view.
pub struct CommandRouter {
    engine: EngineHandle,
    clipboard: Arc<dyn SystemClipboard>,
}

impl CommandRouter {
    pub fn new(engine: EngineHandle, clipboard: Arc<dyn SystemClipboard>) -> Self {
        Self { engine, clipboard }
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    fn find(&self, op: &'static str, id: &str) -> Result<ClipboardEntry, SyncError> {
        self.engine
            .state()
            .view
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| SyncError::NotFound {
                op,
                id: id.to_string(),
            })
    }

    /// Put an entry back on the system clipboard. A failed write is only logged.
    pub fn copy(&self, id: &str) -> Result<(), SyncError> {
        let entry = self.find("copy", id)?;
        if let Err(e) = self.clipboard.copy_text(&entry.content) {
            log::warn!("copy {}: {}", id, e);
        }
        Ok(())
    }

    /// Blank text is never captured.
    pub async fn add_captured(&self, content: &str) -> Result<MutationOutcome, SyncError> {
        if content.trim().is_empty() {
            return Ok(MutationOutcome::Skipped);
        }
        self.engine
            .add_captured(ClipboardEntry::captured(content, now_millis()))
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<MutationOutcome, SyncError> {
        self.engine.delete(id).await
    }

    pub async fn edit(&self, id: &str, content: &str) -> Result<MutationOutcome, SyncError> {
        self.engine.update(id, EntryPatch::content(content)).await
    }

    pub async fn set_favorite(&self, id: &str, value: bool) -> Result<MutationOutcome, SyncError> {
        self.engine.favorite(id, value).await
    }

    pub async fn toggle_favorite(&self, id: &str) -> Result<MutationOutcome, SyncError> {
        let entry = self.find("favorite", id)?;
        self.engine.favorite(id, !entry.is_favorite).await
    }

    pub fn filtered(&self, tab: Tab, query: Option<&str>) -> Vec<ClipboardEntry> {
        let state = self.engine.state();
        filter_entries(&state.view, tab, query)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> TabCounts {
        TabCounts::of(&self.engine.state().view)
    }
}
