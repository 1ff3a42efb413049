use tokio::sync::{mpsc, oneshot, watch};

use super::engine::{Command, EngineEvent, Inbound, Reply};
use super::error::SyncError;
use super::types::{EngineState, MutationOutcome};
use crate::clipboard::item::{ClipboardEntry, EntryPatch};

/// Cheap, cloneable access to a running [`SyncEngine`](super::engine::SyncEngine).
#[derive(Clone)]
pub struct EngineHandle {
    inbox: mpsc::UnboundedSender<Inbound>,
    state: watch::Receiver<EngineState>,
}

impl EngineHandle {
    pub(crate) fn new(
        inbox: mpsc::UnboundedSender<Inbound>,
        state: watch::Receiver<EngineState>,
    ) -> Self {
        Self { inbox, state }
    }

    async fn request(
        &self,
        command: impl FnOnce(Reply) -> Command,
    ) -> Result<MutationOutcome, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.inbox
            .send(Inbound::Command(command(tx)))
            .map_err(|_| SyncError::EngineStopped)?;
        rx.await.map_err(|_| SyncError::EngineStopped)?
    }

    /// Feed a fresh capture. Authenticated sessions mirror it remotely, otherwise it
    /// goes straight to the head of the view.
    pub async fn add_captured(&self, entry: ClipboardEntry) -> Result<MutationOutcome, SyncError> {
        self.request(|reply| Command::AddCaptured { entry, reply })
            .await
    }

    /// Optimistic delete. Resolves once the local store settles; the remote delete
    /// that may follow is best-effort.
    pub async fn delete(&self, id: &str) -> Result<MutationOutcome, SyncError> {
        let id = id.to_string();
        self.request(|reply| Command::Delete { id, reply }).await
    }

    pub async fn update(&self, id: &str, patch: EntryPatch) -> Result<MutationOutcome, SyncError> {
        let id = id.to_string();
        self.request(|reply| Command::Update {
            id,
            patch,
            op: "update",
            reply,
        })
        .await
    }

    pub async fn favorite(&self, id: &str, value: bool) -> Result<MutationOutcome, SyncError> {
        let id = id.to_string();
        self.request(|reply| Command::Update {
            id,
            patch: EntryPatch::favorite(value),
            op: "favorite",
            reply,
        })
        .await
    }

    pub fn notify(&self, event: EngineEvent) -> Result<(), SyncError> {
        self.inbox
            .send(Inbound::External(event))
            .map_err(|_| SyncError::EngineStopped)
    }

    pub fn set_online(&self, online: bool) -> Result<(), SyncError> {
        self.notify(EngineEvent::Connectivity { online })
    }

    /// Latest published state.
    pub fn state(&self) -> EngineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&EngineState) -> bool,
    ) -> Result<EngineState, SyncError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(predicate)
            .await
            .map_err(|_| SyncError::EngineStopped)?;
        Ok((*state).clone())
    }

    pub fn shutdown(&self) {
        let _ = self.inbox.send(Inbound::Shutdown);
    }
}
