use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::error::{MigrationError, RemoteError, SyncError};
use super::handle::EngineHandle;
use super::history_sync::unique_local;
use super::migration::MigrationReport;
use super::offline_queue::OfflineQueue;
use super::remote::{RemoteEvent, RemoteHistoryChannel};
use super::state::{DeleteStart, UpdateStart, ViewState};
use super::types::{EngineState, MutationOutcome, SyncStatus};
use crate::clipboard::item::{ClipboardEntry, EntryPatch, NewEntry};
use crate::identity::{Identity, IdentityProvider};
use crate::storage::{LocalHistoryStore, LocalStoreError};

/// Notifications from the outside world.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The local store changed; carries its full list.
    LocalHistoryChanged(Vec<ClipboardEntry>),
    IdentityChanged(Option<Identity>),
    /// The shell's online/offline signal.
    Connectivity { online: bool },
}

pub(crate) type Reply = oneshot::Sender<Result<MutationOutcome, SyncError>>;

/// Caller-initiated mutations; each one is answered on its reply channel.
pub(crate) enum Command {
    AddCaptured {
        entry: ClipboardEntry,
        reply: Reply,
    },
    Delete {
        id: String,
        reply: Reply,
    },
    Update {
        id: String,
        patch: EntryPatch,
        op: &'static str,
        reply: Reply,
    },
}

/// Results of work the engine spawned. Each is tagged with the epoch it was started
/// under and is discarded if the identity changed since.
pub(crate) enum Completion {
    AddSettled {
        epoch: u64,
        entry: ClipboardEntry,
        result: Result<String, RemoteError>,
        reply: Option<Reply>,
    },
    DeleteLocalSettled {
        epoch: u64,
        id: String,
        result: Result<bool, LocalStoreError>,
        reply: Reply,
    },
    DeleteRemoteSettled {
        epoch: u64,
        id: String,
        result: Result<(), RemoteError>,
    },
    UpdateSettled {
        epoch: u64,
        id: String,
        op: &'static str,
        result: Result<Option<Vec<ClipboardEntry>>, SyncError>,
        reply: Reply,
    },
    LocalRefreshed {
        epoch: u64,
        result: Result<Vec<ClipboardEntry>, LocalStoreError>,
    },
    Migrated {
        epoch: u64,
        result: Result<MigrationReport, MigrationError>,
    },
    SubscriptionFailed {
        epoch: u64,
        owner: String,
        error: RemoteError,
    },
    Remote {
        epoch: u64,
        event: RemoteEvent,
    },
    SubscriptionEnded {
        epoch: u64,
    },
}

pub(crate) enum Inbound {
    External(EngineEvent),
    Command(Command),
    Internal(Completion),
    Shutdown,
}

/// Reconciles the local store and the remote channel into one view.
///
/// Runs as a single task that owns all state; everything reaches it through the
/// inbox, including the results of the I/O it spawns. An identity change bumps
/// `epoch`, so late results from the previous identity are recognised and dropped.
pub struct SyncEngine {
    local: Arc<dyn LocalHistoryStore>,
    remote: Arc<dyn RemoteHistoryChannel>,
    state: ViewState,
    identity: Option<Identity>,
    epoch: u64,
    online: bool,
    /// Set once the first snapshot of this activation has been applied and merged.
    merged: bool,
    subscription: Option<JoinHandle<()>>,
    offline_queue: OfflineQueue,
    /// The local store's list as last reported, to tell new captures from refreshes.
    local_history: Vec<ClipboardEntry>,
    inbox: mpsc::UnboundedSender<Inbound>,
    published: watch::Sender<EngineState>,
    bridges: Vec<JoinHandle<()>>,
}

impl SyncEngine {
    /// Load local history, apply the provider's current identity and spawn the actor.
    pub async fn start(
        local: Arc<dyn LocalHistoryStore>,
        remote: Arc<dyn RemoteHistoryChannel>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<EngineHandle, LocalStoreError> {
        // Subscribe first so no capture falls between the read and the listener
        let local_rx = local.subscribe();
        let mut identity_rx = identity.on_identity_changed();
        let history = local.history().await?;
        let (inbox, rx) = mpsc::unbounded_channel();
        let (published, state_rx) = watch::channel(EngineState::default());

        let mut engine = SyncEngine {
            local,
            remote,
            state: ViewState::default(),
            identity: None,
            epoch: 0,
            online: true,
            merged: false,
            subscription: None,
            offline_queue: OfflineQueue::new(),
            local_history: history.clone(),
            inbox: inbox.clone(),
            published,
            bridges: Vec::new(),
        };

        let initial = identity.current_identity();
        log::info!(
            "Sync engine starting with {} local entries, identity {:?}",
            history.len(),
            initial.as_ref().map(|i| i.id.as_str())
        );
        engine.apply_identity(initial);
        if engine.authenticated_owner().is_none() {
            engine.state.replace_view(history);
        }
        engine.publish();

        let tx = inbox.clone();
        engine.bridges.push(tokio::spawn(async move {
            while identity_rx.changed().await.is_ok() {
                let next = identity_rx.borrow_and_update().clone();
                if tx
                    .send(Inbound::External(EngineEvent::IdentityChanged(next)))
                    .is_err()
                {
                    break;
                }
            }
        }));
        engine.bridges.push(spawn_local_bridge(local_rx, inbox.clone()));

        tokio::spawn(engine.run(rx));
        Ok(EngineHandle::new(inbox, state_rx))
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(message) = inbox.recv().await {
            match message {
                Inbound::External(event) => self.handle_event(event),
                Inbound::Command(command) => self.handle_command(command),
                Inbound::Internal(completion) => self.handle_completion(completion),
                Inbound::Shutdown => break,
            }
            self.publish();
        }

        self.stop_subscription();
        for bridge in self.bridges.drain(..) {
            bridge.abort();
        }
        log::info!("Sync engine stopped");
    }

    fn publish(&self) {
        let next = self.state.snapshot(self.identity.clone());
        self.published.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Owner of the remote collection, if the view is currently remote-backed.
    fn authenticated_owner(&self) -> Option<String> {
        self.identity
            .as_ref()
            .filter(|i| !i.is_anonymous)
            .map(|i| i.id.clone())
    }

    /// Run `work` off the actor and feed its result back through the inbox.
    fn spawn_completion<F>(&self, work: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            let completion = work.await;
            let _ = inbox.send(Inbound::Internal(completion));
        });
    }

    // ── External events ─────────────────────────────────────────────────────

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::LocalHistoryChanged(entries) => self.on_local_history(entries),
            EngineEvent::IdentityChanged(identity) => {
                if identity == self.identity {
                    return;
                }
                self.apply_identity(identity);
                if self.authenticated_owner().is_none() {
                    self.refresh_local();
                }
            }
            EngineEvent::Connectivity { online } => self.on_connectivity(online),
        }
    }

    fn on_local_history(&mut self, entries: Vec<ClipboardEntry>) {
        let known: HashSet<&str> = self.local_history.iter().map(|e| e.id.as_str()).collect();
        let mut fresh: Vec<ClipboardEntry> = entries
            .iter()
            .filter(|e| !known.contains(e.id.as_str()))
            .cloned()
            .collect();
        self.local_history = entries.clone();

        match self.authenticated_owner() {
            Some(owner) if self.merged => {
                // Oldest first so the remote clock keeps capture order
                fresh.reverse();
                for entry in fresh {
                    self.forward_capture(&owner, entry, None);
                }
            }
            Some(_) => {
                if !fresh.is_empty() {
                    log::debug!("{} captures left to the first snapshot merge", fresh.len());
                }
            }
            None => self.state.replace_view(entries),
        }
    }

    fn on_connectivity(&mut self, online: bool) {
        if self.online != online {
            log::info!("Connectivity: {}", if online { "online" } else { "offline" });
        }
        self.online = online;

        let Some(owner) = self.authenticated_owner() else {
            return;
        };
        // Error only clears with a new identity
        if self.state.status() == SyncStatus::Error {
            return;
        }
        if !online {
            self.state.set_status(SyncStatus::Offline);
            return;
        }
        if self.subscription.is_none() {
            self.state.set_status(SyncStatus::Syncing);
            self.start_subscription(owner.clone(), None);
        } else if self.state.status() == SyncStatus::Offline {
            // Synced needs a delivered snapshot
            self.state.set_status(if self.merged {
                SyncStatus::Synced
            } else {
                SyncStatus::Syncing
            });
        }
        self.flush_offline_queue(&owner);
    }

    /// Switch to `identity`. Local-only modes leave loading the view to the caller.
    fn apply_identity(&mut self, identity: Option<Identity>) {
        let previous = self.identity.take();
        self.stop_subscription();
        self.epoch += 1;
        self.merged = false;
        self.identity = identity;

        let owner = self.authenticated_owner();
        self.offline_queue.retain_owner(owner.as_deref());

        match (self.identity.clone(), owner) {
            (None, _) => {
                log::warn!("No active identity, running on local history only");
                self.state.reset(SyncStatus::Error);
                self.state
                    .set_error(SyncError::NoIdentity { op: "subscribe" }.to_string());
            }
            (Some(identity), None) => {
                log::info!("Anonymous identity {}, running on local history", identity.id);
                self.state.reset(SyncStatus::Synced);
            }
            (Some(_), Some(owner)) => {
                let migrate_from = previous
                    .filter(|p| p.is_anonymous && p.id != owner)
                    .map(|p| p.id);
                log::info!(
                    "Authenticated as {}{}",
                    owner,
                    migrate_from
                        .as_ref()
                        .map(|from| format!(", migrating from {}", from))
                        .unwrap_or_default()
                );
                self.state.reset(if self.online {
                    SyncStatus::Syncing
                } else {
                    SyncStatus::Offline
                });
                self.start_subscription(owner.clone(), migrate_from);
                if self.online {
                    self.flush_offline_queue(&owner);
                }
            }
        }
    }

    // ── Commands ────────────────────────────────────────────────────────────

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddCaptured { entry, reply } => self.add_captured(entry, reply),
            Command::Delete { id, reply } => self.delete(id, reply),
            Command::Update {
                id,
                patch,
                op,
                reply,
            } => self.update(id, patch, op, reply),
        }
    }

    fn add_captured(&mut self, entry: ClipboardEntry, reply: Reply) {
        match self.authenticated_owner() {
            Some(owner) => self.forward_capture(&owner, entry, Some(reply)),
            None => {
                self.state.push_captured(entry);
                let _ = reply.send(Ok(MutationOutcome::Applied));
            }
        }
    }

    /// Mirror a capture into the remote store; the view picks it up from the next snapshot.
    fn forward_capture(&mut self, owner: &str, entry: ClipboardEntry, reply: Option<Reply>) {
        if self.state.status() == SyncStatus::Offline {
            log::debug!("Offline, queueing capture {}", entry.id);
            self.offline_queue.enqueue(owner, entry);
            if let Some(reply) = reply {
                let _ = reply.send(Ok(MutationOutcome::Queued));
            }
            return;
        }

        let remote = self.remote.clone();
        let owner = owner.to_string();
        let epoch = self.epoch;
        self.spawn_completion(async move {
            let result = remote.add(&owner, &NewEntry::from(&entry)).await;
            Completion::AddSettled {
                epoch,
                entry,
                result,
                reply,
            }
        });
    }

    fn flush_offline_queue(&mut self, owner: &str) {
        let queued = self.offline_queue.drain_for(owner);
        if queued.is_empty() {
            return;
        }
        log::info!("Flushing {} queued captures", queued.len());
        for entry in queued {
            self.forward_capture(owner, entry, None);
        }
    }

    fn delete(&mut self, id: String, reply: Reply) {
        match self.state.begin_delete(&id) {
            DeleteStart::AlreadyPending => {
                log::debug!("Delete {} already in flight", id);
                let _ = reply.send(Ok(MutationOutcome::Skipped));
            }
            DeleteStart::NotFound => {
                let _ = reply.send(Err(SyncError::NotFound { op: "delete", id }));
            }
            DeleteStart::Started => {
                let local = self.local.clone();
                let epoch = self.epoch;
                self.spawn_completion(async move {
                    let result = local.delete(&id).await;
                    Completion::DeleteLocalSettled {
                        epoch,
                        id,
                        result,
                        reply,
                    }
                });
            }
        }
    }

    fn update(&mut self, id: String, patch: EntryPatch, op: &'static str, reply: Reply) {
        if patch.is_empty() {
            let _ = reply.send(Err(SyncError::InvalidPatch { id }));
            return;
        }
        match self.state.begin_update(&id) {
            UpdateStart::AlreadyPending => {
                let _ = reply.send(Ok(MutationOutcome::Skipped));
                return;
            }
            UpdateStart::NotFound => {
                let _ = reply.send(Err(SyncError::NotFound { op, id }));
                return;
            }
            UpdateStart::Started => {}
        }

        let epoch = self.epoch;
        match self.authenticated_owner() {
            Some(owner) => {
                let remote = self.remote.clone();
                self.spawn_completion(async move {
                    let result = remote
                        .update(&owner, &id, &patch)
                        .await
                        .map(|()| None)
                        .map_err(|source| SyncError::Remote {
                            op,
                            id: id.clone(),
                            source,
                        });
                    Completion::UpdateSettled {
                        epoch,
                        id,
                        op,
                        result,
                        reply,
                    }
                });
            }
            None => {
                let local = self.local.clone();
                self.spawn_completion(async move {
                    let result = update_local(local.as_ref(), &id, &patch, op).await;
                    Completion::UpdateSettled {
                        epoch,
                        id,
                        op,
                        result,
                        reply,
                    }
                });
            }
        }
    }

    fn refresh_local(&self) {
        let local = self.local.clone();
        let epoch = self.epoch;
        self.spawn_completion(async move {
            Completion::LocalRefreshed {
                epoch,
                result: local.history().await,
            }
        });
    }

    // ── Subscription ────────────────────────────────────────────────────────

    fn start_subscription(&mut self, owner: String, migrate_from: Option<String>) {
        let remote = self.remote.clone();
        let inbox = self.inbox.clone();
        let epoch = self.epoch;
        let send = move |completion: Completion| inbox.send(Inbound::Internal(completion)).is_ok();

        self.subscription = Some(tokio::spawn(async move {
            if let Some(from) = migrate_from {
                let result = remote.migrate_all(&from, &owner).await;
                if !send(Completion::Migrated { epoch, result }) {
                    return;
                }
            }

            let mut subscription = match remote.subscribe(&owner).await {
                Ok(subscription) => subscription,
                Err(error) => {
                    send(Completion::SubscriptionFailed {
                        epoch,
                        owner,
                        error,
                    });
                    return;
                }
            };
            while let Some(event) = subscription.next_event().await {
                if !send(Completion::Remote { epoch, event }) {
                    return;
                }
            }
            send(Completion::SubscriptionEnded { epoch });
        }));
    }

    /// Aborting the task drops its `Subscription`, which unsubscribes.
    fn stop_subscription(&mut self) {
        if let Some(task) = self.subscription.take() {
            task.abort();
        }
    }

    // ── Completions ─────────────────────────────────────────────────────────

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::AddSettled {
                epoch,
                entry,
                result,
                reply,
            } => self.on_add_settled(epoch, entry, result, reply),
            Completion::DeleteLocalSettled {
                epoch,
                id,
                result,
                reply,
            } => self.on_local_delete_settled(epoch, id, result, reply),
            Completion::DeleteRemoteSettled { epoch, id, result } => {
                if epoch != self.epoch {
                    return;
                }
                self.state.finish_delete(&id);
                match result {
                    Ok(()) => log::debug!("Remote delete {} confirmed", id),
                    Err(e) => log::warn!("Remote delete {} failed, keeping local result: {}", id, e),
                }
            }
            Completion::UpdateSettled {
                epoch,
                id,
                op,
                result,
                reply,
            } => {
                if epoch != self.epoch {
                    let _ = reply.send(Err(SyncError::IdentityChanged { op, id }));
                    return;
                }
                self.state.finish_update(&id);
                match result {
                    Ok(refreshed) => {
                        if let Some(entries) = refreshed {
                            self.local_history = entries.clone();
                            self.state.replace_view(entries);
                        }
                        let _ = reply.send(Ok(MutationOutcome::Applied));
                    }
                    Err(e) => {
                        log::error!("{}", e);
                        self.state.set_error(e.to_string());
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Completion::LocalRefreshed { epoch, result } => {
                if epoch != self.epoch || self.authenticated_owner().is_some() {
                    return;
                }
                match result {
                    Ok(entries) => {
                        self.local_history = entries.clone();
                        self.state.replace_view(entries);
                    }
                    Err(e) => {
                        log::error!("Failed to read local history: {}", e);
                        self.state.set_error(e.to_string());
                    }
                }
            }
            Completion::Migrated { epoch, result } => {
                if epoch != self.epoch {
                    return;
                }
                match result {
                    Ok(report) => log::info!(
                        "Migration finished: {} entries, source cleared: {}",
                        report.copied,
                        report.source_cleared
                    ),
                    Err(e) => {
                        let error = SyncError::from(e);
                        log::error!("{}", error);
                        self.state.set_error(error.to_string());
                    }
                }
            }
            Completion::SubscriptionFailed {
                epoch,
                owner,
                error,
            } => {
                if epoch != self.epoch {
                    return;
                }
                self.subscription = None;
                if error.is_transient() {
                    log::warn!("Subscription for {} unavailable: {}", owner, error);
                    self.state.set_status(SyncStatus::Offline);
                } else {
                    let error = SyncError::Remote {
                        op: "subscribe",
                        id: owner,
                        source: error,
                    };
                    log::error!("{}", error);
                    self.state.set_status(SyncStatus::Error);
                    self.state.set_error(error.to_string());
                }
            }
            Completion::Remote { epoch, event } => {
                if epoch == self.epoch {
                    self.on_remote_event(event);
                }
            }
            Completion::SubscriptionEnded { epoch } => {
                if epoch != self.epoch {
                    return;
                }
                log::warn!("Remote subscription ended");
                self.subscription = None;
                self.state.set_status(SyncStatus::Offline);
            }
        }
    }

    fn on_add_settled(
        &mut self,
        epoch: u64,
        entry: ClipboardEntry,
        result: Result<String, RemoteError>,
        reply: Option<Reply>,
    ) {
        let outcome = if epoch != self.epoch {
            Err(SyncError::IdentityChanged {
                op: "add",
                id: entry.id,
            })
        } else {
            match result {
                Ok(remote_id) => {
                    log::debug!("Capture {} mirrored as {}", entry.id, remote_id);
                    Ok(MutationOutcome::Applied)
                }
                Err(e) if e.is_transient() => {
                    log::warn!("Add {} failed, queueing: {}", entry.id, e);
                    if let Some(owner) = self.authenticated_owner() {
                        self.offline_queue.enqueue(&owner, entry);
                    }
                    Ok(MutationOutcome::Queued)
                }
                Err(source) => {
                    let error = SyncError::Remote {
                        op: "add",
                        id: entry.id,
                        source,
                    };
                    log::error!("{}", error);
                    self.state.set_error(error.to_string());
                    Err(error)
                }
            }
        };
        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    fn on_local_delete_settled(
        &mut self,
        epoch: u64,
        id: String,
        result: Result<bool, LocalStoreError>,
        reply: Reply,
    ) {
        if epoch != self.epoch {
            let _ = reply.send(Err(SyncError::IdentityChanged { op: "delete", id }));
            return;
        }

        match result {
            Ok(existed) => {
                log::debug!("Local delete {} done (existed: {})", id, existed);
                self.local_history.retain(|e| e.id != id);
                let remote_owner = self
                    .authenticated_owner()
                    .filter(|_| self.state.status() != SyncStatus::Offline);
                match remote_owner {
                    Some(owner) => {
                        let remote = self.remote.clone();
                        self.spawn_completion(async move {
                            let result = remote.delete(&id, &owner).await;
                            Completion::DeleteRemoteSettled { epoch, id, result }
                        });
                    }
                    None => {
                        self.state.finish_delete(&id);
                    }
                }
                let _ = reply.send(Ok(MutationOutcome::Applied));
            }
            Err(source) => {
                if let Some(entry) = self.state.finish_delete(&id) {
                    self.state.restore(entry);
                }
                if self.authenticated_owner().is_none() {
                    self.refresh_local();
                }
                let error = SyncError::Local {
                    op: "delete",
                    id,
                    source,
                };
                log::error!("{}", error);
                self.state.set_error(error.to_string());
                let _ = reply.send(Err(error));
            }
        }
    }

    fn on_remote_event(&mut self, event: RemoteEvent) {
        let Some(owner) = self.authenticated_owner() else {
            return;
        };
        match event {
            RemoteEvent::Snapshot(entries) => {
                log::debug!("Snapshot for {}: {} entries", owner, entries.len());
                let was_synced = self.state.status() == SyncStatus::Synced;
                if self.online {
                    self.state.set_status(SyncStatus::Synced);
                }
                if !self.merged {
                    self.merged = true;
                    self.merge_local(&owner, &entries);
                }
                self.state.replace_view(entries);
                if self.online && !was_synced {
                    self.flush_offline_queue(&owner);
                }
            }
            RemoteEvent::Disconnected(reason) => {
                log::warn!("Remote subscription for {} disconnected: {}", owner, reason);
                self.state.set_status(SyncStatus::Offline);
            }
        }
    }

    /// Mirror local entries the first snapshot lacks. Captures reported after this
    /// point are forwarded one by one, so each local entry is pushed at most once.
    /// Pushed entries come back through the subscription.
    fn merge_local(&mut self, owner: &str, snapshot: &[ClipboardEntry]) {
        let unique: Vec<ClipboardEntry> = unique_local(&self.local_history, snapshot)
            .into_iter()
            .filter(|e| !self.offline_queue.contains(owner, &e.content))
            .cloned()
            .collect();
        log::info!(
            "History merge for {}: {} local, {} remote, pushing {}",
            owner,
            self.local_history.len(),
            snapshot.len(),
            unique.len()
        );
        for entry in unique {
            self.forward_capture(owner, entry, None);
        }
    }
}

async fn update_local(
    local: &dyn LocalHistoryStore,
    id: &str,
    patch: &EntryPatch,
    op: &'static str,
) -> Result<Option<Vec<ClipboardEntry>>, SyncError> {
    let local_error = |source: LocalStoreError| SyncError::Local {
        op,
        id: id.to_string(),
        source,
    };
    if !local.update(id, patch).await.map_err(local_error)? {
        return Err(SyncError::NotFound {
            op,
            id: id.to_string(),
        });
    }
    let refreshed = local.history().await.map_err(local_error)?;
    Ok(Some(refreshed))
}

fn spawn_local_bridge(
    mut changes: broadcast::Receiver<Vec<ClipboardEntry>>,
    inbox: mpsc::UnboundedSender<Inbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(entries) => {
                    let event = EngineEvent::LocalHistoryChanged(entries);
                    if inbox.send(Inbound::External(event)).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Local history listener lagged by {} updates", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
