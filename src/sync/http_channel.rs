use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::api_client::ApiClient;
use super::error::RemoteError;
use super::remote::{RemoteEvent, RemoteHistoryChannel, Subscription};
use super::types::{decode_records, WsMessage};
use super::ws_client::WsClient;
use crate::clipboard::item::{ClipboardEntry, EntryPatch, NewEntry};

const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Remote history over the sync server's REST API, with pushes over a WebSocket.
pub struct HttpHistoryChannel {
    api: ApiClient,
    reconnect_delay: Duration,
}

impl HttpHistoryChannel {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

#[async_trait]
impl RemoteHistoryChannel for HttpHistoryChannel {
    async fn add(&self, owner_id: &str, entry: &NewEntry) -> Result<String, RemoteError> {
        self.api.add_item(owner_id, entry).await
    }

    async fn update(
        &self,
        owner_id: &str,
        id: &str,
        patch: &EntryPatch,
    ) -> Result<(), RemoteError> {
        self.api.update_item(owner_id, id, patch).await
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<(), RemoteError> {
        self.api.delete_item(owner_id, id).await
    }

    /// The first connection must succeed. After that the stream reconnects by itself,
    /// reporting each drop as `Disconnected`, and ends only if the server rejects it.
    async fn subscribe(&self, owner_id: &str) -> Result<Subscription, RemoteError> {
        let ws = WsClient::connect(&self.api.ws_url(owner_id)?).await?;

        let (events_tx, events_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(pump(
            self.api.clone(),
            owner_id.to_string(),
            ws,
            events_tx,
            shutdown_rx,
            self.reconnect_delay,
        ));
        Ok(Subscription::new(events_rx, shutdown_tx))
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<ClipboardEntry>, RemoteError> {
        self.api.list_items(owner_id).await
    }

    async fn copy_batch(
        &self,
        owner_id: &str,
        entries: &[ClipboardEntry],
    ) -> Result<(), RemoteError> {
        self.api.batch_set(owner_id, entries).await
    }

    async fn delete_batch(&self, owner_id: &str, ids: &[String]) -> Result<(), RemoteError> {
        self.api.batch_delete(owner_id, ids).await
    }
}

async fn pump(
    api: ApiClient,
    owner_id: String,
    first: WsClient,
    events: mpsc::Sender<RemoteEvent>,
    mut shutdown: oneshot::Receiver<()>,
    reconnect_delay: Duration,
) {
    let mut connection = Some(first);
    loop {
        if let Some(mut ws) = connection.take() {
            loop {
                tokio::select! {
                    msg = ws.next_message() => match msg {
                        Some(WsMessage::Snapshot { items }) => {
                            let snapshot = RemoteEvent::Snapshot(decode_records(items));
                            if events.send(snapshot).await.is_err() {
                                return;
                            }
                        }
                        Some(WsMessage::Error { message }) => {
                            log::warn!("Sync server error for {}: {}", owner_id, message);
                        }
                        None => break,
                    },
                    _ = &mut shutdown => return,
                }
            }
            let dropped = RemoteEvent::Disconnected("connection closed".to_string());
            if events.send(dropped).await.is_err() {
                return;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = &mut shutdown => return,
        }

        // The token may have changed since the last connect
        let url = match api.ws_url(&owner_id) {
            Ok(url) => url,
            Err(e) => {
                log::error!("Giving up subscription for {}: {}", owner_id, e);
                return;
            }
        };
        match WsClient::connect(&url).await {
            Ok(ws) => {
                log::info!("Subscription for {} reconnected", owner_id);
                connection = Some(ws);
            }
            Err(e) if e.is_transient() => {
                log::debug!("Reconnect for {} failed: {}", owner_id, e);
            }
            Err(e) => {
                log::error!("Giving up subscription for {}: {}", owner_id, e);
                return;
            }
        }
    }
}
