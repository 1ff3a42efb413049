use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::connect_async;

use super::error::RemoteError;
use super::types::WsMessage;

/// Receive side of the history WebSocket. Dropping it closes the connection.
pub struct WsClient {
    incoming: mpsc::Receiver<WsMessage>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl WsClient {
    pub async fn connect(ws_url: &str) -> Result<Self, RemoteError> {
        let url = url::Url::parse(ws_url)
            .map_err(|e| RemoteError::Parse(format!("invalid WS URL: {}", e)))?;

        let (ws_stream, _) = connect_async(url.as_str()).await.map_err(connect_error)?;
        let (mut ws_sink, mut ws_stream_rx) = ws_stream.split();

        let (incoming_tx, incoming) = mpsc::channel::<WsMessage>(64);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = ws_stream_rx.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<WsMessage>(&text) {
                                Ok(msg) => {
                                    if incoming_tx.send(msg).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => log::warn!("Ignoring WebSocket message: {}", e),
                            }
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            if ws_sink.send(Message::Pong(payload)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            log::warn!("WebSocket error: {}", e);
                            break;
                        }
                    },
                    _ = &mut shutdown_rx => {
                        let _ = ws_sink.close().await;
                        break;
                    }
                }
            }
            log::debug!("WebSocket receive loop ended");
        });

        log::info!("WebSocket connected");
        Ok(Self {
            incoming,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// `None` once the connection is gone.
    pub async fn next_message(&mut self) -> Option<WsMessage> {
        self.incoming.recv().await
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn connect_error(e: WsError) -> RemoteError {
    match e {
        WsError::Http(resp) => {
            let code = resp.status().as_u16();
            if code == 401 || code == 403 {
                RemoteError::Unauthorized("WebSocket handshake rejected".to_string())
            } else {
                RemoteError::Status {
                    code,
                    message: "WebSocket handshake failed".to_string(),
                }
            }
        }
        other => RemoteError::Network(format!("WebSocket connect failed: {}", other)),
    }
}
