//! The session's bidirectional message channel: one writer, one demultiplexing reader fanning
//! messages out to per-execution buffers by `parent_header.id`.
//!
//! Grounded on the same fan-out shape as [`crate::core::logs::stream::LogStream::split`]: a
//! single background task drains the underlying stream and forwards each item to the channel
//! whose key it matches, rather than requiring every consumer to poll the raw stream itself.

use std::{collections::HashMap, sync::Arc};

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::{error::ExecutionError, protocol::GatewayMessage};

type Registry = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<GatewayMessage>>>>;

/// A connected kernel channel. Writes are serialized through a single background task (the
/// single-writer discipline the concurrency model requires); reads are demultiplexed by
/// `parent_header.id` into per-execution receivers registered via [`Channel::register`].
pub(crate) struct Channel {
    outgoing: mpsc::UnboundedSender<Message>,
    registry: Registry,
    reader_task: tokio::task::JoinHandle<()>,
    writer_task: tokio::task::JoinHandle<()>,
}

impl Channel {
    pub(crate) async fn connect(channel_url: Url) -> Result<Self, ExecutionError> {
        let (ws_stream, _) = connect_async(channel_url.as_str()).await?;
        let (mut sink, mut stream) = ws_stream.split();

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
        let writer_task = tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    log::debug!("C2 channel: writer half closed, stopping");
                    break;
                }
            }
        });

        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let reader_registry = registry.clone();
        let reader_task = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => {
                        log::debug!("C2 channel: gateway closed the connection");
                        break;
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        log::warn!("C2 channel: transport error reading frame: {err}");
                        break;
                    }
                };

                let parsed: GatewayMessage = match serde_json::from_str(&text) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        log::warn!("C2 channel: malformed message ignored: {err}");
                        continue;
                    }
                };

                let Some(execution_id) = parsed.parent_id().map(str::to_string) else {
                    continue;
                };

                let registry = reader_registry.lock().await;
                if let Some(tx) = registry.get(&execution_id) {
                    let _ = tx.send(parsed);
                } else {
                    log::debug!(
                        "C2 channel: message for unknown or already-closed execution '{execution_id}' dropped"
                    );
                }
            }
        });

        Ok(Self {
            outgoing: outgoing_tx,
            registry,
            reader_task,
            writer_task,
        })
    }

    /// Registers a fresh execution id, returning the receiver its messages will be routed to.
    pub(crate) async fn register(
        &self,
        execution_id: impl Into<String>,
    ) -> mpsc::UnboundedReceiver<GatewayMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.lock().await.insert(execution_id.into(), tx);
        rx
    }

    /// Removes an execution's registration once it has reached a terminal state.
    pub(crate) async fn unregister(&self, execution_id: &str) {
        self.registry.lock().await.remove(execution_id);
    }

    pub(crate) fn send(&self, message: &GatewayMessage) -> Result<(), ExecutionError> {
        let text = serde_json::to_string(message)?;
        self.outgoing
            .send(Message::Text(text))
            .map_err(|_| ExecutionError::ConnectionLost)
    }

    /// True if the underlying transport tasks are still running.
    pub(crate) fn is_alive(&self) -> bool {
        !self.reader_task.is_finished() && !self.writer_task.is_finished()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
    }
}
