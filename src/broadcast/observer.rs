use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::registry::{ObserverHandle, ObserverId, ObserverRegistry};
use crate::core::ObserverMessage;

/// Client connection that observer messages are written to
#[async_trait]
pub trait ObserverSink: Send + 'static {
    async fn send(&mut self, message: &ObserverMessage) -> Result<()>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Supervisor task draining one observer's queue into its sink
pub struct ObserverTask {
    id: ObserverId,
    registry: Arc<ObserverRegistry>,
    handle: JoinHandle<()>,
}

impl ObserverTask {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Client went away: stop receiving and let the supervisor finish
    pub fn disconnect(&self) {
        self.registry.unregister(self.id);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait until the supervisor has closed its sink
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Register `sink` as an observer and spawn the task that feeds it
///
/// A send that fails or exceeds `send_timeout` unregisters the observer; other
/// observers are unaffected.
pub fn spawn_observer<S: ObserverSink>(
    registry: Arc<ObserverRegistry>,
    mut sink: S,
    queue_capacity: usize,
    send_timeout: Duration,
) -> ObserverTask {
    let (handle, mut rx) = ObserverHandle::channel(queue_capacity);
    let id = handle.id();
    registry.register(handle);

    let task_registry = Arc::clone(&registry);
    let handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match timeout(send_timeout, sink.send(&message)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(observer = %id, error = %e, "observer send failed");
                    break;
                }
                Err(_) => {
                    warn!(observer = %id, "observer send timed out");
                    break;
                }
            }
        }

        task_registry.unregister(id);
        if let Err(e) = sink.close().await {
            debug!(observer = %id, error = %e, "observer close failed");
        }
    });

    ObserverTask {
        id,
        registry,
        handle,
    }
}

/// Writes each message as one JSON line
pub struct JsonLineSink<W> {
    writer: W,
}

impl<W> JsonLineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> ObserverSink for JsonLineSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, message: &ObserverMessage) -> Result<()> {
        let mut line = serde_json::to_vec(message).context("Failed to serialize observer message")?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}
