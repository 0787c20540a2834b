//! Push transport seam.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::Result;

/// An event as it came off the wire, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Event name.
    pub event: String,
    /// Channel the event was published on.
    pub channel: Option<String>,
    /// Payload; an object or a JSON-encoded string.
    pub payload: Value,
}

impl RawEvent {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            channel: None,
            payload,
        }
    }
}

/// Opens subscriptions on a push channel.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Subscribe to `channel`, authorizing with `credential`.
    ///
    /// Resolves once the server confirmed the subscription. A rejected
    /// authorization is reported as an auth error.
    async fn subscribe(&self, channel: &str, credential: &str) -> Result<PushSubscription>;
}

/// A live channel subscription.
///
/// The event stream ends when the transport goes away. Dropping the
/// subscription releases the channel.
pub struct PushSubscription {
    channel: String,
    events: mpsc::Receiver<RawEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PushSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSubscription")
            .field("channel", &self.channel)
            .finish()
    }
}

impl PushSubscription {
    /// Wrap an event receiver.
    pub fn new(channel: impl Into<String>, events: mpsc::Receiver<RawEvent>) -> Self {
        Self {
            channel: channel.into(),
            events,
            shutdown: None,
            task: None,
        }
    }

    /// Attach the task driving the connection and its shutdown signal.
    pub fn with_driver(mut self, shutdown: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        self.shutdown = Some(shutdown);
        self.task = Some(task);
        self
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next event, or `None` once the transport is gone.
    pub async fn next_event(&mut self) -> Option<RawEvent> {
        self.events.recv().await
    }

    /// Leave the channel and wait for the driver to finish.
    pub async fn close(mut self) {
        self.events.close();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        // The driver closes the socket on its own once signalled.
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
