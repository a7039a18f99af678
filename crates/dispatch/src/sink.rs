//! Sink port traits, the dispatcher, and the queue sink.
//!
//! A deployment runs with exactly one [`NotificationSink`], chosen when the
//! [`Dispatcher`] is built. The command sink lives in the `command` crate; the
//! [`QueueSink`] lives here because its only domain rule (routing key
//! extraction) is pure, while the store it writes through is a port
//! ([`QueueStore`]) implemented by the `queue` crate.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

use crate::{DispatchError, Notification, QueueError, RoutingKey};

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

/// Terminal consumer of a notification.
///
/// Implementations must be safe to call concurrently; each call handles one
/// request and owns its notification.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Short label for log lines (the command path or queue address).
    fn describe(&self) -> String;

    /// Delivers the notification once. No retries.
    async fn deliver(&self, notification: Notification) -> Result<(), DispatchError>;
}

/// Key/value store backing the queue sink.
///
/// `set` overwrites any existing value under the same key.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn set(&self, key: &RoutingKey, value: Bytes) -> Result<(), QueueError>;
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Hands each notification to the sink selected at construction time.
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Label of the configured sink.
    pub fn describe(&self) -> String {
        self.sink.describe()
    }

    /// Delivers one notification and logs a failure.
    ///
    /// The error is also returned to callers that await the delivery.
    pub async fn dispatch(&self, notification: Notification) -> Result<(), DispatchError> {
        let result = self.sink.deliver(notification).await;
        if let Err(e) = &result {
            error!(sink = %self.sink.describe(), error = %e, "dispatch failed; dropping notification");
        }
        result
    }

    /// Runs [`Self::dispatch`] on a detached task inside the current span.
    ///
    /// Used after the `200` response has been produced: the caller never
    /// learns whether the sink succeeded.
    pub fn spawn(&self, notification: Notification) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(
            async move {
                let _ = dispatcher.dispatch(notification).await;
            }
            .in_current_span(),
        )
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sink", &self.sink.describe())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Queue sink
// ---------------------------------------------------------------------------

/// Reads the routing key (`repository.name`) out of a JSON payload.
pub fn routing_key(payload: &[u8]) -> Result<RoutingKey, DispatchError> {
    let document: serde_json::Value = serde_json::from_slice(payload)?;
    let name = document
        .get("repository")
        .and_then(|repository| repository.get("name"))
        .and_then(serde_json::Value::as_str)
        .ok_or(DispatchError::MissingRoutingKey)?;

    RoutingKey::parse(name)
}

/// Stores every notification under its repository name.
///
/// The stored value is the original payload, not a re-serialisation of the
/// parsed document.
pub struct QueueSink<S> {
    store: S,
    label: String,
}

impl<S: QueueStore> QueueSink<S> {
    /// `label` identifies the queue in log lines, usually its address.
    pub fn new(store: S, label: impl Into<String>) -> Self {
        Self {
            store,
            label: label.into(),
        }
    }
}

#[async_trait]
impl<S: QueueStore> NotificationSink for QueueSink<S> {
    fn describe(&self) -> String {
        format!("queue {}", self.label)
    }

    async fn deliver(&self, notification: Notification) -> Result<(), DispatchError> {
        let key = routing_key(&notification.payload)?;

        self.store
            .set(&key, notification.payload)
            .await
            .map_err(|source| DispatchError::QueueWrite {
                key: key.to_string(),
                source,
            })?;

        info!(key = %key, "stored push event in queue");
        Ok(())
    }
}
