//! Webhook catcher queue store.
//!
//! Implements [`dispatch::QueueStore`] on top of the `memcache` client. Any
//! service speaking the memcache text protocol works; in production this is a
//! Siberite queue, where each key names a queue and `set` enqueues the value.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Address handling, connection management, and the
//! blocking client all live here. The [`dispatch`] crate sees only
//! [`dispatch::QueueStore`].
//!
//! ## Connection lifecycle
//!
//! The client connects lazily on the first write, so the listener starts even
//! while the queue is down. A failed connection attempt is reported to the
//! request that triggered it and retried by the next one. Once connected, the
//! client is shared by every request and hands each write its own pooled
//! connection, up to [`MAX_CONNECTIONS`] at a time.
//!
//! The `memcache` crate defaults to the binary protocol. Siberite only speaks
//! the text protocol, so every URL carries `protocol=ascii` unless the
//! configured address already names a protocol.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dispatch::{QueueError, QueueStore, RoutingKey};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const SCHEME: &str = "memcache://";

/// Entries never expire; the consumer removes them.
const NO_EXPIRY: u32 = 0;

/// Upper bound on concurrent queue connections.
pub const MAX_CONNECTIONS: u32 = 16;

/// How long to wait for a pooled connection before failing the write.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The configured queue address cannot be turned into a memcache URL.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid queue address '{0}': expected 'host:port' or 'memcache://host:port'")]
pub struct QueueAddrError(String);

/// Normalises `host:port` or `memcache://host:port` into a text-protocol
/// memcache URL.
pub fn memcache_url(addr: &str) -> Result<String, QueueAddrError> {
    let trimmed = addr.trim();
    let url = if let Some(rest) = trimmed.strip_prefix(SCHEME) {
        if rest.is_empty() || rest.starts_with('?') {
            return Err(QueueAddrError(addr.to_string()));
        }
        trimmed.to_string()
    } else if trimmed.contains(':') && !trimmed.contains("://") {
        format!("{SCHEME}{trimmed}")
    } else {
        return Err(QueueAddrError(addr.to_string()));
    };

    Ok(with_text_protocol(&url))
}

fn with_text_protocol(url: &str) -> String {
    let separator = match url.split_once('?') {
        None => "?",
        Some((_, "")) => "",
        Some((_, query)) if query.split('&').any(|pair| pair.starts_with("protocol=")) => {
            return url.to_string();
        }
        Some(_) => "&",
    };
    format!("{url}{separator}protocol=ascii")
}

/// Queue store backed by a lazily connected memcache client.
pub struct MemcacheStore {
    addr: String,
    url: String,
    client: OnceCell<Arc<memcache::Client>>,
}

impl MemcacheStore {
    /// Validates the address; no connection is made yet.
    pub fn new(addr: impl Into<String>) -> Result<Self, QueueAddrError> {
        let addr = addr.into();
        let url = memcache_url(&addr)?;
        Ok(Self {
            addr,
            url,
            client: OnceCell::new(),
        })
    }

    /// The address as configured.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn client(&self) -> Result<Arc<memcache::Client>, QueueError> {
        self.client
            .get_or_try_init(|| async {
                let url = self.url.clone();
                debug!(url = %url, "connecting to queue");

                // The memcache client is blocking, so keep it off the runtime threads.
                let client = tokio::task::spawn_blocking(move || {
                    memcache::Client::builder()
                        .add_server(url.as_str())?
                        .with_max_pool_size(MAX_CONNECTIONS)
                        .with_min_idle_conns(1)
                        .with_connection_timeout(CONNECT_TIMEOUT)
                        .build()
                })
                .await
                .map_err(|e| self.unavailable(format!("connect task failed: {e}")))?
                .map_err(|e| self.unavailable(e.to_string()))?;

                info!(addr = %self.addr, "connected to queue");
                Ok::<_, QueueError>(Arc::new(client))
            })
            .await
            .cloned()
    }

    fn unavailable(&self, message: String) -> QueueError {
        QueueError::Unavailable {
            addr: self.addr.clone(),
            message,
        }
    }
}

impl std::fmt::Debug for MemcacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcacheStore")
            .field("addr", &self.addr)
            .field("connected", &self.client.initialized())
            .finish()
    }
}

#[async_trait]
impl QueueStore for MemcacheStore {
    async fn set(&self, key: &RoutingKey, value: Bytes) -> Result<(), QueueError> {
        let client = self.client().await?;
        let key = key.to_string();

        tokio::task::spawn_blocking(move || client.set(&key, &value[..], NO_EXPIRY))
            .await
            .map_err(|e| QueueError::Rejected(format!("queue task failed: {e}")))?
            .map_err(|e| QueueError::Rejected(e.to_string()))
    }
}
