//! Error types for the webhook catcher domain.
//!
//! The taxonomy mirrors where a request can stop:
//!
//! | Error | Raised by | HTTP effect |
//! |-------|-----------|-------------|
//! | [`ConfigError`] | startup validation | none; the process exits |
//! | [`AuthError`] | [`crate::Authenticator`] | `401` |
//! | [`BodyReadError`] | payload reader in `listener` | `400` |
//! | [`DispatchError`] | sinks | none; the `200` has already been sent |
//! | [`QueueError`] | [`crate::QueueStore`] implementations | wrapped in [`DispatchError::QueueWrite`] |

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Startup
// ---------------------------------------------------------------------------

/// The runtime configuration is invalid. Produced at startup only; the
/// listener never starts with an invalid config.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Neither a command nor a queue address was configured.
    #[error("either a command or a queue address is required")]
    NoSink,

    /// Both a command and a queue address were configured.
    #[error("a command and a queue address are mutually exclusive")]
    ConflictingSinks,

    /// The source host is empty.
    #[error("the source host must not be empty")]
    EmptySourceHost,

    /// The body size limit is zero.
    #[error("the maximum body size must be greater than zero")]
    ZeroBodyLimit,
}

// ---------------------------------------------------------------------------
// Per-request, before the response
// ---------------------------------------------------------------------------

/// The caller failed authentication.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The connection did not come from the configured source.
    #[error("got request from '{peer}' but expected '{expected}'")]
    SourceMismatch {
        /// Textual peer address of the connection.
        peer: String,
        /// Configured source host.
        expected: String,
    },

    /// A token is configured and the query string did not match it.
    #[error("request did not provide the expected access token")]
    TokenMismatch,
}

/// The request body could not be read in full.
#[derive(Debug, Error)]
pub enum BodyReadError {
    /// The transport failed while the body was being received.
    #[error("problem reading body of http request: {0}")]
    Transport(String),

    /// The body exceeded the configured size limit.
    #[error("request body exceeds the {limit} byte limit")]
    TooLarge {
        /// Configured maximum in bytes.
        limit: usize,
    },
}

// ---------------------------------------------------------------------------
// Per-request, after the response
// ---------------------------------------------------------------------------

/// A queue store operation failed.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No connection to the queue service could be established.
    #[error("could not connect to the queue at '{addr}': {message}")]
    Unavailable {
        /// Configured queue address.
        addr: String,
        /// Underlying client error.
        message: String,
    },

    /// The queue service refused or failed the write.
    #[error("queue rejected the write: {0}")]
    Rejected(String),
}

/// A sink failed to deliver a notification.
///
/// Every variant is terminal for the request that produced it and is only
/// logged; none of them reach the HTTP caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The spawned command exposed no stdin handle.
    #[error("problem creating stdin pipe to the command '{}'", command.display())]
    StdinUnavailable {
        /// Configured command path.
        command: PathBuf,
    },

    /// The command could not be started.
    #[error("problem running the command '{}': {source}", command.display())]
    Spawn {
        /// Configured command path.
        command: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The payload could not be written to the command's stdin in full.
    #[error("problem writing to the stdin pipe of the command '{}': {source}", command.display())]
    StdinWrite {
        /// Configured command path.
        command: PathBuf,
        /// Underlying pipe error.
        #[source]
        source: std::io::Error,
    },

    /// The payload is not a JSON document.
    #[error("could not parse the webhook payload as JSON: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// The payload has no string at `repository.name`.
    #[error("webhook payload has no 'repository.name' string")]
    MissingRoutingKey,

    /// The repository name cannot be used as a queue key.
    #[error("repository name '{key}' is not a valid queue key: {reason}")]
    InvalidRoutingKey {
        /// The rejected key.
        key: String,
        /// Which rule it broke.
        reason: &'static str,
    },

    /// The queue store failed the write.
    #[error("could not set key '{key}' in the queue: {source}")]
    QueueWrite {
        /// Key that was being written.
        key: String,
        /// Underlying store error.
        #[source]
        source: QueueError,
    },
}
