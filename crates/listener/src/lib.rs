//! Webhook catcher HTTP listener.
//!
//! Owns everything between the socket and the [`dispatch::Dispatcher`]:
//!
//! - [`server`]: binds the port, accepts connections, optionally terminates
//!   TLS, and runs one task per connection until the shutdown future resolves.
//! - [`handler`]: the single route: authenticates the caller, buffers the
//!   body, answers `200`/`400`/`401`, and starts the delivery without waiting
//!   for it.
//! - [`tls`]: loads the PEM certificate chain and key into a rustls acceptor.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP framing and TLS live here. The [`dispatch`] crate
//! never sees a request, only the [`dispatch::Notification`] built from it.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

pub mod handler;
pub mod server;
pub mod tls;

pub use handler::{read_body, WebhookHandler};
pub use server::{bind, Server};
pub use tls::load_acceptor;

/// Startup failures of the listener. All of them are fatal.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listening socket could not be bound.
    #[error("could not listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The bound socket did not report its address.
    #[error("could not read the listening address: {0}")]
    LocalAddr(#[source] std::io::Error),

    /// A certificate or key file is missing or unusable.
    #[error("TLS material '{}': {message}", path.display())]
    TlsMaterial { path: PathBuf, message: String },

    /// rustls refused the certificate/key pair.
    #[error("invalid TLS configuration: {0}")]
    TlsConfig(#[source] rustls::Error),
}
