//! Core domain for the webhook catcher.
//!
//! This crate holds every domain concept the service needs: newtype
//! identifiers, the immutable runtime configuration, the error taxonomy, the
//! caller [`Authenticator`], and the sink ports with the [`Dispatcher`] that
//! drives them. Infrastructure crates implement the ports; they never add
//! domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** No network or process I/O happens
//! here. The only runtime dependency on `tokio` is [`Dispatcher::spawn`],
//! which detaches a delivery from the request that produced it.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `SourceHost`, `AccessToken`, `RoutingKey`, `DeliveryId` |
//! | [`types`] | `Config`, `DispatchMode`, `TlsPaths`, `Notification` |
//! | [`errors`] | Startup, authentication, body-read, dispatch and queue errors |
//! | [`auth`] | Peer-address and query-token authentication |
//! | [`sink`] | `NotificationSink` / `QueueStore` ports, `Dispatcher`, `QueueSink` |

pub mod auth;
pub mod errors;
pub mod identifiers;
pub mod sink;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use auth::Authenticator;
pub use errors::{AuthError, BodyReadError, ConfigError, DispatchError, QueueError};
pub use identifiers::{AccessToken, DeliveryId, RoutingKey, SourceHost, MAX_ROUTING_KEY_LEN};
pub use sink::{routing_key, Dispatcher, NotificationSink, QueueSink, QueueStore};
pub use types::{
    Config, DispatchMode, Notification, TlsPaths, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT,
    DEFAULT_SOURCE_HOST,
};
