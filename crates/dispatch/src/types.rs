//! Shared value types: the runtime configuration and the per-request
//! notification.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use bytes::Bytes;

use crate::{AccessToken, ConfigError, DeliveryId, SourceHost};

/// Port the listener binds when none is configured.
pub const DEFAULT_PORT: u16 = 8088;

/// Source host expected when none is configured.
pub const DEFAULT_SOURCE_HOST: &str = "github.com";

/// Largest body accepted by default (GitHub caps webhook payloads at 25 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which sink receives every notification for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchMode {
    /// Pipe each payload to a freshly started program.
    Command(PathBuf),
    /// Store each payload in the queue at this address.
    Queue(String),
}

impl DispatchMode {
    /// Selects the mode from the two optional settings.
    ///
    /// Empty strings count as unset. Exactly one of the two must remain.
    pub fn from_options(
        command: Option<PathBuf>,
        queue_addr: Option<String>,
    ) -> Result<Self, ConfigError> {
        let command = command.filter(|c| !c.as_os_str().is_empty());
        let queue_addr = queue_addr.filter(|q| !q.is_empty());

        match (command, queue_addr) {
            (Some(command), None) => Ok(Self::Command(command)),
            (None, Some(addr)) => Ok(Self::Queue(addr)),
            (None, None) => Err(ConfigError::NoSink),
            (Some(_), Some(_)) => Err(ConfigError::ConflictingSinks),
        }
    }
}

/// Certificate chain and private key for HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    /// PEM certificate chain.
    pub cert: PathBuf,
    /// PEM private key.
    pub key: PathBuf,
}

impl TlsPaths {
    /// Returns the pair only when both paths are set and non-empty.
    pub fn from_options(cert: Option<PathBuf>, key: Option<PathBuf>) -> Option<Self> {
        let cert = cert.filter(|p| !p.as_os_str().is_empty())?;
        let key = key.filter(|p| !p.as_os_str().is_empty())?;
        Some(Self { cert, key })
    }
}

/// Process-wide configuration, built once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address every request must come from.
    pub source: SourceHost,
    /// Optional query-string token.
    pub access_token: Option<AccessToken>,
    /// Sink selection.
    pub mode: DispatchMode,
    /// Interface to bind.
    pub bind_address: IpAddr,
    /// Port to bind.
    pub port: u16,
    /// HTTPS material; plain HTTP when `None`.
    pub tls: Option<TlsPaths>,
    /// Request bodies larger than this are rejected with `400`.
    pub max_body_bytes: usize,
}

impl Config {
    /// Socket address the listener binds.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

// ---------------------------------------------------------------------------
// Per-request
// ---------------------------------------------------------------------------

/// One webhook delivery: the raw body plus metadata used for logging.
///
/// Sinks treat `payload` as opaque bytes, except the queue sink, which reads
/// the routing key out of it. A notification is consumed by exactly one sink.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Locally generated correlation id.
    pub delivery: DeliveryId,
    /// Address of the connection the request arrived on.
    pub peer: IpAddr,
    /// Value of the `X-GitHub-Event` header, if sent.
    pub event: Option<String>,
    /// Value of the `X-GitHub-Delivery` header, if sent.
    pub github_delivery: Option<String>,
    /// The request body, byte for byte.
    pub payload: Bytes,
}

impl Notification {
    /// Creates a notification with no GitHub headers.
    pub fn new(delivery: DeliveryId, peer: IpAddr, payload: impl Into<Bytes>) -> Self {
        Self {
            delivery,
            peer,
            event: None,
            github_delivery: None,
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_only_selects_command_mode() {
        let mode = DispatchMode::from_options(Some("/bin/cat".into()), None).unwrap();
        assert_eq!(mode, DispatchMode::Command("/bin/cat".into()));
    }

    #[test]
    fn queue_only_selects_queue_mode() {
        let mode = DispatchMode::from_options(None, Some("localhost:22133".into())).unwrap();
        assert_eq!(mode, DispatchMode::Queue("localhost:22133".into()));
    }

    #[test]
    fn missing_sink_is_an_error() {
        assert_eq!(
            DispatchMode::from_options(None, None),
            Err(ConfigError::NoSink)
        );
        assert_eq!(
            DispatchMode::from_options(Some(PathBuf::new()), Some(String::new())),
            Err(ConfigError::NoSink)
        );
    }

    #[test]
    fn both_sinks_is_an_error() {
        assert_eq!(
            DispatchMode::from_options(Some("/bin/cat".into()), Some("localhost:22133".into())),
            Err(ConfigError::ConflictingSinks)
        );
    }

    #[test]
    fn empty_option_does_not_conflict() {
        let mode = DispatchMode::from_options(Some("/bin/cat".into()), Some(String::new())).unwrap();
        assert_eq!(mode, DispatchMode::Command("/bin/cat".into()));
    }

    #[test]
    fn tls_requires_both_paths() {
        assert!(TlsPaths::from_options(Some("cert.pem".into()), None).is_none());
        assert!(TlsPaths::from_options(None, Some("key.pem".into())).is_none());
        assert!(TlsPaths::from_options(Some("cert.pem".into()), Some(PathBuf::new())).is_none());

        let tls = TlsPaths::from_options(Some("cert.pem".into()), Some("key.pem".into())).unwrap();
        assert_eq!(tls.cert, PathBuf::from("cert.pem"));
        assert_eq!(tls.key, PathBuf::from("key.pem"));
    }

    #[test]
    fn listen_addr_combines_bind_address_and_port() {
        let config = Config {
            source: SourceHost::new(DEFAULT_SOURCE_HOST).unwrap(),
            access_token: None,
            mode: DispatchMode::Command("/bin/cat".into()),
            bind_address: IpAddr::from([127, 0, 0, 1]),
            port: DEFAULT_PORT,
            tls: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        };
        assert_eq!(config.listen_addr().to_string(), "127.0.0.1:8088");
    }
}
