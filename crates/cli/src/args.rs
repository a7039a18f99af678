//! Command-line flags and their conversion into the runtime [`Config`].

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use dispatch::{
    AccessToken, Config, ConfigError, DispatchMode, SourceHost, TlsPaths, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_PORT, DEFAULT_SOURCE_HOST,
};

use crate::observability::LogFormat;

/// Receives webhook notifications and hands each one to a command or a queue.
#[derive(Debug, Parser)]
#[command(name = "webhook-catcher", version, about)]
#[command(group(
    ArgGroup::new("sink")
        .required(true)
        .multiple(true)
        .args(["command", "queue_addr"])
))]
pub struct Args {
    /// Source host where the webhook notification will come from
    #[arg(long, env = "WEBHOOK_CATCHER_SOURCE_HOST", default_value = DEFAULT_SOURCE_HOST)]
    pub source_host: String,

    /// Command to execute once a webhook notification is received
    #[arg(long, env = "WEBHOOK_CATCHER_COMMAND")]
    pub command: Option<String>,

    /// Siberite/memcache address to queue push events in (mutually exclusive with --command)
    #[arg(long, env = "WEBHOOK_CATCHER_QUEUE_ADDR")]
    pub queue_addr: Option<String>,

    /// Path to TLS key used to support SSL encryption
    #[arg(long, env = "WEBHOOK_CATCHER_TLS_KEY")]
    pub tls_key: Option<String>,

    /// Path to TLS certificate used to support SSL encryption
    #[arg(long, env = "WEBHOOK_CATCHER_TLS_CERT")]
    pub tls_cert: Option<String>,

    /// Port to listen for webhook notifications on
    #[arg(long, env = "WEBHOOK_CATCHER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Interface address to bind
    #[arg(long, env = "WEBHOOK_CATCHER_BIND_ADDRESS", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_address: IpAddr,

    /// If set, every request must carry exactly this token as its query string
    #[arg(long, env = "WEBHOOK_CATCHER_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Largest request body accepted, in bytes
    #[arg(long, env = "WEBHOOK_CATCHER_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Log output format
    #[arg(long, env = "WEBHOOK_CATCHER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// OTLP/gRPC endpoint for exporting trace spans (disabled when unset)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Args {
    /// `true` when exactly one of the two TLS paths was given, in which case
    /// the listener falls back to plain HTTP.
    pub fn tls_incomplete(&self) -> bool {
        let set = |p: &Option<String>| p.as_ref().is_some_and(|p| !p.is_empty());
        set(&self.tls_cert) != set(&self.tls_key)
    }

    /// Validates the flags and builds the immutable runtime configuration.
    ///
    /// Paths are taken as strings so that an empty value reaches validation
    /// as "unset" instead of failing to parse.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let source = SourceHost::new(self.source_host).ok_or(ConfigError::EmptySourceHost)?;
        let mode = DispatchMode::from_options(self.command.map(PathBuf::from), self.queue_addr)?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }

        Ok(Config {
            source,
            access_token: self.access_token.and_then(AccessToken::new),
            mode,
            bind_address: self.bind_address,
            port: self.port,
            tls: TlsPaths::from_options(
                self.tls_cert.map(PathBuf::from),
                self.tls_key.map(PathBuf::from),
            ),
            max_body_bytes: self.max_body_bytes,
        })
    }
}
