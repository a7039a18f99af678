//! Webhook catcher entry point.
//!
//! This binary is the composition root for the whole system. Responsibilities:
//!
//! 1. **Parse configuration**: flags and `WEBHOOK_CATCHER_*` environment
//!    variables are validated into a [`dispatch::Config`]. Invalid input exits
//!    with a usage error before anything is bound.
//! 2. **Wire observability**: `tracing-subscriber` with a pretty or JSON layer,
//!    plus an OpenTelemetry OTLP exporter when an endpoint is configured.
//! 3. **Select the sink**: a [`command::CommandSink`] or a
//!    [`dispatch::QueueSink`] over a [`queue::MemcacheStore`].
//! 4. **Serve**: bind the listener, terminate TLS when both the certificate and
//!    key are given, and run until SIGINT or SIGTERM.

mod args;
mod observability;

use std::sync::Arc;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use command::CommandSink;
use dispatch::{Config, DispatchMode, Dispatcher, NotificationSink, QueueSink};
use listener::{Server, WebhookHandler};
use queue::MemcacheStore;
use tracing::{error, info, warn};

use crate::args::Args;
use crate::observability::Telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let telemetry = observability::init(args.log_format, args.otlp_endpoint.as_deref())?;

    if args.tls_incomplete() {
        warn!("only one of --tls-cert and --tls-key was given; serving plain HTTP");
    }

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            telemetry.shutdown();
            Args::command().error(ErrorKind::ValueValidation, e).exit()
        }
    };

    finish(telemetry, run(config).await)
}

/// Logs a fatal error, then flushes telemetry whatever the outcome.
fn finish(telemetry: Telemetry, result: anyhow::Result<()>) -> anyhow::Result<()> {
    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "webhook catcher failed");
    }
    telemetry.shutdown();
    result
}

/// Builds the sink and listener, then serves until a shutdown signal.
async fn run(config: Config) -> anyhow::Result<()> {
    let sink: Arc<dyn NotificationSink> = match &config.mode {
        DispatchMode::Command(program) => Arc::new(CommandSink::new(program)),
        DispatchMode::Queue(addr) => {
            let store = MemcacheStore::new(addr.as_str())
                .with_context(|| format!("invalid queue address '{addr}'"))?;
            Arc::new(QueueSink::new(store, addr.as_str()))
        }
    };

    let handler = WebhookHandler::from_config(&config, Dispatcher::new(sink));
    let mut server = Server::new(handler);
    if let Some(paths) = &config.tls {
        server = server.with_tls(listener::load_acceptor(paths)?);
    }

    let socket = listener::bind(config.listen_addr()).await?;
    server.serve(socket, shutdown_signal()).await?;

    info!("webhook catcher stopped");
    Ok(())
}

/// Completes on Ctrl-C, or on SIGTERM where the platform has it.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
