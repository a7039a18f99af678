//! Accept loop: one task per connection, optional TLS, stoppable by a future.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::{ListenerError, WebhookHandler};

/// Pause after a failed `accept` (e.g. file descriptor exhaustion) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Binds the listening socket.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ListenerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })
}

/// Serves webhook requests over HTTP/1.1, optionally wrapped in TLS.
#[derive(Clone)]
pub struct Server {
    handler: Arc<WebhookHandler>,
    tls: Option<TlsAcceptor>,
}

impl Server {
    pub fn new(handler: WebhookHandler) -> Self {
        Self {
            handler: Arc::new(handler),
            tls: None,
        }
    }

    /// Terminates TLS on every accepted connection.
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls.is_some() {
            "https"
        } else {
            "http"
        }
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// Connections already accepted, and deliveries already started, keep
    /// running after this returns.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ListenerError>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr().map_err(ListenerError::LocalAddr)?;
        info!(
            addr = %local,
            scheme = self.scheme(),
            sink = %self.handler.sink(),
            "listening for webhook notifications"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested; no longer accepting connections");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let handler = self.handler.clone();
        let tls = self.tls.clone();

        tokio::spawn(async move {
            match tls {
                None => serve_connection(stream, peer, handler).await,
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(stream) => serve_connection(stream, peer, handler).await,
                    Err(e) => warn!(%peer, error = %e, "TLS handshake failed"),
                },
            }
        });
    }
}

async fn serve_connection<S>(stream: S, peer: SocketAddr, handler: Arc<WebhookHandler>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req: Request<Incoming>| {
        let handler = handler.clone();
        async move { Ok::<_, Infallible>(handler.handle(peer.ip(), req).await) }
    });

    if let Err(e) = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!(%peer, error = %e, "error serving connection");
    }
}
