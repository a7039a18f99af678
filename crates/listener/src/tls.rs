//! HTTPS support: loads PEM material into a rustls acceptor.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use dispatch::TlsPaths;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use rustls_pemfile::{certs, private_key};
use tokio_rustls::TlsAcceptor;

use crate::ListenerError;

/// Builds a TLS acceptor from a PEM certificate chain and private key.
///
/// Uses the `ring` provider, no client authentication, and offers only
/// HTTP/1.1 through ALPN.
pub fn load_acceptor(paths: &TlsPaths) -> Result<TlsAcceptor, ListenerError> {
    let certs = load_certs(&paths.cert)?;
    let key = load_private_key(&paths.key)?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(ListenerError::TlsConfig)?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(ListenerError::TlsConfig)?;

    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ListenerError> {
    let mut reader = open(path)?;
    let certs = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| tls_error(path, format!("failed to parse certificates: {e}")))?;

    if certs.is_empty() {
        return Err(tls_error(path, "no certificates found".into()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ListenerError> {
    let mut reader = open(path)?;
    private_key(&mut reader)
        .map_err(|e| tls_error(path, format!("failed to read private key: {e}")))?
        .ok_or_else(|| tls_error(path, "no private key found".into()))
}

fn open(path: &Path) -> Result<BufReader<File>, ListenerError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| tls_error(path, format!("failed to open: {e}")))
}

fn tls_error(path: &Path, message: String) -> ListenerError {
    ListenerError::TlsMaterial {
        path: path.to_path_buf(),
        message,
    }
}
