//! Caller authentication: peer address first, then the optional query token.

use std::net::IpAddr;

use crate::{AccessToken, AuthError, SourceHost};

/// Decides whether a request may proceed to the payload reader.
///
/// Identity is the TCP peer address of the connection, never the `Host`
/// header. Behind a reverse proxy the peer is the proxy, so the source host
/// must then be configured as the proxy's address.
#[derive(Debug, Clone)]
pub struct Authenticator {
    source: SourceHost,
    token: Option<AccessToken>,
}

impl Authenticator {
    pub fn new(source: SourceHost, token: Option<AccessToken>) -> Self {
        Self { source, token }
    }

    /// Checks the peer address, then the raw query string.
    ///
    /// IPv4-mapped IPv6 peers (`::ffff:a.b.c.d`) are compared in their IPv4
    /// form. A missing query string is treated as empty.
    pub fn authenticate(&self, peer: IpAddr, query: Option<&str>) -> Result<(), AuthError> {
        let peer = peer.to_canonical().to_string();
        if peer != self.source.as_str() {
            return Err(AuthError::SourceMismatch {
                peer,
                expected: self.source.to_string(),
            });
        }

        if let Some(token) = &self.token {
            if !token.matches(query.unwrap_or_default()) {
                return Err(AuthError::TokenMismatch);
            }
        }

        Ok(())
    }
}
