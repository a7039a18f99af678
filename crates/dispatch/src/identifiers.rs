//! Newtype domain identifiers.
//!
//! Every value that crosses a component boundary has its own type so that, for
//! example, a [`SourceHost`] can never be passed where a [`RoutingKey`] is
//! expected even though both wrap a `String`.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DispatchError;

// ---------------------------------------------------------------------------
// Identifiers: configuration
// ---------------------------------------------------------------------------

/// The address every inbound connection must originate from.
///
/// Compared verbatim against the textual form of the peer IP, so in
/// practice this is an IP literal such as `"192.30.252.1"` or `"::1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceHost(String);

impl SourceHost {
    /// Creates a source host, returning `None` if the value is empty.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Returns the host as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared secret that must appear as the raw query string of every request.
///
/// `Debug` is redacted so the token never reaches a log line through `{:?}`.
/// It has no `Display` impl.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Creates a token, returning `None` if the value is empty.
    ///
    /// An empty token means "no token check", so it is modelled as absence.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Returns `true` if `candidate` is exactly this token.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

// ---------------------------------------------------------------------------
// Identifiers: payload-derived
// ---------------------------------------------------------------------------

/// Longest key the memcache protocol accepts.
pub const MAX_ROUTING_KEY_LEN: usize = 250;

/// Key under which a notification is stored in the queue (the repository name).
///
/// Valid keys are non-empty, at most [`MAX_ROUTING_KEY_LEN`] bytes, and contain
/// no whitespace or control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Validates `value` against the queue key rules.
    pub fn parse(value: impl Into<String>) -> Result<Self, DispatchError> {
        let key = value.into();
        let reason = if key.is_empty() {
            Some("key is empty")
        } else if key.len() > MAX_ROUTING_KEY_LEN {
            Some("key is longer than 250 bytes")
        } else if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Some("key contains whitespace or control characters")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(DispatchError::InvalidRoutingKey { key, reason }),
            None => Ok(Self(key)),
        }
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies one inbound request for log correlation.
///
/// Generated when the request is accepted and attached to the request span;
/// it never influences dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(Uuid);

impl DeliveryId {
    /// Generates a new random delivery identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
