//! Request ID generation.
//!
//! Each proxied request carries a unique identifier so it can be followed
//! through logs and into the backend via the `x-request-id` header.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A unique request (or connection) identifier.
#[derive(Clone, Debug)]
pub struct RequestId(String);

impl RequestId {
    /// A globally unique, UUID-backed ID for cross-process correlation.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// A process-local counter ID, cheaper than a UUID. Used for
    /// connection-scoped log correlation.
    pub fn short() -> Self {
        let count = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn-{:08x}", count))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
