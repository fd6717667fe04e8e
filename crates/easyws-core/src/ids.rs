//! Client identities.
//!
//! Every session gets a [`ClientId`] drawn from a process-wide atomic
//! counter. Identities are never reused within a process, so two live
//! sessions can never share one.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Next identity to hand out. Zero is never assigned.
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique identity of one session.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u64);

impl ClientId {
    /// Allocate a fresh identity.
    pub fn next() -> Self {
        Self(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw value (for lookups and tests; does not reserve it).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("client-").unwrap_or(s);
        raw.parse().map(Self)
    }
}
