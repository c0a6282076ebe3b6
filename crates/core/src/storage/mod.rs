//! Key-value storage with per-entry expiry
//!
//! Two backends are provided: [`MemoryStore`], a process-local jar that behaves
//! like a browser cookie store, and [`FileStore`], a JSON file that survives
//! restarts. Both expire entries lazily on read.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::CoreResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Storage backend for string values keyed by name
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Expired entries read as `None`.
    fn get(&self, key: &str) -> CoreResult<Option<String>>;

    /// Write a value that expires after `ttl`.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> CoreResult<()>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> CoreResult<()>;
}

/// A stored value together with its expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredValue {
    pub value: String,
    /// `None` when the TTL is too large to represent
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    /// Create a value expiring `ttl` from now
    pub fn new(value: impl Into<String>, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Whether the value has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Whether the value has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
