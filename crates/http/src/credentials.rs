//! Credential storage mirrored across a cookie layer and a durable layer
//!
//! Every write goes to both layers; reads prefer the cookie layer and fall
//! back to the durable one. The cookie layer is what a server-side request
//! inspection sees, so [`CredentialStore::has_session`] consults only it.

use crate::types::{TokenPair, User};
use std::sync::Arc;
use std::time::Duration;
use storefront_core::{CoreResult, KeyValueStore, MemoryStore};

/// Current key for the access token
pub const ACCESS_TOKEN_KEY: &str = "client_access_token";
/// Current key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "client_refresh_token";
/// Key for the serialized user profile (durable layer only)
pub const USER_KEY: &str = "user";

/// Pre-migration key for the access token
pub const LEGACY_ACCESS_TOKEN_KEY: &str = "access_token";
/// Pre-migration key for the refresh token
pub const LEGACY_REFRESH_TOKEN_KEY: &str = "refresh_token";

const DAY: Duration = Duration::from_secs(60 * 60 * 24);

/// Expiry applied to each layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialTtl {
    /// Cookie lifetime of the access token
    pub access_cookie: Duration,
    /// Cookie lifetime of the refresh token
    pub refresh_cookie: Duration,
    /// Lifetime of everything in the durable layer
    pub durable: Duration,
}

impl Default for CredentialTtl {
    fn default() -> Self {
        Self {
            access_cookie: 7 * DAY,
            refresh_cookie: 7 * DAY,
            durable: 7 * DAY,
        }
    }
}

/// Outcome of [`CredentialStore::migrate_legacy_keys`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Current keys that received a legacy value
    pub migrated: Vec<&'static str>,
    /// Legacy keys that were found and deleted
    pub removed: Vec<&'static str>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.migrated.is_empty() && self.removed.is_empty()
    }
}

/// Credential store writing to both layers and reading cookie-first
#[derive(Clone)]
pub struct CredentialStore {
    cookies: Arc<dyn KeyValueStore>,
    durable: Arc<dyn KeyValueStore>,
    ttl: CredentialTtl,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    pub fn new(
        cookies: Arc<dyn KeyValueStore>,
        durable: Arc<dyn KeyValueStore>,
        ttl: CredentialTtl,
    ) -> Self {
        Self {
            cookies,
            durable,
            ttl,
        }
    }

    /// Store with both layers held in memory
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            CredentialTtl::default(),
        )
    }

    pub fn ttl(&self) -> CredentialTtl {
        self.ttl
    }

    /// The cookie layer
    pub fn cookies(&self) -> &dyn KeyValueStore {
        self.cookies.as_ref()
    }

    /// The durable layer
    pub fn durable(&self) -> &dyn KeyValueStore {
        self.durable.as_ref()
    }

    /// Read `key` from the cookie layer, falling back to the durable layer.
    ///
    /// A layer that fails to read is treated as empty.
    pub fn get(&self, key: &str) -> Option<String> {
        read_layer(self.cookies.as_ref(), "cookie", key)
            .or_else(|| read_layer(self.durable.as_ref(), "durable", key))
    }

    /// Write `key` to both layers, with `cookie_ttl` on the cookie layer.
    ///
    /// # Errors
    ///
    /// Returns the first layer error; the durable layer is written first.
    pub fn set(&self, key: &str, value: &str, cookie_ttl: Duration) -> CoreResult<()> {
        self.durable.set(key, value, self.ttl.durable)?;
        self.cookies.set(key, value, cookie_ttl)
    }

    /// Remove `key` from both layers.
    ///
    /// # Errors
    ///
    /// Both layers are attempted; the first error is returned.
    pub fn clear(&self, key: &str) -> CoreResult<()> {
        let cookie = self.cookies.remove(key);
        let durable = self.durable.remove(key);
        cookie.and(durable)
    }

    pub fn access_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN_KEY)
    }

    /// Persist a freshly issued token pair to both layers.
    ///
    /// # Errors
    ///
    /// Returns an error if either layer rejects the write.
    pub fn store_tokens(&self, tokens: &TokenPair) -> CoreResult<()> {
        self.set(ACCESS_TOKEN_KEY, &tokens.access_token, self.ttl.access_cookie)?;
        self.set(
            REFRESH_TOKEN_KEY,
            &tokens.refresh_token,
            self.ttl.refresh_cookie,
        )
    }

    /// Whether the cookie layer carries an access token
    pub fn has_session(&self) -> bool {
        read_layer(self.cookies.as_ref(), "cookie", ACCESS_TOKEN_KEY).is_some()
    }

    /// The stored user profile, if any
    pub fn user(&self) -> Option<User> {
        let raw = read_layer(self.durable.as_ref(), "durable", USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "discarding unreadable stored user profile");
                None
            }
        }
    }

    /// Persist the user profile to the durable layer.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn store_user(&self, user: &User) -> CoreResult<()> {
        let raw = serde_json::to_string(user)?;
        self.durable.set(USER_KEY, &raw, self.ttl.durable)
    }

    /// Remove every credential and the user profile from both layers.
    ///
    /// All keys are attempted even if one fails.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn clear_session(&self) -> CoreResult<()> {
        let results = [
            self.clear(ACCESS_TOKEN_KEY),
            self.clear(REFRESH_TOKEN_KEY),
            self.clear(USER_KEY),
        ];
        results.into_iter().collect::<CoreResult<Vec<()>>>().map(|_| ())
    }

    /// Move values stored under legacy keys to the current keys.
    ///
    /// A legacy value never overwrites an existing current value. Legacy keys
    /// are deleted from both layers either way, so a second run is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a write or delete fails.
    pub fn migrate_legacy_keys(&self) -> CoreResult<MigrationReport> {
        let mut report = MigrationReport::default();
        let pairs = [
            (
                LEGACY_ACCESS_TOKEN_KEY,
                ACCESS_TOKEN_KEY,
                self.ttl.access_cookie,
            ),
            (
                LEGACY_REFRESH_TOKEN_KEY,
                REFRESH_TOKEN_KEY,
                self.ttl.refresh_cookie,
            ),
        ];

        for (legacy, current, cookie_ttl) in pairs {
            let Some(value) = self.get(legacy) else {
                continue;
            };
            if self.get(current).is_none() {
                self.set(current, &value, cookie_ttl)?;
                report.migrated.push(current);
            }
            self.clear(legacy)?;
            report.removed.push(legacy);
        }

        if !report.is_noop() {
            info!(
                migrated = ?report.migrated,
                removed = ?report.removed,
                "migrated legacy credential keys"
            );
        }
        Ok(report)
    }
}

fn read_layer(layer: &dyn KeyValueStore, name: &str, key: &str) -> Option<String> {
    match layer.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!(layer = name, key, error = %e, "credential read failed");
            None
        }
    }
}
