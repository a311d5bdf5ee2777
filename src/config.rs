//! Construction-time configuration for [`crate::store::Store`] and the
//! reference [`crate::backend::kv::KvBackend`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tower_cookies::cookie::SameSite;

use crate::codec::KEY_LEN;

/// How a [`crate::session::Session`] reference travels between client and
/// server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthType {
    /// Transported via a `Set-Cookie`/`Cookie` header.
    Cookie,
    /// Transported via `Authorization: Bearer <ref>`, or a caller-supplied
    /// token sink/source.
    Bearer,
}

/// Construction-time options for a [`crate::store::Store`].
///
/// `Default` mirrors the reference implementation's constants
/// (`DefaultMaxAgeSecs`, `DefaultCookieName`, and so on).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub auth_type: AuthType,
    pub max_age_secs: i64,
    pub min_refresh_secs: i64,
    pub uid_to_client: bool,

    pub cookie_name: String,
    pub cookie_domain: Option<String>,
    pub cookie_path: String,
    pub cookie_secure: bool,
    pub cookie_http_only: bool,
    pub cookie_same_site: SameSite,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            auth_type: AuthType::Cookie,
            max_age_secs: 30 * 60,
            min_refresh_secs: 5 * 60,
            uid_to_client: false,

            cookie_name: "sid".to_string(),
            cookie_domain: None,
            cookie_path: "/".to_string(),
            cookie_secure: true,
            cookie_http_only: true,
            cookie_same_site: SameSite::Lax,
        }
    }
}

impl StoreConfig {
    /// Overlays environment variables onto [`StoreConfig::default`]:
    /// `WEBSESS_MAX_AGE_SECS`, `WEBSESS_MIN_REFRESH_SECS`,
    /// `WEBSESS_COOKIE_NAME`, `WEBSESS_COOKIE_DOMAIN`. Unset variables keep
    /// the default; parse failures fall back to the default rather than
    /// panicking.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("WEBSESS_MAX_AGE_SECS") {
            if let Ok(v) = v.parse() {
                cfg.max_age_secs = v;
            }
        }
        if let Ok(v) = std::env::var("WEBSESS_MIN_REFRESH_SECS") {
            if let Ok(v) = v.parse() {
                cfg.min_refresh_secs = v;
            }
        }
        if let Ok(v) = std::env::var("WEBSESS_COOKIE_NAME") {
            cfg.cookie_name = v;
        }
        if let Ok(v) = std::env::var("WEBSESS_COOKIE_DOMAIN") {
            cfg.cookie_domain = Some(v);
        }

        cfg
    }
}

/// Construction-time options for [`crate::backend::kv::KvBackend`].
#[derive(Debug, Clone)]
pub struct KvConfig {
    pub prefix: Vec<u8>,
    pub prune_interval: Duration,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            prefix: b"websess:".to_vec(),
            prune_interval: crate::backend::kv::DEFAULT_PRUNE_INTERVAL,
        }
    }
}

impl KvConfig {
    /// Overlays `WEBSESS_PRUNE_INTERVAL_SECS` onto [`KvConfig::default`].
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("WEBSESS_PRUNE_INTERVAL_SECS") {
            if let Ok(secs) = v.parse() {
                cfg.prune_interval = Duration::from_secs(secs);
            }
        }
        cfg
    }
}

/// Checks a key is the right length for the default AEAD; used by
/// constructors that accept raw key bytes from configuration/environment.
pub fn validate_key_len(key: &[u8]) -> Result<(), String> {
    if key.len() != KEY_LEN {
        return Err(format!("key must be {KEY_LEN} bytes, got {}", key.len()));
    }
    Ok(())
}
