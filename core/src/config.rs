//! Configuration: the pool's polling policy and the string variable store.
//!
//! # Design
//! `PoolConfig` is serde-friendly so embedders can load it from whatever
//! format they already use, and `from_env` covers the zero-setup case.
//! `Config` is the loose id → string store handed across the C boundary;
//! transports read the ids they understand and ignore the rest.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Proxy URL used by the HTTP transport. Empty disables proxying.
pub const CFG_STR_PROXY: i32 = 1;
/// Value sent as the `User-Agent` header.
pub const CFG_STR_AGENT: i32 = 2;
/// Whole-transfer timeout in seconds, enforced by the transport engine.
pub const CFG_STR_TIMEOUT_SECS: i32 = 3;

const ENV_POLL_MIN_MS: &str = "SINET_POLL_MIN_MS";
const ENV_POLL_MAX_MS: &str = "SINET_POLL_MAX_MS";

/// Key/value store of string variables addressed by integer id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    vars: HashMap<i32, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_strvar(&self, id: i32) -> Option<&str> {
        self.vars.get(&id).map(String::as_str)
    }

    pub fn set_strvar(&mut self, id: i32, value: impl Into<String>) {
        self.vars.insert(id, value.into());
    }

    /// Returns `true` if the variable existed.
    pub fn remove_strvar(&mut self, id: i32) -> bool {
        self.vars.remove(&id).is_some()
    }
}

/// Polling policy of the coordinator thread.
///
/// The coordinator sleeps `min_interval_ms` after an iteration that saw work
/// and doubles the sleep after each idle iteration, up to `max_interval_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 5,
            max_interval_ms: 500,
        }
    }
}

impl PoolConfig {
    /// Read `SINET_POLL_MIN_MS` / `SINET_POLL_MAX_MS`, falling back to the
    /// defaults for anything missing or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: u64| match lookup(key) {
            None => fallback,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, fallback, "ignoring unparseable poll interval");
                fallback
            }),
        };
        Self {
            min_interval_ms: read(ENV_POLL_MIN_MS, defaults.min_interval_ms),
            max_interval_ms: read(ENV_POLL_MAX_MS, defaults.max_interval_ms),
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms.max(1))
    }

    /// Never shorter than `min_interval`.
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms).max(self.min_interval())
    }
}
