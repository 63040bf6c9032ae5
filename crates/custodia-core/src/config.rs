//! Runtime configuration.
//!
//! Every knob has a default that works out of the box; `from_env` layers
//! environment overrides on top. The struct also deserializes from a
//! config file, with absent fields falling back to the same defaults.

use crate::age::MalformedDobPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GovernanceConfig {
    /// SQLite database path. Env: `CUSTODIA_DB`. Default: "custodia.db".
    pub db_path: String,

    /// Base URL of the remote decision oracle. Env: `POLICY_URL`.
    /// Unset means the local rule is the only arm.
    pub policy_url: Option<String>,

    /// Delegate decisions to the oracle at `policy_url`. Env:
    /// `POLICY_DELEGATE`. Default: false.
    pub delegate_policy: bool,

    /// Bound on one oracle round trip, in milliseconds. Env:
    /// `POLICY_TIMEOUT_MS`. Default: 2000.
    pub policy_timeout_ms: u64,

    /// Policy package the decision is read from. Env: `POLICY_PACKAGE`.
    /// Default: "custodia".
    pub policy_package: String,

    /// Consent cache entry lifetime, in seconds. Env: `CACHE_TTL_SECS`.
    /// Default: 300.
    pub cache_ttl_secs: u64,

    /// Consent cache capacity, in entries. Env: `CACHE_CAPACITY`.
    /// Default: 10000.
    pub cache_capacity: u64,

    /// Retention window for ingested records, in minutes. Env:
    /// `RETENTION_MINUTES`. Default: 60.
    pub retention_minutes: u64,

    /// Pause between retention sweeps, in seconds. Env:
    /// `RETENTION_POLL_SECS`. Default: 60.
    pub retention_poll_secs: u64,

    /// Treat an unparseable date of birth as a minor instead of an
    /// adult. Env: `DOB_FAIL_CLOSED`. Default: false.
    pub dob_fail_closed: bool,
}

fn default_db_path() -> String {
    "custodia.db".to_string()
}

fn default_policy_package() -> String {
    "custodia".to_string()
}

fn default_policy_timeout_ms() -> u64 {
    2_000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_retention_minutes() -> u64 {
    60
}

fn default_retention_poll_secs() -> u64 {
    60
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            policy_url: None,
            delegate_policy: false,
            policy_timeout_ms: default_policy_timeout_ms(),
            policy_package: default_policy_package(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
            retention_minutes: default_retention_minutes(),
            retention_poll_secs: default_retention_poll_secs(),
            dob_fail_closed: false,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl GovernanceConfig {
    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("CUSTODIA_DB").unwrap_or_else(|_| default_db_path()),
            policy_url: std::env::var("POLICY_URL").ok().filter(|v| !v.is_empty()),
            delegate_policy: env_flag("POLICY_DELEGATE", false),
            policy_timeout_ms: env_u64("POLICY_TIMEOUT_MS", default_policy_timeout_ms()),
            policy_package: std::env::var("POLICY_PACKAGE")
                .unwrap_or_else(|_| default_policy_package()),
            cache_ttl_secs: env_u64("CACHE_TTL_SECS", default_cache_ttl_secs()),
            cache_capacity: env_u64("CACHE_CAPACITY", default_cache_capacity()),
            retention_minutes: env_u64("RETENTION_MINUTES", default_retention_minutes()),
            retention_poll_secs: env_u64("RETENTION_POLL_SECS", default_retention_poll_secs()),
            dob_fail_closed: env_flag("DOB_FAIL_CLOSED", false),
        }
    }

    pub fn policy_timeout(&self) -> Duration {
        Duration::from_millis(self.policy_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retention_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.retention_minutes as i64)
    }

    pub fn retention_poll(&self) -> Duration {
        Duration::from_secs(self.retention_poll_secs)
    }

    pub fn malformed_dob_policy(&self) -> MalformedDobPolicy {
        if self.dob_fail_closed {
            MalformedDobPolicy::AssumeMinor
        } else {
            MalformedDobPolicy::AssumeAdult
        }
    }
}
