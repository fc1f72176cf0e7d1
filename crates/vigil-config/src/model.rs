// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Vigil invalidation coordinator.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Vigil configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VigilConfig {
    /// Client identity, logging, and purge behavior.
    #[serde(default)]
    pub client: ClientConfig,

    /// Invalidation table and freshness windows.
    #[serde(default)]
    pub invalidation: InvalidationConfig,

    /// Live subscription reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Local database and change-feed settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Client-side behavior configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Authentication entry point the client is sent to after a purge.
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Storage key marking the original user during impersonation.
    /// Survives storage purges.
    #[serde(default = "default_impersonation_key")]
    pub impersonation_key: String,

    /// How long the notice stays visible between sign-out and redirect.
    #[serde(default = "default_sign_out_delay_ms")]
    pub sign_out_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            entry_point: default_entry_point(),
            impersonation_key: default_impersonation_key(),
            sign_out_delay_ms: default_sign_out_delay_ms(),
        }
    }
}

impl ClientConfig {
    pub fn sign_out_delay(&self) -> Duration {
        Duration::from_millis(self.sign_out_delay_ms)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_entry_point() -> String {
    "/".to_string()
}

fn default_impersonation_key() -> String {
    "original_user".to_string()
}

fn default_sign_out_delay_ms() -> u64 {
    1000
}

/// Invalidation table and freshness window configuration.
///
/// The windows are operational tuning, not protocol guarantees.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InvalidationConfig {
    /// Append-only table carrying invalidation records.
    #[serde(default = "default_table")]
    pub table: String,

    /// A record arriving within this many seconds of the last purge is
    /// acknowledged without purging again.
    #[serde(default = "default_loop_guard_secs")]
    pub loop_guard_secs: u64,

    /// Catch-up is skipped entirely if the last purge is younger than this.
    #[serde(default = "default_catch_up_skip_secs")]
    pub catch_up_skip_secs: u64,

    /// Catch-up treats records older than this as predating the session.
    #[serde(default = "default_catch_up_stale_secs")]
    pub catch_up_stale_secs: u64,

    /// How many deferred versions are remembered.
    #[serde(default = "default_skipped_history")]
    pub skipped_history: usize,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            loop_guard_secs: default_loop_guard_secs(),
            catch_up_skip_secs: default_catch_up_skip_secs(),
            catch_up_stale_secs: default_catch_up_stale_secs(),
            skipped_history: default_skipped_history(),
        }
    }
}

fn default_table() -> String {
    "cache_invalidations".to_string()
}

fn default_loop_guard_secs() -> u64 {
    30
}

fn default_catch_up_skip_secs() -> u64 {
    300
}

fn default_catch_up_stale_secs() -> u64 {
    120
}

fn default_skipped_history() -> usize {
    10
}

/// Reconnect backoff configuration for the live subscription.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Delay before the first retry; doubles on every further attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Retries after which live delivery is abandoned for the session.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Add a random delay on top of the exponential schedule.
    #[serde(default)]
    pub jitter: bool,

    /// Upper bound of the random jitter.
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// A subscribe call that has not been acknowledged after this long counts as failed.
    #[serde(default = "default_subscribe_timeout_ms")]
    pub subscribe_timeout_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            jitter: false,
            max_jitter_ms: default_max_jitter_ms(),
            subscribe_timeout_ms: default_subscribe_timeout_ms(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_jitter_ms() -> u64 {
    250
}

fn default_subscribe_timeout_ms() -> u64 {
    10_000
}

/// Local database and change-feed configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Polling period of the SQLite change feed.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl StorageConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("vigil").join("vigil.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("vigil.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_poll_interval_ms() -> u64 {
    500
}
