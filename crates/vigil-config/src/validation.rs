// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::VigilConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of failing fast.
pub fn validate_config(config: &VigilConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if !is_sql_identifier(&config.invalidation.table) {
        invalid(format!(
            "invalidation.table `{}` must be a lowercase identifier ([a-z_][a-z0-9_]*)",
            config.invalidation.table
        ));
    }

    for (name, secs) in [
        ("invalidation.loop_guard_secs", config.invalidation.loop_guard_secs),
        ("invalidation.catch_up_skip_secs", config.invalidation.catch_up_skip_secs),
        ("invalidation.catch_up_stale_secs", config.invalidation.catch_up_stale_secs),
    ] {
        if secs == 0 {
            invalid(format!("{name} must be greater than 0"));
        }
    }

    if config.invalidation.skipped_history == 0 {
        invalid("invalidation.skipped_history must be at least 1".to_string());
    }

    if config.reconnect.max_attempts == 0 {
        invalid("reconnect.max_attempts must be at least 1".to_string());
    }

    // 2^31 doublings overflow any Duration long before that.
    if config.reconnect.max_attempts > 16 {
        invalid(format!(
            "reconnect.max_attempts must be at most 16, got {}",
            config.reconnect.max_attempts
        ));
    }

    if config.reconnect.base_delay_ms == 0 {
        invalid("reconnect.base_delay_ms must be greater than 0".to_string());
    }

    if config.reconnect.subscribe_timeout_ms == 0 {
        invalid("reconnect.subscribe_timeout_ms must be greater than 0".to_string());
    }

    if config.client.entry_point.trim().is_empty() {
        invalid("client.entry_point must not be empty".to_string());
    }

    if config.client.impersonation_key.trim().is_empty() {
        invalid("client.impersonation_key must not be empty".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    if config.storage.poll_interval_ms == 0 {
        invalid("storage.poll_interval_ms must be greater than 0".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `[a-z_][a-z0-9_]*`, the only table names the change feed will interpolate into SQL.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
