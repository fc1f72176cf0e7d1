// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vigil publish` command implementation.

use vigil_config::VigilConfig;
use vigil_core::{ClearType, VigilError};
use vigil_storage::{Database, SqliteFeed};

/// Append one invalidation record to the configured table.
pub async fn run_publish(
    config: &VigilConfig,
    clear_type: ClearType,
    reason: Option<String>,
    skippable: bool,
) -> Result<(), VigilError> {
    let db = Database::open(&config.storage.database_path).await?;
    let feed = SqliteFeed::new(db, config.storage.poll_interval());
    let record = feed
        .publish(&config.invalidation.table, clear_type, reason, skippable)
        .await?;

    println!(
        "published {} (clear_type={}, skippable={}) at {}",
        record.id,
        record.clear_type,
        record.is_skippable,
        record.created_at.to_rfc3339()
    );
    Ok(())
}
