// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vigil status` command implementation.
//!
//! Shows the local bookkeeping (last applied version, when, and deferred
//! versions) next to the latest published record, so an operator can tell
//! whether this client is behind.

use std::io::IsTerminal;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vigil_config::VigilConfig;
use vigil_coordinator::{LocalInvalidationState, VersionStore};
use vigil_core::{InvalidationRecord, RecordSource, VigilError};
use vigil_storage::{Database, SqliteFeed, SqliteStore};

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub table: String,
    pub last_applied_version: Option<String>,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub skipped_versions: Vec<String>,
    pub latest: Option<InvalidationRecord>,
    pub up_to_date: bool,
}

impl StatusResponse {
    pub fn new(
        table: &str,
        local: &LocalInvalidationState,
        latest: Option<InvalidationRecord>,
    ) -> Self {
        let up_to_date = match &latest {
            None => true,
            Some(record) => {
                local.last_applied_version.as_ref() == Some(&record.id)
                    || (record.is_skippable && local.skipped_versions.contains(&record.id))
            }
        };
        Self {
            table: table.to_string(),
            last_applied_version: local.last_applied_version.as_ref().map(|v| v.to_string()),
            last_applied_at: local.last_applied_at,
            skipped_versions: local.skipped_versions.iter().map(|v| v.to_string()).collect(),
            latest,
            up_to_date,
        }
    }
}

/// Run the `vigil status` command.
pub async fn run_status(config: &VigilConfig, json: bool, plain: bool) -> Result<(), VigilError> {
    let db = Database::open(&config.storage.database_path).await?;
    let durable = Arc::new(SqliteStore::durable(db.clone()));
    let local = VersionStore::load(durable, config.invalidation.skipped_history)
        .await
        .snapshot()
        .await;

    let feed = SqliteFeed::new(db, config.storage.poll_interval());
    let latest = feed.query_latest(&config.invalidation.table).await?;
    let status = StatusResponse::new(&config.invalidation.table, &local, latest);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&status, use_color);
    }
    Ok(())
}

fn print_status(status: &StatusResponse, use_color: bool) {
    println!();
    println!("  vigil status");
    println!("  {}", "-".repeat(35));

    let state = if use_color {
        use colored::Colorize;
        if status.up_to_date {
            format!("{} {}", "✓".green(), "up to date".green())
        } else {
            format!("{} {}", "✗".yellow(), "invalidation pending".yellow())
        }
    } else if status.up_to_date {
        "[OK] up to date".to_string()
    } else {
        "[PENDING] invalidation pending".to_string()
    };
    println!("    State:    {state}");
    println!("    Table:    {}", status.table);

    match (&status.last_applied_version, status.last_applied_at) {
        (Some(version), Some(at)) => println!("    Applied:  {version} at {}", at.to_rfc3339()),
        (Some(version), None) => println!("    Applied:  {version}"),
        _ => println!("    Applied:  none"),
    }
    if !status.skipped_versions.is_empty() {
        println!("    Deferred: {}", status.skipped_versions.join(", "));
    }

    match &status.latest {
        Some(record) => {
            println!(
                "    Latest:   {} ({}, {}) at {}",
                record.id,
                record.clear_type,
                if record.is_skippable { "skippable" } else { "forced" },
                record.created_at.to_rfc3339()
            );
            if let Some(reason) = &record.reason {
                println!("    Reason:   {reason}");
            }
        }
        None => println!("    Latest:   no records published"),
    }
    println!();
}

#[cfg(test)]
mod tests {
    use vigil_core::{ClearType, Version};

    use super::*;

    fn record(id: &str, skippable: bool) -> InvalidationRecord {
        InvalidationRecord {
            id: Version::from(id),
            reason: Some("release".into()),
            clear_type: ClearType::Full,
            is_skippable: skippable,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_table_is_up_to_date() {
        let local = LocalInvalidationState::empty(10);
        let status = StatusResponse::new("cache_invalidations", &local, None);
        assert!(status.up_to_date);
        assert_eq!(status.last_applied_version, None);
    }

    #[test]
    fn applied_latest_is_up_to_date() {
        let mut local = LocalInvalidationState::empty(10);
        local.last_applied_version = Some(Version::from("v2"));
        let status = StatusResponse::new("t", &local, Some(record("v2", false)));
        assert!(status.up_to_date);

        let status = StatusResponse::new("t", &local, Some(record("v3", false)));
        assert!(!status.up_to_date);
    }

    #[test]
    fn deferred_skippable_latest_counts_as_handled() {
        let mut local = LocalInvalidationState::empty(10);
        local.skipped_versions.insert(Version::from("v3"));
        let status = StatusResponse::new("t", &local, Some(record("v3", true)));
        assert!(status.up_to_date);
        assert_eq!(status.skipped_versions, vec!["v3"]);
    }

    #[test]
    fn status_serializes() {
        let local = LocalInvalidationState::empty(10);
        let status = StatusResponse::new("t", &local, Some(record("v9", false)));
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"up_to_date\":false"));
        assert!(json.contains("\"clear_type\":\"full\""));
    }
}
