// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only invalidation record operations.
//!
//! Table names are interpolated into SQL, so every entry point rejects
//! anything that is not a plain lowercase identifier.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use vigil_config::validation::is_sql_identifier;
use vigil_core::{ClearType, InvalidationRecord, VigilError, Version};

use crate::database::{map_tr_err, Database};

/// Timestamp layout used for `created_at`; sorts lexicographically.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub(crate) fn checked_table(table: &str) -> Result<String, VigilError> {
    if is_sql_identifier(table) {
        Ok(table.to_string())
    } else {
        Err(VigilError::Config(format!(
            "`{table}` is not a valid invalidation table name"
        )))
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Columns: seq, id, reason, clear_type, is_skippable, created_at.
fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(i64, InvalidationRecord)> {
    let clear_type: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let record = InvalidationRecord {
        id: Version(row.get(1)?),
        reason: row.get(2)?,
        clear_type: ClearType::from_str(&clear_type).map_err(|e| conversion_error(3, e))?,
        is_skippable: row.get(4)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| conversion_error(5, e))?
            .with_timezone(&Utc),
    };
    Ok((row.get(0)?, record))
}

/// Create `table` (and its append-only triggers) if it does not exist yet.
pub async fn ensure_table(db: &Database, table: &str) -> Result<(), VigilError> {
    let table = checked_table(table)?;
    db.connection()
        .call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                     seq INTEGER PRIMARY KEY AUTOINCREMENT,
                     id TEXT NOT NULL UNIQUE,
                     reason TEXT,
                     clear_type TEXT NOT NULL
                         CHECK (clear_type IN ('full', 'storage', 'service_worker')),
                     is_skippable INTEGER NOT NULL DEFAULT 0,
                     created_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_{table}_created ON {table}(created_at);
                 CREATE TRIGGER IF NOT EXISTS {table}_no_update BEFORE UPDATE ON {table}
                 BEGIN SELECT RAISE(ABORT, '{table} is append-only'); END;
                 CREATE TRIGGER IF NOT EXISTS {table}_no_delete BEFORE DELETE ON {table}
                 BEGIN SELECT RAISE(ABORT, '{table} is append-only'); END;"
            ))
        })
        .await
        .map_err(map_tr_err)
}

/// Append a record, returning its sequence number.
pub async fn insert(
    db: &Database,
    table: &str,
    record: &InvalidationRecord,
) -> Result<i64, VigilError> {
    let table = checked_table(table)?;
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {table} (id, reason, clear_type, is_skippable, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)"
                ),
                params![
                    record.id.as_str(),
                    record.reason,
                    record.clear_type.to_string(),
                    record.is_skippable,
                    format_timestamp(record.created_at),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Most recent record by `created_at` (ties broken by insertion order).
pub async fn latest(db: &Database, table: &str) -> Result<Option<InvalidationRecord>, VigilError> {
    let table = checked_table(table)?;
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT seq, id, reason, clear_type, is_skippable, created_at
                     FROM {table} ORDER BY created_at DESC, seq DESC LIMIT 1"
                ),
                [],
                row_to_record,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
        .map(|found| found.map(|(_, record)| record))
}

/// Highest sequence number currently in `table`, or 0 when empty.
pub async fn max_seq(db: &Database, table: &str) -> Result<i64, VigilError> {
    let table = checked_table(table)?;
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT COALESCE(MAX(seq), 0) FROM {table}"),
                [],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Records inserted after `after_seq`, oldest first.
pub async fn inserted_after(
    db: &Database,
    table: &str,
    after_seq: i64,
) -> Result<Vec<(i64, InvalidationRecord)>, VigilError> {
    let table = checked_table(table)?;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT seq, id, reason, clear_type, is_skippable, created_at
                 FROM {table} WHERE seq > ?1 ORDER BY seq"
            ))?;
            let rows = stmt.query_map(params![after_seq], row_to_record)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
