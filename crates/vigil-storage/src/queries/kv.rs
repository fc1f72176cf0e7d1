// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoped key/value operations.

use rusqlite::{params, OptionalExtension};
use vigil_core::VigilError;

use crate::database::{map_tr_err, Database};

pub async fn get(db: &Database, scope: &str, key: &str) -> Result<Option<String>, VigilError> {
    let scope = scope.to_string();
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT value FROM kv WHERE scope = ?1 AND key = ?2",
                params![scope, key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set(db: &Database, scope: &str, key: &str, value: &str) -> Result<(), VigilError> {
    let scope = scope.to_string();
    let key = key.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO kv (scope, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (scope, key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![scope, key, value],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete(db: &Database, scope: &str, key: &str) -> Result<(), VigilError> {
    let scope = scope.to_string();
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM kv WHERE scope = ?1 AND key = ?2",
                params![scope, key],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Remove every key in `scope`, returning how many were removed.
pub async fn clear(db: &Database, scope: &str) -> Result<usize, VigilError> {
    let scope = scope.to_string();
    db.connection()
        .call(move |conn| conn.execute("DELETE FROM kv WHERE scope = ?1", params![scope]))
        .await
        .map_err(map_tr_err)
}

pub async fn keys(db: &Database, scope: &str) -> Result<Vec<String>, VigilError> {
    let scope = scope.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv WHERE scope = ?1 ORDER BY key")?;
            let rows = stmt.query_map(params![scope], |row| row.get(0))?;
            rows.collect::<Result<Vec<String>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
