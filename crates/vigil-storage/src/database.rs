// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! All statements are serialized through tokio-rusqlite's single background
//! thread. Clone the [`Database`] handle instead of opening a second
//! connection to the same file.

use std::path::Path;

use tracing::debug;
use vigil_core::VigilError;

use crate::migrations;

/// Handle to the single SQLite connection shared by the store and the feed.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: &str) -> Result<Self, VigilError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| VigilError::Persistence {
                source: Box::new(e),
            })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| VigilError::Persistence {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.configure(true).await?;
        db.migrate().await?;
        debug!(path, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database with the full schema.
    pub async fn open_in_memory() -> Result<Self, VigilError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| VigilError::Persistence {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.configure(false).await?;
        db.migrate().await?;
        Ok(db)
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    async fn configure(&self, wal: bool) -> Result<(), VigilError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal {
                    let mode: String = conn.pragma_update_and_check(
                        None,
                        "journal_mode",
                        "WAL",
                        |row| row.get(0),
                    )?;
                    debug!(journal_mode = %mode, "journal mode set");
                }
                conn.pragma_update(None, "busy_timeout", 5000)?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn migrate(&self) -> Result<(), VigilError> {
        self.conn
            .call(|conn| migrations::run_migrations(conn))
            .await
            .map_err(|e| VigilError::persistence(format!("migration failed: {e}")))
    }
}

/// Convert a tokio-rusqlite error into `VigilError::Persistence`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> VigilError {
    VigilError::Persistence {
        source: Box::new(e),
    }
}
