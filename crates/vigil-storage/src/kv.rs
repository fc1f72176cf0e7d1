// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed [`KeyValueStore`].

use async_trait::async_trait;
use strum::{Display, EnumString};
use vigil_core::{KeyValueStore, VigilError};

use crate::database::Database;
use crate::queries;

/// Which slice of the `kv` table a store operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StorageScope {
    /// Survives client restarts.
    Durable,
    /// Wiped by the host when the client session ends.
    Session,
}

/// Key/value store persisted in the shared SQLite database.
///
/// Durable and session stores over the same [`Database`] never see each
/// other's keys.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
    scope: StorageScope,
}

impl SqliteStore {
    pub fn new(db: Database, scope: StorageScope) -> Self {
        Self { db, scope }
    }

    pub fn durable(db: Database) -> Self {
        Self::new(db, StorageScope::Durable)
    }

    pub fn session(db: Database) -> Self {
        Self::new(db, StorageScope::Session)
    }

    pub fn scope(&self) -> StorageScope {
        self.scope
    }

    fn scope_name(&self) -> String {
        self.scope.to_string()
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, VigilError> {
        queries::kv::get(&self.db, &self.scope_name(), key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), VigilError> {
        queries::kv::set(&self.db, &self.scope_name(), key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), VigilError> {
        queries::kv::delete(&self.db, &self.scope_name(), key).await
    }

    async fn clear(&self) -> Result<(), VigilError> {
        let removed = queries::kv::clear(&self.db, &self.scope_name()).await?;
        tracing::debug!(scope = %self.scope, removed, "key/value scope cleared");
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, VigilError> {
        queries::kv::keys(&self.db, &self.scope_name()).await
    }
}
