// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-local key/value storage.

use async_trait::async_trait;

use crate::error::VigilError;

/// String key/value storage local to one client.
///
/// Used both for the coordinator's own bookkeeping and as a purge target.
/// Implementations cover durable storage (survives reloads) and
/// session-scoped storage (lives as long as the client session).
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, VigilError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), VigilError>;

    /// Removes `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), VigilError>;

    /// Removes every key.
    async fn clear(&self) -> Result<(), VigilError>;

    async fn keys(&self) -> Result<Vec<String>, VigilError>;
}
