// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client surfaces cleared or driven by the purge sequence.

use async_trait::async_trait;

use crate::error::VigilError;

/// Background workers and the response caches they manage.
#[async_trait]
pub trait WorkerHost: Send + Sync + 'static {
    /// Names of every worker-managed response cache.
    async fn cache_names(&self) -> Result<Vec<String>, VigilError>;

    async fn delete_cache(&self, name: &str) -> Result<(), VigilError>;

    /// Unregisters all workers, returning how many were registered.
    async fn unregister_workers(&self) -> Result<usize, VigilError>;

    /// Tells any worker that is still running to clear its own state.
    async fn notify_clear(&self) -> Result<(), VigilError>;
}

/// Cookies accessible to the client.
#[async_trait]
pub trait CookieJar: Send + Sync + 'static {
    async fn names(&self) -> Result<Vec<String>, VigilError>;

    async fn remove(&self, name: &str) -> Result<(), VigilError>;
}

/// Navigation to the authentication entry point.
#[async_trait]
pub trait Navigator: Send + Sync + 'static {
    async fn redirect(&self, target: &str) -> Result<(), VigilError>;
}
