// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast transport and direct-query seams over the invalidation table.

use async_trait::async_trait;

use crate::error::VigilError;
use crate::types::{InvalidationRecord, Subscription, SubscriptionHandle};

/// Change feed delivering INSERT events on an append-only table.
#[async_trait]
pub trait BroadcastTransport: Send + Sync + 'static {
    /// Opens a live subscription to inserts on `table`.
    ///
    /// Only rows inserted after the subscription is acknowledged are delivered.
    async fn subscribe(&self, table: &str) -> Result<Subscription, VigilError>;

    /// Deregisters a subscription. Resolves once the transport has confirmed
    /// that no further events will be sent for `handle`.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), VigilError>;
}

/// Direct read access to the table backing the transport.
#[async_trait]
pub trait RecordSource: Send + Sync + 'static {
    /// Returns the most recent record by `created_at`, or `None` if the table is empty.
    async fn query_latest(&self, table: &str) -> Result<Option<InvalidationRecord>, VigilError>;
}
