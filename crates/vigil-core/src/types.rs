// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the coordinator, its collaborators, and adapters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::mpsc;

/// Opaque identifier of a published invalidation record.
///
/// Identifiers are assigned by the publisher and only compared for equality
/// on the client side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub String);

impl Version {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Version {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Scope of local state a record asks clients to purge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClearType {
    /// Worker caches, key/value storage, and cookies.
    Full,
    /// Durable and session-scoped key/value storage.
    Storage,
    /// Worker-managed response caches and the workers themselves.
    ServiceWorker,
}

impl ClearType {
    pub fn clears_worker_caches(self) -> bool {
        matches!(self, ClearType::Full | ClearType::ServiceWorker)
    }

    pub fn clears_storage(self) -> bool {
        matches!(self, ClearType::Full | ClearType::Storage)
    }

    pub fn clears_cookies(self) -> bool {
        matches!(self, ClearType::Full)
    }
}

/// A server-authoritative, append-only invalidation announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationRecord {
    pub id: Version,
    /// Human-readable explanation shown to the operator.
    pub reason: Option<String>,
    pub clear_type: ClearType,
    pub is_skippable: bool,
    pub created_at: DateTime<Utc>,
}

/// The operator's answer to a skippable invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Decision {
    Accept,
    Defer,
}

/// An authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
}

/// Context handed to the coordinator when an authenticated session begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub identity: Identity,
}

impl SessionContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

/// Transport-issued handle identifying one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

impl std::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A live subscription: its handle plus the stream of INSERT events.
///
/// The transport closes the subscription by dropping its sender; the
/// receiver then yields `None`.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub inserts: mpsc::Receiver<InvalidationRecord>,
}
