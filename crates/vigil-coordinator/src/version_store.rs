// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable bookkeeping of which invalidation this client has processed.
//!
//! The authoritative copy lives in memory behind an async mutex; every
//! mutation is written through to the [`KeyValueStore`]. A failed write is
//! logged, the store is marked degraded, and the in-memory state remains
//! authoritative for the rest of the session.
//!
//! Callers that read, decide and then write hold a [`VersionGuard`] for the
//! whole sequence so the live path and catch-up never interleave.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use vigil_core::{KeyValueStore, Version};

pub const LAST_APPLIED_VERSION_KEY: &str = "vigil.last_applied_version";
pub const LAST_APPLIED_AT_KEY: &str = "vigil.last_applied_at";
pub const SKIPPED_VERSIONS_KEY: &str = "vigil.skipped_versions";

/// Keys the coordinator owns; a storage purge never removes them.
pub const BOOKKEEPING_KEYS: [&str; 3] = [
    LAST_APPLIED_VERSION_KEY,
    LAST_APPLIED_AT_KEY,
    SKIPPED_VERSIONS_KEY,
];

/// Bounded, insertion-ordered set of deferred versions.
///
/// Re-inserting a version moves it to the most-recent end. When full, the
/// oldest entry is evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedVersions {
    capacity: usize,
    entries: VecDeque<Version>,
}

impl SkippedVersions {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.entries.contains(version)
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Version> {
        self.entries.iter()
    }

    pub fn insert(&mut self, version: Version) {
        self.entries.retain(|v| v != &version);
        self.entries.push_back(version);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Serialized form: a JSON array of identifiers, oldest first.
    pub fn to_json(&self) -> String {
        let ids: Vec<&str> = self.entries.iter().map(Version::as_str).collect();
        serde_json::Value::from(ids).to_string()
    }

    /// Parse the serialized form, keeping the newest `capacity` entries.
    pub fn from_json(raw: &str, capacity: usize) -> Result<Self, serde_json::Error> {
        let ids: Vec<String> = serde_json::from_str(raw)?;
        let mut skipped = Self::new(capacity);
        for id in ids {
            skipped.insert(Version(id));
        }
        Ok(skipped)
    }
}

/// Client-owned record of the last processed invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInvalidationState {
    pub last_applied_version: Option<Version>,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub skipped_versions: SkippedVersions,
}

impl LocalInvalidationState {
    pub fn empty(skipped_history: usize) -> Self {
        Self {
            last_applied_version: None,
            last_applied_at: None,
            skipped_versions: SkippedVersions::new(skipped_history),
        }
    }
}

pub struct VersionStore {
    store: Arc<dyn KeyValueStore>,
    state: Mutex<LocalInvalidationState>,
    degraded: AtomicBool,
}

impl VersionStore {
    /// Read persisted state. Unreadable or malformed values are logged and
    /// treated as absent.
    pub async fn load(store: Arc<dyn KeyValueStore>, skipped_history: usize) -> Self {
        let mut degraded = false;
        let mut state = LocalInvalidationState::empty(skipped_history);

        match store.get(LAST_APPLIED_VERSION_KEY).await {
            Ok(value) => state.last_applied_version = value.map(Version),
            Err(e) => {
                warn!(error = %e, "could not read last applied version, starting empty");
                degraded = true;
            }
        }

        match store.get(LAST_APPLIED_AT_KEY).await {
            Ok(Some(raw)) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(at) => state.last_applied_at = Some(at.with_timezone(&Utc)),
                Err(e) => warn!(value = %raw, error = %e, "ignoring malformed last applied time"),
            },
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "could not read last applied time, starting empty");
                degraded = true;
            }
        }

        match store.get(SKIPPED_VERSIONS_KEY).await {
            Ok(Some(raw)) => match SkippedVersions::from_json(&raw, skipped_history) {
                Ok(skipped) => state.skipped_versions = skipped,
                Err(e) => warn!(error = %e, "ignoring malformed skipped versions"),
            },
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "could not read skipped versions, starting empty");
                degraded = true;
            }
        }

        debug!(
            last_applied_version = ?state.last_applied_version,
            skipped = state.skipped_versions.len(),
            "local invalidation state loaded"
        );

        Self {
            store,
            state: Mutex::new(state),
            degraded: AtomicBool::new(degraded),
        }
    }

    /// Enter the critical section.
    pub async fn lock(&self) -> VersionGuard<'_> {
        VersionGuard {
            owner: self,
            state: self.state.lock().await,
        }
    }

    pub async fn snapshot(&self) -> LocalInvalidationState {
        self.state.lock().await.clone()
    }

    /// True once any read or write of the backing store has failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    async fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value).await {
            warn!(key, error = %e, "persisting invalidation state failed, continuing in memory");
            self.degraded.store(true, Ordering::Release);
        }
    }
}

/// Exclusive access to the local state; dropping it ends the critical section.
pub struct VersionGuard<'a> {
    owner: &'a VersionStore,
    state: MutexGuard<'a, LocalInvalidationState>,
}

impl VersionGuard<'_> {
    pub fn state(&self) -> &LocalInvalidationState {
        &self.state
    }

    /// Record `version` as processed without touching `last_applied_at`.
    pub async fn advance_version(&mut self, version: &Version) {
        self.state.last_applied_version = Some(version.clone());
        self.owner
            .persist(LAST_APPLIED_VERSION_KEY, version.as_str())
            .await;
    }

    /// Record `version` as purged at `at`.
    pub async fn record_applied(&mut self, version: &Version, at: DateTime<Utc>) {
        self.advance_version(version).await;
        self.state.last_applied_at = Some(at);
        self.owner
            .persist(
                LAST_APPLIED_AT_KEY,
                &at.to_rfc3339_opts(SecondsFormat::Millis, true),
            )
            .await;
    }

    pub async fn record_skipped(&mut self, version: &Version) {
        self.state.skipped_versions.insert(version.clone());
        let json = self.state.skipped_versions.to_json();
        self.owner.persist(SKIPPED_VERSIONS_KEY, &json).await;
    }

    /// Advance to `version` only if the last applied version still equals
    /// `expected`. Returns whether the write happened.
    pub async fn advance_if_unchanged(
        &mut self,
        expected: Option<&Version>,
        version: &Version,
    ) -> bool {
        if self.state.last_applied_version.as_ref() != expected {
            return false;
        }
        self.advance_version(version).await;
        true
    }
}
