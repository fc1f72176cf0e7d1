// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Freshness rules for the session-start catch-up query.
//!
//! Covers the case where the client was offline when a record was
//! published: the newest record is fetched directly and either delivered
//! like a live event or, if it predates the session, recorded silently.

use chrono::{DateTime, TimeDelta, Utc};
use vigil_config::model::InvalidationConfig;
use vigil_core::{InvalidationRecord, Version};

use crate::coordinator::HandleOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchUpPolicy {
    /// Skip the query entirely when the last purge is younger than this.
    pub skip_window: TimeDelta,
    /// Records older than this are recorded without purging.
    pub stale_window: TimeDelta,
}

/// How catch-up treats the newest remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAge {
    AlreadyApplied,
    Stale,
    Fresh,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchUpOutcome {
    /// A purge completed recently enough that the query was not made.
    SkippedRecentPurge,
    NoRecords,
    AlreadyApplied,
    /// The newest record predates the session and was recorded without a purge.
    SilentlyAdvanced(Version),
    /// A concurrent delivery moved the local version while the query ran.
    Superseded,
    /// The record went through the live handling path.
    Delivered(HandleOutcome),
    /// The direct query failed; live delivery remains the only path.
    QueryFailed(String),
    /// The coordinator was stopped before catch-up ran.
    Cancelled,
}

impl CatchUpPolicy {
    pub fn from_config(config: &InvalidationConfig) -> Self {
        Self {
            skip_window: seconds(config.catch_up_skip_secs),
            stale_window: seconds(config.catch_up_stale_secs),
        }
    }

    pub fn should_skip(&self, last_applied_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_applied_at.is_some_and(|at| now.signed_duration_since(at) < self.skip_window)
    }

    pub fn classify(
        &self,
        record: &InvalidationRecord,
        last_applied_version: Option<&Version>,
        now: DateTime<Utc>,
    ) -> RecordAge {
        if last_applied_version == Some(&record.id) {
            RecordAge::AlreadyApplied
        } else if now.signed_duration_since(record.created_at) > self.stale_window {
            RecordAge::Stale
        } else {
            RecordAge::Fresh
        }
    }
}

impl Default for CatchUpPolicy {
    fn default() -> Self {
        Self::from_config(&InvalidationConfig::default())
    }
}

pub(crate) fn seconds(secs: u64) -> TimeDelta {
    TimeDelta::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(TimeDelta::MAX)
}
