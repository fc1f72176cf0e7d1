// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Listener-facing notifications about how invalidations were handled.

use tokio::sync::broadcast;
use vigil_core::{ClearType, Version};

use crate::executor::PurgeReport;

/// Events per listener buffered before slow listeners start lagging.
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationEvent {
    /// Local state was purged and the session handed back to sign-in.
    Applied {
        version: Version,
        clear_type: ClearType,
        report: PurgeReport,
    },
    /// The operator (or the fail-safe) deferred a skippable record.
    Deferred { version: Version },
    /// Recorded without purging because a purge just completed.
    Acknowledged { version: Version },
    /// Catch-up found a record older than the session and recorded it silently.
    SilentlyAdvanced { version: Version },
    /// Sign-out or redirect failed after local state was purged.
    PurgeFailed { version: Version, message: String },
}

impl InvalidationEvent {
    pub fn version(&self) -> &Version {
        match self {
            Self::Applied { version, .. }
            | Self::Deferred { version }
            | Self::Acknowledged { version }
            | Self::SilentlyAdvanced { version }
            | Self::PurgeFailed { version, .. } => version,
        }
    }
}

#[derive(Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<InvalidationEvent>,
}

impl EventBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.tx.subscribe()
    }

    /// Having no listeners is normal.
    pub(crate) fn emit(&self, event: InvalidationEvent) {
        let _ = self.tx.send(event);
    }
}
