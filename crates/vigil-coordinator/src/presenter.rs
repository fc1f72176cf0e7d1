// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fail-safe wrapper around the operator-facing [`DecisionPresenter`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use vigil_core::{Decision, DecisionPresenter, InvalidationRecord, VigilError};

/// Turns presenter failures into the safe default for the record kind:
/// forced records are accepted, skippable records are deferred.
#[derive(Clone)]
pub struct FailSafePresenter {
    inner: Arc<dyn DecisionPresenter>,
}

impl FailSafePresenter {
    pub fn new(inner: Arc<dyn DecisionPresenter>) -> Self {
        Self { inner }
    }

    /// Show the notice (forced) or ask for a choice (skippable).
    pub async fn present(&self, record: &InvalidationRecord) -> Decision {
        if record.is_skippable {
            match self.inner.ask_choice(record).await {
                Ok(decision) => {
                    debug!(version = %record.id, %decision, "operator answered");
                    decision
                }
                Err(e) => {
                    warn!(version = %record.id, error = %e, "choice unavailable, deferring");
                    Decision::Defer
                }
            }
        } else {
            if let Err(e) = self.inner.show_notice(record).await {
                warn!(version = %record.id, error = %e, "notice unavailable, applying anyway");
            }
            Decision::Accept
        }
    }
}

/// Presenter for contexts without an operator. Every call fails, so the
/// fail-safe defaults always apply.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessPresenter;

#[async_trait]
impl DecisionPresenter for HeadlessPresenter {
    async fn show_notice(&self, _record: &InvalidationRecord) -> Result<(), VigilError> {
        Err(VigilError::Presentation("no display attached".into()))
    }

    async fn ask_choice(&self, _record: &InvalidationRecord) -> Result<Decision, VigilError> {
        Err(VigilError::Presentation("no display attached".into()))
    }
}
