// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-interaction boundary for invalidation notices and choices.

use async_trait::async_trait;

use crate::error::VigilError;
use crate::types::{Decision, InvalidationRecord};

/// Surfaces invalidations to the operator.
///
/// An `Err` from either method means the operator could not be reached
/// (for example, no display context). The coordinator then falls back to
/// accepting forced records and deferring skippable ones.
#[async_trait]
pub trait DecisionPresenter: Send + Sync + 'static {
    /// Shows an uninterruptible notice for a forced record.
    ///
    /// Must return once the notice is displayed; it must not wait for the
    /// operator to dismiss it.
    async fn show_notice(&self, record: &InvalidationRecord) -> Result<(), VigilError>;

    /// Asks the operator whether to apply a skippable record now.
    async fn ask_choice(&self, record: &InvalidationRecord) -> Result<Decision, VigilError>;
}
