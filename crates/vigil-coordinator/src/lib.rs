// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cache-invalidation broadcast coordinator.
//!
//! An administrator appends an invalidation record; every connected client
//! receives it through a change feed and converges on it exactly once:
//! forced records purge local state and send the client back to sign-in,
//! skippable records let the operator defer. Clients that were offline
//! pick the newest record up at session start through the catch-up query.
//!
//! [`InvalidationCoordinator`] is the entry point. Its collaborators are the
//! traits in `vigil-core`, passed in through [`CoordinatorParts`].

pub mod backoff;
pub mod catch_up;
pub mod coordinator;
pub mod events;
pub mod executor;
pub mod presenter;
pub mod subscription;
pub mod version_store;

pub use backoff::BackoffPolicy;
pub use catch_up::{CatchUpOutcome, CatchUpPolicy};
pub use coordinator::{
    CoordinatorParts, CoordinatorSettings, HandleOutcome, IgnoreReason, InvalidationCoordinator,
};
pub use events::InvalidationEvent;
pub use executor::{
    ExecutorSettings, PurgeReport, PurgeStep, PurgeTargets, SideEffectExecutor, StepOutcome,
};
pub use presenter::{FailSafePresenter, HeadlessPresenter};
pub use subscription::SubscriptionState;
pub use version_store::{
    BOOKKEEPING_KEYS, LAST_APPLIED_AT_KEY, LAST_APPLIED_VERSION_KEY, LocalInvalidationState,
    SKIPPED_VERSIONS_KEY, SkippedVersions, VersionStore,
};
