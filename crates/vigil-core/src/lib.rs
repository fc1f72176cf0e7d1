// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Vigil invalidation coordinator.
//!
//! This crate provides the error type, the record and identity types, and
//! the collaborator traits (transport, storage, auth, presenter, client
//! surfaces) that the coordinator is built against. Adapters implement the
//! traits defined here.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use error::VigilError;
pub use types::{
    ClearType, Decision, Identity, InvalidationRecord, SessionContext, Subscription,
    SubscriptionHandle, Version,
};

pub use traits::{
    AuthProvider, BroadcastTransport, CookieJar, DecisionPresenter, KeyValueStore, Navigator,
    RecordSource, WorkerHost,
};
