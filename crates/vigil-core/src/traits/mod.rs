// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator trait definitions consumed by the coordinator.
//!
//! Everything the coordinator touches outside its own memory goes through
//! one of these seams. All async traits use `#[async_trait]` for dynamic
//! dispatch compatibility.

pub mod auth;
pub mod client;
pub mod presenter;
pub mod storage;
pub mod transport;

pub use auth::AuthProvider;
pub use client::{CookieJar, Navigator, WorkerHost};
pub use presenter::DecisionPresenter;
pub use storage::KeyValueStore;
pub use transport::{BroadcastTransport, RecordSource};
