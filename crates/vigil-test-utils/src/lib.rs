// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Vigil integration tests.
//!
//! Provides deterministic mocks of every coordinator collaborator and a
//! harness that wires them into an [`InvalidationCoordinator`](vigil_coordinator::InvalidationCoordinator).
//!
//! # Components
//!
//! - [`MockTransport`] - Change feed with injectable inserts, closes, and subscribe failures
//! - [`MockRecordSource`] - Scripted result for the catch-up query
//! - [`MockAuth`], [`MockPresenter`], [`MockNavigator`] - Session, operator, and navigation seams
//! - [`MockWorkerHost`], [`MockCookieJar`] - Purge targets with captured state
//! - [`FlakyStore`] - Key/value store whose writes or key listing can be made to fail
//! - [`ManualClock`] - Wall clock that only moves when told to

pub mod clock;
pub mod harness;
pub mod mock_client;
pub mod mock_feed;
pub mod mock_session;
pub mod store;

pub use clock::ManualClock;
pub use harness::{TEST_USER, TestHarness, TestHarnessBuilder, record};
pub use mock_client::{MockCookieJar, MockNavigator, MockWorkerHost};
pub use mock_feed::{MockRecordSource, MockTransport};
pub use mock_session::{MockAuth, MockPresenter};
pub use store::FlakyStore;
