// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness wiring every mock into an [`InvalidationCoordinator`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::broadcast;
use vigil_config::VigilConfig;
use vigil_coordinator::{
    CoordinatorParts, CoordinatorSettings, InvalidationCoordinator, InvalidationEvent,
    SubscriptionState,
};
use vigil_core::{
    ClearType, Decision, Identity, InvalidationRecord, SessionContext, VigilError, Version,
};

use crate::clock::ManualClock;
use crate::mock_client::{MockCookieJar, MockNavigator, MockWorkerHost};
use crate::mock_feed::{MockRecordSource, MockTransport};
use crate::mock_session::{MockAuth, MockPresenter};
use crate::store::FlakyStore;

pub const TEST_USER: &str = "user-1";

/// Build an invalidation record.
pub fn record(
    id: &str,
    clear_type: ClearType,
    is_skippable: bool,
    created_at: DateTime<Utc>,
) -> InvalidationRecord {
    InvalidationRecord {
        id: Version::from(id),
        reason: Some(format!("test invalidation {id}")),
        clear_type,
        is_skippable,
        created_at,
    }
}

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    config: VigilConfig,
    durable: FlakyStore,
    session: FlakyStore,
    presenter: MockPresenter,
    records: MockRecordSource,
    navigator: MockNavigator,
    workers: MockWorkerHost,
    cookies: MockCookieJar,
    auth: MockAuth,
    start: DateTime<Utc>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = VigilConfig::default();
        config.client.sign_out_delay_ms = 0;
        config.reconnect.base_delay_ms = 100;
        config.reconnect.subscribe_timeout_ms = 1_000;

        Self {
            config,
            durable: FlakyStore::new(),
            session: FlakyStore::new(),
            presenter: MockPresenter::default(),
            records: MockRecordSource::new(),
            navigator: MockNavigator::new(),
            workers: MockWorkerHost::new(),
            cookies: MockCookieJar::default(),
            auth: MockAuth::signed_in(TEST_USER),
            start: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap_or_default(),
        }
    }

    /// Adjust the configuration the coordinator settings are derived from.
    pub fn with_config(mut self, adjust: impl FnOnce(&mut VigilConfig)) -> Self {
        adjust(&mut self.config);
        self
    }

    pub fn with_durable(mut self, store: FlakyStore) -> Self {
        self.durable = store;
        self
    }

    pub fn with_session(mut self, store: FlakyStore) -> Self {
        self.session = store;
        self
    }

    pub fn with_answer(mut self, answer: Decision) -> Self {
        self.presenter = MockPresenter::answering(answer);
        self
    }

    pub fn with_presenter(mut self, presenter: MockPresenter) -> Self {
        self.presenter = presenter;
        self
    }

    pub fn with_records(mut self, records: MockRecordSource) -> Self {
        self.records = records;
        self
    }

    pub fn with_navigator(mut self, navigator: MockNavigator) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn with_workers(mut self, workers: MockWorkerHost) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_cookies(mut self, cookies: MockCookieJar) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_auth(mut self, auth: MockAuth) -> Self {
        self.auth = auth;
        self
    }

    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.start = start;
        self
    }

    pub async fn build(self) -> Result<TestHarness, VigilError> {
        let transport = Arc::new(MockTransport::new());
        let records = Arc::new(self.records);
        let auth = Arc::new(self.auth);
        let presenter = Arc::new(self.presenter);
        let durable = Arc::new(self.durable);
        let session = Arc::new(self.session);
        let workers = Arc::new(self.workers);
        let cookies = Arc::new(self.cookies);
        let navigator = Arc::new(self.navigator);
        let clock = Arc::new(ManualClock::new(self.start));

        let parts = CoordinatorParts {
            transport: transport.clone(),
            records: records.clone(),
            auth: auth.clone(),
            presenter: presenter.clone(),
            durable: durable.clone(),
            session: session.clone(),
            workers: workers.clone(),
            cookies: cookies.clone(),
            navigator: navigator.clone(),
            clock: clock.clone(),
        };
        let settings = CoordinatorSettings::from_config(&self.config);
        let coordinator =
            Arc::new(InvalidationCoordinator::new(settings.clone(), parts.clone()).await?);

        Ok(TestHarness {
            transport,
            records,
            auth,
            presenter,
            durable,
            session,
            workers,
            cookies,
            navigator,
            clock,
            coordinator,
            settings,
            parts,
        })
    }
}

/// A coordinator plus handles to every mock it was built with.
pub struct TestHarness {
    pub transport: Arc<MockTransport>,
    pub records: Arc<MockRecordSource>,
    pub auth: Arc<MockAuth>,
    pub presenter: Arc<MockPresenter>,
    pub durable: Arc<FlakyStore>,
    pub session: Arc<FlakyStore>,
    pub workers: Arc<MockWorkerHost>,
    pub cookies: Arc<MockCookieJar>,
    pub navigator: Arc<MockNavigator>,
    pub clock: Arc<ManualClock>,
    pub coordinator: Arc<InvalidationCoordinator>,
    settings: CoordinatorSettings,
    parts: CoordinatorParts,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn settings(&self) -> CoordinatorSettings {
        self.settings.clone()
    }

    /// The collaborators the coordinator was built with, for building a
    /// second coordinator over the same state (a page reload).
    pub fn parts(&self) -> CoordinatorParts {
        self.parts.clone()
    }

    pub async fn reload(&self) -> Result<InvalidationCoordinator, VigilError> {
        InvalidationCoordinator::new(self.settings(), self.parts()).await
    }

    pub fn context(&self) -> SessionContext {
        SessionContext::new(Identity {
            user_id: TEST_USER.to_string(),
            email: None,
        })
    }

    /// A record published at the harness clock's current time.
    pub fn record(&self, id: &str, clear_type: ClearType, is_skippable: bool) -> InvalidationRecord {
        use vigil_core::Clock;
        record(id, clear_type, is_skippable, self.clock.now())
    }

    pub fn events(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.coordinator.on_invalidation_applied()
    }

    /// Wait until the subscription reaches `state`.
    pub async fn wait_for_state(&self, state: SubscriptionState) -> Result<(), VigilError> {
        let mut rx = self.coordinator.watch_state();
        let timeout = Duration::from_secs(30);
        tokio::time::timeout(timeout, rx.wait_for(|current| *current == state))
            .await
            .map_err(|_| VigilError::Timeout { duration: timeout })?
            .map_err(|_| VigilError::Internal("state channel closed".into()))?;
        Ok(())
    }
}
