// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The invalidation coordinator.
//!
//! Owns the live subscription and the catch-up task for one client session,
//! decides what each delivered record means for this client, and drives the
//! presenter and the side-effect executor. A record is purged at most once,
//! deliveries that arrive while a purge is running are dropped, and a
//! record arriving right after a purge is only recorded. The presenter runs
//! outside any lock, so an open dialog never holds up other deliveries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::TimeDelta;
use strum::Display;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use vigil_config::VigilConfig;
use vigil_config::validation::is_sql_identifier;
use vigil_core::{
    AuthProvider, BroadcastTransport, Clock, CookieJar, Decision, DecisionPresenter,
    InvalidationRecord, KeyValueStore, Navigator, RecordSource, SessionContext, VigilError,
    WorkerHost,
};

use crate::backoff::BackoffPolicy;
use crate::catch_up::{CatchUpOutcome, CatchUpPolicy, RecordAge, seconds};
use crate::events::{EventBus, InvalidationEvent};
use crate::executor::{ExecutorSettings, PurgeReport, PurgeTargets, SideEffectExecutor};
use crate::presenter::FailSafePresenter;
use crate::subscription::{Dispatch, SubscriptionLoop, SubscriptionState};
use crate::version_store::{LocalInvalidationState, VersionGuard, VersionStore};

/// Why a delivered record was not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum IgnoreReason {
    /// A purge for another record is running.
    InProgress,
    AlreadyApplied,
    /// The operator deferred this skippable record earlier.
    PreviouslyDeferred,
    /// The coordinator has been stopped or the session already ended.
    Closed,
}

/// What handling one record did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    Ignored(IgnoreReason),
    /// Recorded without purging; a purge completed within the loop guard.
    Acknowledged,
    /// Skippable record deferred and remembered.
    Deferred,
    /// Purged, signed out, and redirected.
    Applied(PurgeReport),
    /// Purged, but sign-out or redirect failed. A later record may retry.
    PurgeFailed { report: PurgeReport, message: String },
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Append-only table carrying invalidation records.
    pub table: String,
    /// A record arriving this soon after a purge is only recorded.
    pub loop_guard: TimeDelta,
    pub skipped_history: usize,
    pub catch_up: CatchUpPolicy,
    pub backoff: BackoffPolicy,
    pub subscribe_timeout: Duration,
    pub executor: ExecutorSettings,
}

impl CoordinatorSettings {
    pub fn from_config(config: &VigilConfig) -> Self {
        Self {
            table: config.invalidation.table.clone(),
            loop_guard: seconds(config.invalidation.loop_guard_secs),
            skipped_history: config.invalidation.skipped_history,
            catch_up: CatchUpPolicy::from_config(&config.invalidation),
            backoff: BackoffPolicy::from_config(&config.reconnect),
            subscribe_timeout: Duration::from_millis(config.reconnect.subscribe_timeout_ms),
            executor: ExecutorSettings::from_config(config),
        }
    }

    fn check(&self) -> Result<(), VigilError> {
        if !is_sql_identifier(&self.table) {
            return Err(VigilError::Config(format!(
                "invalidation table `{}` is not a valid identifier",
                self.table
            )));
        }
        if self.skipped_history == 0 {
            return Err(VigilError::Config(
                "skipped history must hold at least one version".into(),
            ));
        }
        if self.backoff.max_attempts() == 0 {
            return Err(VigilError::Config(
                "reconnect max attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&VigilConfig::default())
    }
}

/// Collaborators injected into the coordinator.
#[derive(Clone)]
pub struct CoordinatorParts {
    pub transport: Arc<dyn BroadcastTransport>,
    pub records: Arc<dyn RecordSource>,
    pub auth: Arc<dyn AuthProvider>,
    pub presenter: Arc<dyn DecisionPresenter>,
    /// Durable storage; also holds the coordinator's bookkeeping.
    pub durable: Arc<dyn KeyValueStore>,
    pub session: Arc<dyn KeyValueStore>,
    pub workers: Arc<dyn WorkerHost>,
    pub cookies: Arc<dyn CookieJar>,
    pub navigator: Arc<dyn Navigator>,
    pub clock: Arc<dyn Clock>,
}

enum Lifecycle {
    Idle,
    Running { subscription: JoinHandle<()> },
    Stopped,
}

pub struct InvalidationCoordinator {
    inner: Arc<Inner>,
    lifecycle: Mutex<Lifecycle>,
}

struct Inner {
    settings: CoordinatorSettings,
    versions: VersionStore,
    presenter: FailSafePresenter,
    executor: SideEffectExecutor,
    transport: Arc<dyn BroadcastTransport>,
    records: Arc<dyn RecordSource>,
    auth: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    in_progress: AtomicBool,
    state: Arc<watch::Sender<SubscriptionState>>,
    events: EventBus,
    /// Cancelled by `stop()` or once a purge hands the session back to sign-in.
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl InvalidationCoordinator {
    /// Build a coordinator and load the persisted invalidation state.
    ///
    /// Fails only on invalid settings. Unreadable storage degrades to an
    /// empty in-memory state.
    pub async fn new(
        settings: CoordinatorSettings,
        parts: CoordinatorParts,
    ) -> Result<Self, VigilError> {
        settings.check()?;

        let versions = VersionStore::load(parts.durable.clone(), settings.skipped_history).await;
        let executor = SideEffectExecutor::new(
            PurgeTargets {
                workers: parts.workers,
                cookies: parts.cookies,
                durable: parts.durable,
                session: parts.session,
            },
            parts.auth.clone(),
            parts.navigator,
            settings.executor.clone(),
        );
        let (state, _) = watch::channel(SubscriptionState::Disconnected);

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                versions,
                presenter: FailSafePresenter::new(parts.presenter),
                executor,
                transport: parts.transport,
                records: parts.records,
                auth: parts.auth,
                clock: parts.clock,
                in_progress: AtomicBool::new(false),
                state: Arc::new(state),
                events: EventBus::new(),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Start live delivery and the one-shot catch-up for `context`.
    ///
    /// Idempotent while running. A stopped coordinator cannot be restarted.
    pub async fn start(&self, context: SessionContext) {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Running { .. } => {
                debug!(user_id = %context.identity.user_id, "coordinator already started");
                return;
            }
            Lifecycle::Stopped => {
                warn!("coordinator has been stopped, ignoring start");
                return;
            }
            Lifecycle::Idle => {}
        }
        if self.inner.cancel.is_cancelled() {
            warn!("session already ended, ignoring start");
            return;
        }

        match self.inner.auth.current_session().await {
            Ok(Some(identity)) if identity.user_id != context.identity.user_id => {
                warn!(
                    expected = %context.identity.user_id,
                    current = %identity.user_id,
                    "session context does not match the signed-in user"
                );
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                info!("no authenticated session, coordinator not started");
                return;
            }
            Err(e) => warn!(error = %e, "session lookup failed, starting anyway"),
        }

        info!(
            user_id = %context.identity.user_id,
            table = %self.inner.settings.table,
            "starting invalidation coordinator"
        );

        let subscription = SubscriptionLoop {
            transport: self.inner.transport.clone(),
            table: self.inner.settings.table.clone(),
            policy: self.inner.settings.backoff.clone(),
            subscribe_timeout: self.inner.settings.subscribe_timeout,
            state: self.inner.state.clone(),
            cancel: self.inner.cancel.clone(),
        };
        let handler = self.inner.clone();
        let dispatch: Dispatch = Arc::new(move |record: InvalidationRecord| {
            let inner = handler.clone();
            handler.tasks.spawn(async move {
                inner.handle_record(record).await;
            });
        });
        let subscription = tokio::spawn(subscription.run(dispatch));

        let inner = self.inner.clone();
        self.inner.tasks.spawn(async move {
            let outcome = inner.catch_up().await;
            debug!(?outcome, "catch-up finished");
        });

        *lifecycle = Lifecycle::Running { subscription };
    }

    /// Tear down the subscription, wait for the transport to confirm, and
    /// wait for in-flight handlers. No handler starts afterwards.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        self.inner.cancel.cancel();

        if let Lifecycle::Running { subscription } = previous {
            if let Err(e) = subscription.await {
                warn!(error = %e, "subscription task ended abnormally");
            }
            info!("invalidation coordinator stopped");
        }

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.state.send_replace(SubscriptionState::Closed);
    }

    /// Handle one record exactly as a live delivery would.
    pub async fn handle_record(&self, record: InvalidationRecord) -> HandleOutcome {
        self.inner.handle_record(record).await
    }

    /// Run the catch-up query now and report what it did.
    pub async fn catch_up(&self) -> CatchUpOutcome {
        self.inner.catch_up().await
    }

    pub fn state(&self) -> SubscriptionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.inner.state.subscribe()
    }

    /// Listen for handled invalidations.
    pub fn on_invalidation_applied(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.inner.events.subscribe()
    }

    pub async fn local_state(&self) -> LocalInvalidationState {
        self.inner.versions.snapshot().await
    }

    /// True once a read or write of the bookkeeping storage has failed.
    pub fn is_degraded(&self) -> bool {
        self.inner.versions.is_degraded()
    }

    pub fn is_in_progress(&self) -> bool {
        self.inner.in_progress.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.inner.settings
    }
}

impl Inner {
    async fn handle_record(&self, record: InvalidationRecord) -> HandleOutcome {
        if self.cancel.is_cancelled() {
            debug!(version = %record.id, "coordinator closed, ignoring");
            return HandleOutcome::Ignored(IgnoreReason::Closed);
        }

        {
            let mut versions = self.versions.lock().await;
            if let Some(outcome) = self.screen(&mut versions, &record).await {
                return outcome;
            }
        }

        let decision = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(version = %record.id, "stopped while presenting, ignoring");
                return HandleOutcome::Ignored(IgnoreReason::Closed);
            }
            decision = self.presenter.present(&record) => decision,
        };

        if decision == Decision::Defer {
            self.versions.lock().await.record_skipped(&record.id).await;
            info!(version = %record.id, "invalidation deferred");
            self.events.emit(InvalidationEvent::Deferred {
                version: record.id.clone(),
            });
            return HandleOutcome::Deferred;
        }

        // Other deliveries may have been handled while the presenter was
        // open, so the checks run again under the same lock as the write.
        let claim = {
            let mut versions = self.versions.lock().await;
            if self.cancel.is_cancelled() {
                debug!(version = %record.id, "session ended while presenting, ignoring");
                return HandleOutcome::Ignored(IgnoreReason::Closed);
            }
            if let Some(outcome) = self.screen(&mut versions, &record).await {
                return outcome;
            }
            let Some(claim) = InProgressClaim::acquire(&self.in_progress) else {
                debug!(version = %record.id, "another invalidation is in progress, ignoring");
                return HandleOutcome::Ignored(IgnoreReason::InProgress);
            };
            // Recorded before any side effect so a reload mid-purge cannot loop.
            versions.record_applied(&record.id, self.clock.now()).await;
            claim
        };

        info!(
            version = %record.id,
            clear_type = %record.clear_type,
            reason = record.reason.as_deref().unwrap_or(""),
            "applying invalidation"
        );
        let report = self.executor.purge(record.clear_type).await;

        match self.executor.sign_out_and_redirect().await {
            Ok(()) => {
                claim.retain();
                self.events.emit(InvalidationEvent::Applied {
                    version: record.id.clone(),
                    clear_type: record.clear_type,
                    report: report.clone(),
                });
                // Equivalent to the page unloading: this session is over.
                self.cancel.cancel();
                HandleOutcome::Applied(report)
            }
            Err(e) => {
                error!(version = %record.id, error = %e, "sign-out after purge failed");
                let message = e.to_string();
                self.events.emit(InvalidationEvent::PurgeFailed {
                    version: record.id.clone(),
                    message: message.clone(),
                });
                HandleOutcome::PurgeFailed { report, message }
            }
        }
    }

    /// Checks that end handling before any purge. Returns `None` when the
    /// record still needs a decision or a purge.
    async fn screen(
        &self,
        versions: &mut VersionGuard<'_>,
        record: &InvalidationRecord,
    ) -> Option<HandleOutcome> {
        if self.in_progress.load(Ordering::Acquire) {
            debug!(version = %record.id, "another invalidation is in progress, ignoring");
            return Some(HandleOutcome::Ignored(IgnoreReason::InProgress));
        }
        let state = versions.state();
        if state.last_applied_version.as_ref() == Some(&record.id) {
            debug!(version = %record.id, "already applied, ignoring");
            return Some(HandleOutcome::Ignored(IgnoreReason::AlreadyApplied));
        }
        if record.is_skippable && state.skipped_versions.contains(&record.id) {
            debug!(version = %record.id, "previously deferred, ignoring");
            return Some(HandleOutcome::Ignored(IgnoreReason::PreviouslyDeferred));
        }
        let now = self.clock.now();
        let recently_purged = state
            .last_applied_at
            .is_some_and(|at| now.signed_duration_since(at) < self.settings.loop_guard);
        if recently_purged {
            versions.advance_version(&record.id).await;
            info!(version = %record.id, "purge completed moments ago, recording without purging");
            self.events.emit(InvalidationEvent::Acknowledged {
                version: record.id.clone(),
            });
            return Some(HandleOutcome::Acknowledged);
        }
        None
    }

    async fn catch_up(&self) -> CatchUpOutcome {
        if self.cancel.is_cancelled() {
            return CatchUpOutcome::Cancelled;
        }

        let observed = {
            let versions = self.versions.lock().await;
            let state = versions.state();
            if self
                .settings
                .catch_up
                .should_skip(state.last_applied_at, self.clock.now())
            {
                debug!("purge completed recently, skipping catch-up");
                return CatchUpOutcome::SkippedRecentPurge;
            }
            state.last_applied_version.clone()
        };

        let latest = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return CatchUpOutcome::Cancelled,
            latest = self.records.query_latest(&self.settings.table) => latest,
        };
        let record = match latest {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("no invalidations published yet");
                return CatchUpOutcome::NoRecords;
            }
            Err(e) => {
                warn!(error = %e, "catch-up query failed");
                return CatchUpOutcome::QueryFailed(e.to_string());
            }
        };

        let now = self.clock.now();
        match self.settings.catch_up.classify(&record, observed.as_ref(), now) {
            RecordAge::AlreadyApplied => {
                debug!(version = %record.id, "latest invalidation already applied");
                CatchUpOutcome::AlreadyApplied
            }
            RecordAge::Stale => {
                let mut versions = self.versions.lock().await;
                if versions
                    .advance_if_unchanged(observed.as_ref(), &record.id)
                    .await
                {
                    info!(
                        version = %record.id,
                        age_secs = now.signed_duration_since(record.created_at).num_seconds(),
                        "latest invalidation predates this session, recorded without purging"
                    );
                    self.events.emit(InvalidationEvent::SilentlyAdvanced {
                        version: record.id.clone(),
                    });
                    CatchUpOutcome::SilentlyAdvanced(record.id)
                } else {
                    debug!(version = %record.id, "local version moved during catch-up");
                    CatchUpOutcome::Superseded
                }
            }
            RecordAge::Fresh => {
                info!(version = %record.id, "catch-up found a recent invalidation");
                CatchUpOutcome::Delivered(self.handle_record(record).await)
            }
        }
    }
}

/// Holds the `in_progress` flag; dropping releases it unless retained.
struct InProgressClaim<'a> {
    flag: &'a AtomicBool,
    retained: bool,
}

impl<'a> InProgressClaim<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag,
                retained: false,
            })
    }

    /// Keep the flag set after this claim is dropped.
    fn retain(mut self) {
        self.retained = true;
    }
}

impl Drop for InProgressClaim<'_> {
    fn drop(&mut self) {
        if !self.retained {
            self.flag.store(false, Ordering::Release);
        }
    }
}
