// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live delivery semantics: idempotency, exclusivity, deferral, loop guard,
//! and the purge itself.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, TimeDelta, TimeZone, Utc};
use vigil_coordinator::{
    HandleOutcome, IgnoreReason, InvalidationCoordinator, InvalidationEvent, LAST_APPLIED_AT_KEY,
    LAST_APPLIED_VERSION_KEY, PurgeStep, SKIPPED_VERSIONS_KEY,
};
use vigil_core::{ClearType, Clock, Decision, KeyValueStore, Version, VigilError, WorkerHost};
use vigil_test_utils::{
    FlakyStore, MockCookieJar, MockNavigator, MockPresenter, MockWorkerHost, TestHarness,
};

fn v(id: &str) -> Version {
    Version::from(id)
}

async fn harness() -> TestHarness {
    TestHarness::builder().build().await.unwrap()
}

async fn purges(h: &TestHarness) -> usize {
    h.auth.sign_out_count().await
}

async fn wait_for_open_dialogs(h: &TestHarness, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.presenter.choices().await.len() < n {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("choice dialog never opened");
}

#[tokio::test]
async fn same_record_twice_purges_once() {
    let h = harness().await;
    let record = h.record("v2", ClearType::Full, false);

    let first = h.coordinator.handle_record(record.clone()).await;
    assert!(matches!(first, HandleOutcome::Applied(_)));

    // The same page keeps receiving the replay, and so does the next page load.
    let again = h.coordinator.handle_record(record.clone()).await;
    assert!(matches!(again, HandleOutcome::Ignored(_)));

    let reloaded = h.reload().await.unwrap();
    assert_eq!(
        reloaded.handle_record(record).await,
        HandleOutcome::Ignored(IgnoreReason::AlreadyApplied)
    );

    assert_eq!(purges(&h).await, 1);
    assert_eq!(h.navigator.redirects().await, vec!["/"]);
}

#[tokio::test]
async fn already_applied_version_is_ignored_without_ui() {
    let durable = FlakyStore::with_entries([(LAST_APPLIED_VERSION_KEY, "v7")]);
    let h = TestHarness::builder().with_durable(durable).build().await.unwrap();

    let outcome = h
        .coordinator
        .handle_record(h.record("v7", ClearType::Full, false))
        .await;

    assert_eq!(outcome, HandleOutcome::Ignored(IgnoreReason::AlreadyApplied));
    assert!(h.presenter.notices().await.is_empty());
    assert_eq!(purges(&h).await, 0);
}

#[tokio::test]
async fn second_record_during_purge_is_ignored() {
    let h = TestHarness::builder()
        .with_navigator(MockNavigator::gated())
        .build()
        .await
        .unwrap();

    let coordinator = h.coordinator.clone();
    let first = h.record("v2", ClearType::Full, false);
    let purge = tokio::spawn(async move { coordinator.handle_record(first).await });

    // Sign-out happens right before the gated redirect.
    tokio::time::timeout(Duration::from_secs(5), async {
        while purges(&h).await == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("first purge never reached sign-out");
    assert!(h.coordinator.is_in_progress());

    let second = h
        .coordinator
        .handle_record(h.record("v3", ClearType::Storage, false))
        .await;
    assert_eq!(second, HandleOutcome::Ignored(IgnoreReason::InProgress));

    h.navigator.release(1);
    assert!(matches!(purge.await.unwrap(), HandleOutcome::Applied(_)));
    assert_eq!(purges(&h).await, 1);
    assert_eq!(h.presenter.notices().await.len(), 1);
    assert_eq!(
        h.coordinator.local_state().await.last_applied_version,
        Some(v("v2"))
    );
}

#[tokio::test]
async fn forced_record_during_open_dialog_is_applied() {
    let h = TestHarness::builder()
        .with_presenter(MockPresenter::gated(Decision::Defer))
        .build()
        .await
        .unwrap();

    let coordinator = h.coordinator.clone();
    let optional = h.record("v1", ClearType::ServiceWorker, true);
    let dialog = tokio::spawn(async move { coordinator.handle_record(optional).await });
    wait_for_open_dialogs(&h, 1).await;
    assert!(!h.coordinator.is_in_progress());

    let forced = h
        .coordinator
        .handle_record(h.record("v2", ClearType::Full, false))
        .await;
    assert!(matches!(forced, HandleOutcome::Applied(_)));

    // The purge ended the session; the dialog's answer is moot.
    h.presenter.release(1);
    assert_eq!(
        dialog.await.unwrap(),
        HandleOutcome::Ignored(IgnoreReason::Closed)
    );
    assert_eq!(purges(&h).await, 1);

    let state = h.coordinator.local_state().await;
    assert_eq!(state.last_applied_version, Some(v("v2")));
    assert!(!state.skipped_versions.contains(&v("v1")));

    h.clock.advance(TimeDelta::minutes(3));
    let next_session = h.reload().await.unwrap();
    assert_eq!(
        next_session
            .handle_record(h.record("v2", ClearType::Full, false))
            .await,
        HandleOutcome::Ignored(IgnoreReason::AlreadyApplied)
    );
    assert_eq!(purges(&h).await, 1);
}

#[tokio::test]
async fn accepted_dialog_rechecks_state_before_purging() {
    let h = TestHarness::builder()
        .with_presenter(MockPresenter::gated(Decision::Accept))
        .build()
        .await
        .unwrap();
    h.auth.fail_sign_out(true).await;

    let coordinator = h.coordinator.clone();
    let optional = h.record("v1", ClearType::Storage, true);
    let dialog = tokio::spawn(async move { coordinator.handle_record(optional).await });
    wait_for_open_dialogs(&h, 1).await;

    let forced = h
        .coordinator
        .handle_record(h.record("v2", ClearType::Full, false))
        .await;
    assert!(matches!(forced, HandleOutcome::PurgeFailed { .. }));

    // v2 was purged moments ago, so accepting v1 only records it.
    h.presenter.release(1);
    assert_eq!(dialog.await.unwrap(), HandleOutcome::Acknowledged);
    assert_eq!(
        h.coordinator.local_state().await.last_applied_version,
        Some(v("v1"))
    );
    assert!(!h.coordinator.is_in_progress());
    assert_eq!(h.workers.notifications().await, 1);
}

#[tokio::test]
async fn concurrent_forced_records_purge_once() {
    let h = harness().await;

    let (first, second) = tokio::join!(
        h.coordinator
            .handle_record(h.record("v2", ClearType::Storage, false)),
        h.coordinator
            .handle_record(h.record("v3", ClearType::Storage, false)),
    );

    let outcomes = [first, second];
    let applied = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, HandleOutcome::Applied(_)))
        .count();
    assert_eq!(applied, 1, "outcomes: {outcomes:?}");
    assert!(outcomes.iter().any(|outcome| matches!(
        outcome,
        HandleOutcome::Ignored(IgnoreReason::InProgress | IgnoreReason::Closed)
    )));
    assert_eq!(purges(&h).await, 1);
    assert_eq!(h.navigator.redirects().await, vec!["/"]);
}

#[tokio::test]
async fn deferred_record_is_not_offered_again() {
    let h = TestHarness::builder()
        .with_answer(Decision::Defer)
        .build()
        .await
        .unwrap();
    let mut events = h.events();
    let record = h.record("v3", ClearType::Full, true);

    assert_eq!(
        h.coordinator.handle_record(record.clone()).await,
        HandleOutcome::Deferred
    );
    assert_eq!(
        events.recv().await.unwrap(),
        InvalidationEvent::Deferred { version: v("v3") }
    );

    let state = h.coordinator.local_state().await;
    assert!(state.skipped_versions.contains(&v("v3")));
    assert_eq!(state.last_applied_version, None);
    assert_eq!(
        h.durable.snapshot().await[SKIPPED_VERSIONS_KEY],
        r#"["v3"]"#
    );

    assert_eq!(
        h.coordinator.handle_record(record.clone()).await,
        HandleOutcome::Ignored(IgnoreReason::PreviouslyDeferred)
    );
    let reloaded = h.reload().await.unwrap();
    assert_eq!(
        reloaded.handle_record(record).await,
        HandleOutcome::Ignored(IgnoreReason::PreviouslyDeferred)
    );

    assert_eq!(h.presenter.choices().await.len(), 1);
    assert_eq!(purges(&h).await, 0);
}

#[tokio::test]
async fn deferral_only_applies_to_skippable_records() {
    let durable = FlakyStore::with_entries([(SKIPPED_VERSIONS_KEY, r#"["v3"]"#)]);
    let h = TestHarness::builder().with_durable(durable).build().await.unwrap();

    let outcome = h
        .coordinator
        .handle_record(h.record("v3", ClearType::Full, false))
        .await;
    assert!(matches!(outcome, HandleOutcome::Applied(_)));
}

#[tokio::test]
async fn accepted_skippable_record_purges() {
    let h = TestHarness::builder()
        .with_answer(Decision::Accept)
        .build()
        .await
        .unwrap();

    let outcome = h
        .coordinator
        .handle_record(h.record("v4", ClearType::Storage, true))
        .await;

    assert!(matches!(outcome, HandleOutcome::Applied(_)));
    assert_eq!(h.presenter.choices().await.len(), 1);
    assert!(h.presenter.notices().await.is_empty());
    assert_eq!(purges(&h).await, 1);
}

#[tokio::test]
async fn loop_guard_records_without_purging() {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
    let five_seconds_ago =
        (start - TimeDelta::seconds(5)).to_rfc3339_opts(SecondsFormat::Millis, true);
    let durable = FlakyStore::with_entries([
        (LAST_APPLIED_VERSION_KEY, "v1".to_string()),
        (LAST_APPLIED_AT_KEY, five_seconds_ago.clone()),
    ]);
    let h = TestHarness::builder()
        .starting_at(start)
        .with_durable(durable)
        .build()
        .await
        .unwrap();
    let mut events = h.events();

    let outcome = h
        .coordinator
        .handle_record(h.record("v2", ClearType::Full, false))
        .await;

    assert_eq!(outcome, HandleOutcome::Acknowledged);
    assert_eq!(
        events.recv().await.unwrap(),
        InvalidationEvent::Acknowledged { version: v("v2") }
    );
    let persisted = h.durable.snapshot().await;
    assert_eq!(persisted[LAST_APPLIED_VERSION_KEY], "v2");
    assert_eq!(persisted[LAST_APPLIED_AT_KEY], five_seconds_ago);
    assert!(h.presenter.notices().await.is_empty());
    assert_eq!(purges(&h).await, 0);
    assert!(!h.coordinator.is_in_progress());
}

#[tokio::test]
async fn loop_guard_expires() {
    let h = harness().await;
    let at = (h.clock.now() - TimeDelta::seconds(31)).to_rfc3339_opts(SecondsFormat::Millis, true);
    h.durable.set(LAST_APPLIED_AT_KEY, &at).await.unwrap();
    let coordinator = h.reload().await.unwrap();

    let outcome = coordinator
        .handle_record(h.record("v2", ClearType::ServiceWorker, false))
        .await;
    assert!(matches!(outcome, HandleOutcome::Applied(_)));
}

#[tokio::test]
async fn storage_purge_preserves_bookkeeping_and_impersonation() {
    let durable = FlakyStore::with_entries([
        (LAST_APPLIED_VERSION_KEY, "v1"),
        (LAST_APPLIED_AT_KEY, "2026-02-01T08:00:00.000Z"),
        (SKIPPED_VERSIONS_KEY, r#"["v0"]"#),
        ("original_user", "admin-7"),
        ("audit.filters", r#"{"site":"north"}"#),
        ("audit.draft", "unsaved"),
    ]);
    let session = FlakyStore::with_entries([("wizard.step", "3"), ("scroll", "120")]);
    let h = TestHarness::builder()
        .with_durable(durable)
        .with_session(session)
        .build()
        .await
        .unwrap();

    let outcome = h
        .coordinator
        .handle_record(h.record("v2", ClearType::Storage, false))
        .await;
    let HandleOutcome::Applied(report) = outcome else {
        panic!("expected purge, got {outcome:?}");
    };
    assert_eq!(
        report.steps(),
        vec![PurgeStep::ClearDurableStorage, PurgeStep::ClearSessionStorage]
    );
    assert!(report.is_complete());

    let durable = h.durable.snapshot().await;
    let keys: Vec<_> = durable.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec![
            "original_user",
            LAST_APPLIED_AT_KEY,
            LAST_APPLIED_VERSION_KEY,
            SKIPPED_VERSIONS_KEY
        ]
    );
    assert_eq!(durable[LAST_APPLIED_VERSION_KEY], "v2");
    assert_eq!(
        durable[LAST_APPLIED_AT_KEY],
        h.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true)
    );
    assert_eq!(durable[SKIPPED_VERSIONS_KEY], r#"["v0"]"#);
    assert_eq!(durable["original_user"], "admin-7");
    assert!(h.session.snapshot().await.is_empty());

    // Storage scope leaves workers and cookies alone.
    assert_eq!(h.workers.notifications().await, 0);
}

#[tokio::test]
async fn storage_purge_without_key_listing_restores_allow_list() {
    let durable = FlakyStore::with_entries([
        ("original_user", "admin-7"),
        ("audit.draft", "unsaved"),
    ]);
    durable.fail_keys(true);
    let h = TestHarness::builder().with_durable(durable).build().await.unwrap();

    let outcome = h
        .coordinator
        .handle_record(h.record("v2", ClearType::Storage, false))
        .await;
    assert!(matches!(outcome, HandleOutcome::Applied(_)));

    let durable = h.durable.snapshot().await;
    assert_eq!(durable.get("original_user").map(String::as_str), Some("admin-7"));
    assert_eq!(durable.get(LAST_APPLIED_VERSION_KEY).map(String::as_str), Some("v2"));
    assert!(!durable.contains_key("audit.draft"));
}

/// Reads the bookkeeping key at the moment the first purge step runs.
struct ObservingWorkers {
    inner: MockWorkerHost,
    durable: Arc<FlakyStore>,
    seen: StdMutex<Option<Option<String>>>,
}

#[async_trait]
impl WorkerHost for ObservingWorkers {
    async fn cache_names(&self) -> Result<Vec<String>, VigilError> {
        let current = self.durable.get(LAST_APPLIED_VERSION_KEY).await?;
        *self.seen.lock().unwrap() = Some(current);
        self.inner.cache_names().await
    }

    async fn delete_cache(&self, name: &str) -> Result<(), VigilError> {
        self.inner.delete_cache(name).await
    }

    async fn unregister_workers(&self) -> Result<usize, VigilError> {
        self.inner.unregister_workers().await
    }

    async fn notify_clear(&self) -> Result<(), VigilError> {
        self.inner.notify_clear().await
    }
}

#[tokio::test]
async fn forced_full_clear() {
    let h = TestHarness::builder()
        .with_durable(FlakyStore::with_entries([
            (LAST_APPLIED_VERSION_KEY, "v1"),
            ("audit.filters", "{}"),
        ]))
        .with_session(FlakyStore::with_entries([("wizard.step", "2")]))
        .with_cookies(MockCookieJar::with_cookies(["sb-access-token", "theme"]))
        .build()
        .await
        .unwrap();

    let workers = Arc::new(ObservingWorkers {
        inner: MockWorkerHost::with_caches(["api-v1", "static-assets"], 2),
        durable: h.durable.clone(),
        seen: StdMutex::new(None),
    });
    let mut parts = h.parts();
    parts.workers = workers.clone();
    let coordinator = InvalidationCoordinator::new(h.settings(), parts).await.unwrap();
    let mut events = coordinator.on_invalidation_applied();

    let record = h.record("v2", ClearType::Full, false);
    let outcome = coordinator.handle_record(record.clone()).await;

    let HandleOutcome::Applied(report) = outcome else {
        panic!("expected purge, got {outcome:?}");
    };
    assert!(report.is_complete());
    assert_eq!(report.outcome(PurgeStep::DeleteWorkerCaches).unwrap().affected, 2);
    assert_eq!(report.outcome(PurgeStep::UnregisterWorkers).unwrap().affected, 2);
    assert_eq!(report.outcome(PurgeStep::ClearCookies).unwrap().affected, 2);

    assert_eq!(h.presenter.notices().await, vec![record]);
    assert_eq!(*workers.seen.lock().unwrap(), Some(Some("v2".to_string())));

    assert!(workers.inner.caches().await.is_empty());
    assert_eq!(workers.inner.registered_workers().await, 0);
    assert_eq!(workers.inner.notifications().await, 1);
    assert!(h.cookies.cookies().await.is_empty());
    assert!(!h.durable.snapshot().await.contains_key("audit.filters"));
    assert!(h.session.snapshot().await.is_empty());

    assert!(!h.auth.is_signed_in().await);
    assert_eq!(h.navigator.redirects().await, vec!["/"]);

    match events.recv().await.unwrap() {
        InvalidationEvent::Applied {
            version,
            clear_type,
            ..
        } => {
            assert_eq!(version, v("v2"));
            assert_eq!(clear_type, ClearType::Full);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // The session is over; the in-progress flag stays set.
    assert!(coordinator.is_in_progress());
}

#[tokio::test]
async fn service_worker_scope_leaves_storage() {
    let h = TestHarness::builder()
        .with_workers(MockWorkerHost::with_caches(["api-v1"], 1))
        .with_durable(FlakyStore::with_entries([("audit.filters", "{}")]))
        .with_cookies(MockCookieJar::with_cookies(["theme"]))
        .build()
        .await
        .unwrap();

    let outcome = h
        .coordinator
        .handle_record(h.record("v2", ClearType::ServiceWorker, false))
        .await;
    let HandleOutcome::Applied(report) = outcome else {
        panic!("expected purge, got {outcome:?}");
    };
    assert_eq!(
        report.steps(),
        vec![
            PurgeStep::DeleteWorkerCaches,
            PurgeStep::UnregisterWorkers,
            PurgeStep::NotifyWorkers
        ]
    );
    assert!(h.workers.caches().await.is_empty());
    assert!(h.durable.snapshot().await.contains_key("audit.filters"));
    assert_eq!(h.cookies.cookies().await, vec!["theme"]);
}

#[tokio::test]
async fn failed_purge_step_does_not_stop_the_rest() {
    let workers = MockWorkerHost::with_caches(["api-v1"], 1);
    workers.fail_notify(true).await;
    let h = TestHarness::builder()
        .with_workers(workers)
        .with_cookies(MockCookieJar::with_cookies(["theme"]))
        .build()
        .await
        .unwrap();

    let outcome = h
        .coordinator
        .handle_record(h.record("v2", ClearType::Full, false))
        .await;
    let HandleOutcome::Applied(report) = outcome else {
        panic!("expected purge, got {outcome:?}");
    };
    assert_eq!(report.failed_steps(), vec![PurgeStep::NotifyWorkers]);
    assert!(h.cookies.cookies().await.is_empty());
    assert_eq!(purges(&h).await, 1);
}
