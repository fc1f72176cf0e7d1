// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end over the SQLite change feed and SQLite-backed storage.

use std::sync::Arc;
use std::time::Duration;

use vigil_coordinator::{
    CoordinatorParts, CoordinatorSettings, InvalidationCoordinator, InvalidationEvent,
    LAST_APPLIED_VERSION_KEY, SubscriptionState,
};
use vigil_core::{
    ClearType, Identity, KeyValueStore, SessionContext, SystemClock, Version,
};
use vigil_storage::{Database, SqliteFeed, SqliteStore};
use vigil_test_utils::{
    MockAuth, MockCookieJar, MockNavigator, MockPresenter, MockWorkerHost, TEST_USER,
};

struct Setup {
    _dir: tempfile::TempDir,
    feed: Arc<SqliteFeed>,
    durable: Arc<SqliteStore>,
    session: Arc<SqliteStore>,
    navigator: Arc<MockNavigator>,
    settings: CoordinatorSettings,
    parts: CoordinatorParts,
}

async fn setup() -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vigil.db");
    let db = Database::open(path.to_str().unwrap()).await.unwrap();

    let feed = Arc::new(SqliteFeed::new(db.clone(), Duration::from_millis(20)));
    let durable = Arc::new(SqliteStore::durable(db.clone()));
    let session = Arc::new(SqliteStore::session(db));
    let navigator = Arc::new(MockNavigator::new());

    let mut settings = CoordinatorSettings::default();
    settings.executor.sign_out_delay = Duration::ZERO;

    let parts = CoordinatorParts {
        transport: feed.clone(),
        records: feed.clone(),
        auth: Arc::new(MockAuth::signed_in(TEST_USER)),
        presenter: Arc::new(MockPresenter::default()),
        durable: durable.clone(),
        session: session.clone(),
        workers: Arc::new(MockWorkerHost::with_caches(["app-shell-v1"], 1)),
        cookies: Arc::new(MockCookieJar::with_cookies(["sid"])),
        navigator: navigator.clone(),
        clock: Arc::new(SystemClock),
    };

    Setup {
        _dir: dir,
        feed,
        durable,
        session,
        navigator,
        settings,
        parts,
    }
}

fn context() -> SessionContext {
    SessionContext::new(Identity {
        user_id: TEST_USER.to_string(),
        email: None,
    })
}

async fn wait_for_state(coordinator: &InvalidationCoordinator, state: SubscriptionState) {
    let mut rx = coordinator.watch_state();
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| *s == state))
        .await
        .expect("state not reached")
        .expect("state channel closed");
}

#[tokio::test]
async fn published_record_purges_live_session() {
    let s = setup().await;
    s.session.set("draft", "unsent").await.unwrap();
    s.durable.set("theme", "dark").await.unwrap();

    let coordinator = InvalidationCoordinator::new(s.settings.clone(), s.parts.clone())
        .await
        .unwrap();
    let mut events = coordinator.on_invalidation_applied();
    coordinator.start(context()).await;
    wait_for_state(&coordinator, SubscriptionState::Subscribed).await;

    let published = s
        .feed
        .publish(
            &s.settings.table,
            ClearType::Storage,
            Some("schema change".into()),
            false,
        )
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no event")
        .unwrap();
    assert!(matches!(
        event,
        InvalidationEvent::Applied { ref version, .. } if *version == published.id
    ));

    wait_for_state(&coordinator, SubscriptionState::Closed).await;
    assert_eq!(s.feed.active_subscriptions(), 0);
    assert_eq!(s.session.get("draft").await.unwrap(), None);
    assert_eq!(s.durable.get("theme").await.unwrap(), None);
    assert_eq!(
        s.durable.get(LAST_APPLIED_VERSION_KEY).await.unwrap(),
        Some(published.id.to_string())
    );
    assert_eq!(s.navigator.redirects().await, vec!["/"]);
}

#[tokio::test]
async fn reload_does_not_purge_twice() {
    let s = setup().await;
    let published = s
        .feed
        .publish(&s.settings.table, ClearType::Full, None, false)
        .await
        .unwrap();

    // The record is fresh, so catch-up applies it.
    let first = InvalidationCoordinator::new(s.settings.clone(), s.parts.clone())
        .await
        .unwrap();
    let outcome = first.catch_up().await;
    assert!(
        matches!(outcome, vigil_coordinator::CatchUpOutcome::Delivered(_)),
        "unexpected {outcome:?}"
    );
    first.stop().await;

    // A reloaded page finds the same latest record and leaves it alone.
    let second = InvalidationCoordinator::new(s.settings.clone(), s.parts.clone())
        .await
        .unwrap();
    assert_eq!(
        second.local_state().await.last_applied_version,
        Some(Version::from(published.id.to_string()))
    );
    assert!(!matches!(
        second.catch_up().await,
        vigil_coordinator::CatchUpOutcome::Delivered(_)
    ));
    assert_eq!(s.navigator.redirects().await.len(), 1);
    second.stop().await;
}
