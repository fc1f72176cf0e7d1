// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription lifecycle: backoff, exhaustion, transport closes, and teardown.
//!
//! Runs on a paused clock so backoff delays elapse instantly.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use vigil_coordinator::{HandleOutcome, IgnoreReason, InvalidationEvent, SubscriptionState};
use vigil_core::{ClearType, Decision, SubscriptionHandle, Version};
use vigil_test_utils::{MockAuth, TestHarness};

async fn harness() -> TestHarness {
    TestHarness::builder().build().await.unwrap()
}

async fn next_event(rx: &mut broadcast::Receiver<InvalidationEvent>) -> InvalidationEvent {
    tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("no event within 30s")
        .expect("event channel closed")
}

async fn wait_for_subscribe_calls(h: &TestHarness, n: usize) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while h.transport.subscribe_calls().await < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("subscribe was not called often enough");
}

#[tokio::test(start_paused = true)]
async fn retries_with_exponential_backoff() {
    let h = harness().await;
    h.transport.fail_next_subscribes(2).await;
    let started = Instant::now();

    h.coordinator.start(h.context()).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();

    assert_eq!(h.transport.subscribe_calls().await, 3);
    // 100ms, then 200ms.
    assert!(started.elapsed() >= Duration::from_millis(300));
    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let h = harness().await;
    h.transport.fail_next_subscribes(100).await;

    h.coordinator.start(h.context()).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    // One initial attempt plus three retries.
    assert_eq!(h.transport.subscribe_calls().await, 4);
    assert_eq!(h.coordinator.state(), SubscriptionState::Disconnected);

    h.coordinator.stop().await;
    assert_eq!(h.coordinator.state(), SubscriptionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn retry_count_resets_after_success() {
    let h = harness().await;
    h.transport.fail_next_subscribes(3).await;
    h.coordinator.start(h.context()).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();

    // A fresh budget of three retries after the transport drops us.
    h.transport.fail_next_subscribes(3).await;
    h.transport.close_all().await;
    wait_for_subscribe_calls(&h, 8).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();

    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn hung_subscribe_times_out_into_backoff() {
    let h = harness().await;
    h.transport.hang_next_subscribes(1).await;
    let started = Instant::now();

    h.coordinator.start(h.context()).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();

    assert_eq!(h.transport.subscribe_calls().await, 2);
    assert!(started.elapsed() >= Duration::from_millis(1_100));
    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn transport_close_triggers_resubscribe() {
    let h = harness().await;
    h.coordinator.start(h.context()).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();

    h.transport.close_all().await;
    wait_for_subscribe_calls(&h, 2).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();

    assert_eq!(h.transport.unsubscribed().await, vec![SubscriptionHandle(1)]);
    assert_eq!(h.transport.live_subscriptions().await, 1);
    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn immediate_close_pauses_before_resubscribing() {
    let h = harness().await;
    h.coordinator.start(h.context()).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();

    let closed_at = Instant::now();
    h.transport.close_all().await;
    wait_for_subscribe_calls(&h, 2).await;

    // Base delay is 100ms in the harness.
    assert!(closed_at.elapsed() >= Duration::from_millis(100));
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();
    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn established_subscription_reconnects_at_once() {
    let h = harness().await;
    h.coordinator.start(h.context()).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let closed_at = Instant::now();
    h.transport.close_all().await;
    wait_for_subscribe_calls(&h, 2).await;

    assert!(closed_at.elapsed() < Duration::from_millis(100));
    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_unsubscribes_and_closes() {
    let h = harness().await;
    h.coordinator.start(h.context()).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();

    h.coordinator.stop().await;

    assert_eq!(h.coordinator.state(), SubscriptionState::Closed);
    assert_eq!(h.transport.unsubscribed().await, vec![SubscriptionHandle(1)]);
    assert_eq!(h.transport.live_subscriptions().await, 0);

    // Terminal: no restart, no more handling.
    h.coordinator.start(h.context()).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.transport.subscribe_calls().await, 1);
    assert_eq!(
        h.coordinator
            .handle_record(h.record("v2", ClearType::Full, false))
            .await,
        HandleOutcome::Ignored(IgnoreReason::Closed)
    );

    // Stopping twice is harmless.
    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_during_backoff_cancels_the_timer() {
    let h = harness().await;
    h.transport.fail_next_subscribes(100).await;
    h.coordinator.start(h.context()).await;
    h.wait_for_state(SubscriptionState::Backoff).await.unwrap();

    h.coordinator.stop().await;
    let calls = h.transport.subscribe_calls().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.transport.subscribe_calls().await, calls);
    assert_eq!(h.coordinator.state(), SubscriptionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
    let h = harness().await;
    h.coordinator.start(h.context()).await;
    h.coordinator.start(h.context()).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.transport.subscribe_calls().await, 1);
    assert_eq!(h.records.query_count().await, 1);
    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn no_session_means_no_subscription() {
    let h = TestHarness::builder()
        .with_auth(MockAuth::signed_out())
        .build()
        .await
        .unwrap();

    h.coordinator.start(h.context()).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.transport.subscribe_calls().await, 0);
    assert_eq!(h.records.query_count().await, 0);
    assert_eq!(h.coordinator.state(), SubscriptionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn live_record_is_applied_and_ends_the_session() {
    let h = harness().await;
    let mut events = h.events();
    h.coordinator.start(h.context()).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();

    assert_eq!(
        h.transport.push(h.record("v2", ClearType::Full, false)).await,
        1
    );

    match next_event(&mut events).await {
        InvalidationEvent::Applied { version, .. } => assert_eq!(version, Version::from("v2")),
        other => panic!("unexpected event {other:?}"),
    }
    h.wait_for_state(SubscriptionState::Closed).await.unwrap();
    assert_eq!(h.transport.unsubscribed().await, vec![SubscriptionHandle(1)]);
    assert_eq!(h.navigator.redirects().await, vec!["/"]);

    h.coordinator.stop().await;
}

#[tokio::test(start_paused = true)]
async fn catch_up_runs_at_start() {
    let h = harness().await;
    let mut events = h.events();
    h.records
        .set_latest(Some(h.record("v9", ClearType::Storage, false)))
        .await;

    h.coordinator.start(h.context()).await;

    match next_event(&mut events).await {
        InvalidationEvent::Applied { version, .. } => assert_eq!(version, Version::from("v9")),
        other => panic!("unexpected event {other:?}"),
    }
    h.coordinator.stop().await;
    assert_eq!(h.auth.sign_out_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn deferred_record_replayed_after_reconnect_is_ignored() {
    let h = TestHarness::builder()
        .with_answer(Decision::Defer)
        .build()
        .await
        .unwrap();
    let mut events = h.events();
    h.coordinator.start(h.context()).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();

    let skippable = h.record("v3", ClearType::Full, true);
    h.transport.push(skippable.clone()).await;
    assert_eq!(
        next_event(&mut events).await,
        InvalidationEvent::Deferred {
            version: Version::from("v3")
        }
    );

    h.transport.close_all().await;
    wait_for_subscribe_calls(&h, 2).await;
    h.wait_for_state(SubscriptionState::Subscribed).await.unwrap();

    // Replay, followed by a forced record to observe that the replay was dropped.
    h.transport.push(skippable).await;
    let forced = h.record("v4", ClearType::Storage, false);
    h.transport.push(forced.clone()).await;

    match next_event(&mut events).await {
        InvalidationEvent::Applied { version, .. } => assert_eq!(version, Version::from("v4")),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(h.presenter.choices().await.len(), 1);
    assert_eq!(h.presenter.notices().await, vec![forced]);
    h.coordinator.stop().await;
}
