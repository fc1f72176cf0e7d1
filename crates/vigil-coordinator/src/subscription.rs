// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live subscription lifecycle: connect, deliver, reconnect with backoff.
//!
//! States: Disconnected -> Connecting -> Subscribed, with Connecting ->
//! Backoff -> Connecting on failure and Subscribed -> Disconnected ->
//! Connecting when the transport closes. A subscription the transport
//! closes within one base delay of acknowledging it is re-established only
//! after that delay. Cancellation from any state ends in the terminal
//! Closed state after the live handle is unsubscribed.

use std::sync::Arc;
use std::time::Duration;

use strum::Display;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_core::{BroadcastTransport, InvalidationRecord, Subscription, VigilError};

use crate::backoff::BackoffPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionState {
    Disconnected,
    Connecting,
    Subscribed,
    Backoff,
    /// Terminal.
    Closed,
}

/// Receives each delivered INSERT. Must not block.
pub(crate) type Dispatch = Arc<dyn Fn(InvalidationRecord) + Send + Sync>;

pub(crate) struct SubscriptionLoop {
    pub(crate) transport: Arc<dyn BroadcastTransport>,
    pub(crate) table: String,
    pub(crate) policy: BackoffPolicy,
    pub(crate) subscribe_timeout: Duration,
    pub(crate) state: Arc<watch::Sender<SubscriptionState>>,
    pub(crate) cancel: CancellationToken,
}

enum Ended {
    Cancelled,
    ClosedByTransport,
}

impl SubscriptionLoop {
    fn set_state(&self, next: SubscriptionState) {
        self.state.send_if_modified(|current| {
            if *current == SubscriptionState::Closed || *current == next {
                return false;
            }
            debug!(from = %current, to = %next, "subscription state");
            *current = next;
            true
        });
    }

    /// Run until cancelled. `retry_count` resets on every acknowledged subscribe.
    pub(crate) async fn run(self, dispatch: Dispatch) {
        let mut retry_count: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.set_state(SubscriptionState::Connecting);

            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = tokio::time::timeout(
                    self.subscribe_timeout,
                    self.transport.subscribe(&self.table),
                ) => result.unwrap_or_else(|_| Err(VigilError::Timeout {
                    duration: self.subscribe_timeout,
                })),
            };

            match attempt {
                Ok(subscription) => {
                    retry_count = 0;
                    let acknowledged = tokio::time::Instant::now();
                    self.set_state(SubscriptionState::Subscribed);
                    info!(handle = %subscription.handle, table = %self.table, "subscribed to invalidations");

                    let handle = subscription.handle;
                    let ended = self.deliver(subscription, &dispatch).await;
                    if let Err(e) = self.transport.unsubscribe(handle).await {
                        warn!(%handle, error = %e, "unsubscribe failed");
                    }
                    match ended {
                        Ended::Cancelled => break,
                        Ended::ClosedByTransport => {
                            self.set_state(SubscriptionState::Disconnected);
                            let pause = self.policy.base_delay();
                            if acknowledged.elapsed() < pause {
                                info!(
                                    %handle,
                                    pause_ms = u64::try_from(pause.as_millis()).unwrap_or(u64::MAX),
                                    "subscription closed right after subscribing, pausing before reconnect"
                                );
                                tokio::select! {
                                    biased;
                                    _ = self.cancel.cancelled() => break,
                                    _ = tokio::time::sleep(pause) => {}
                                }
                            } else {
                                info!(%handle, "subscription closed by transport, reconnecting");
                            }
                        }
                    }
                }
                Err(e) => {
                    retry_count += 1;
                    match self.policy.delay(retry_count) {
                        Some(delay) => {
                            self.set_state(SubscriptionState::Backoff);
                            warn!(
                                attempt = retry_count,
                                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                error = %e,
                                "subscribe failed, backing off"
                            );
                            tokio::select! {
                                biased;
                                _ = self.cancel.cancelled() => break,
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => {
                            self.set_state(SubscriptionState::Disconnected);
                            warn!(
                                attempts = retry_count,
                                error = %e,
                                "reconnect attempts exhausted, live delivery disabled for this session"
                            );
                            self.cancel.cancelled().await;
                            break;
                        }
                    }
                }
            }
        }

        self.state.send_replace(SubscriptionState::Closed);
        debug!("subscription loop finished");
    }

    async fn deliver(&self, mut subscription: Subscription, dispatch: &Dispatch) -> Ended {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ended::Cancelled,
                next = subscription.inserts.recv() => match next {
                    Some(record) => {
                        debug!(version = %record.id, "invalidation delivered");
                        dispatch(record);
                    }
                    None => return Ended::ClosedByTransport,
                },
            }
        }
    }
}
