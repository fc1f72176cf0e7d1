// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock change feed and direct-query source.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore, mpsc};
use vigil_core::{
    BroadcastTransport, InvalidationRecord, RecordSource, Subscription, SubscriptionHandle,
    VigilError,
};

#[derive(Default)]
struct TransportState {
    next_handle: u64,
    live: HashMap<SubscriptionHandle, mpsc::Sender<InvalidationRecord>>,
    failures_left: usize,
    hangs_left: usize,
    subscribe_calls: usize,
    unsubscribed: Vec<SubscriptionHandle>,
}

/// A [`BroadcastTransport`] driven by the test.
///
/// `push` delivers a record to every live subscription; `close_all` drops
/// the senders as a transport-side close would. Subscribe failures and
/// subscribe calls that never complete can be queued up front.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<TransportState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` subscribe calls fail immediately.
    pub async fn fail_next_subscribes(&self, n: usize) {
        self.state.lock().await.failures_left = n;
    }

    /// The next `n` subscribe calls never complete.
    pub async fn hang_next_subscribes(&self, n: usize) {
        self.state.lock().await.hangs_left = n;
    }

    /// Deliver `record` to all live subscriptions, returning how many received it.
    pub async fn push(&self, record: InvalidationRecord) -> usize {
        let senders: Vec<_> = self.state.lock().await.live.values().cloned().collect();
        let mut delivered = 0;
        for sender in senders {
            if sender.send(record.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Close every live subscription from the transport side.
    pub async fn close_all(&self) {
        self.state.lock().await.live.clear();
    }

    pub async fn subscribe_calls(&self) -> usize {
        self.state.lock().await.subscribe_calls
    }

    pub async fn live_subscriptions(&self) -> usize {
        self.state.lock().await.live.len()
    }

    pub async fn unsubscribed(&self) -> Vec<SubscriptionHandle> {
        self.state.lock().await.unsubscribed.clone()
    }
}

#[async_trait]
impl BroadcastTransport for MockTransport {
    async fn subscribe(&self, _table: &str) -> Result<Subscription, VigilError> {
        let hang = {
            let mut state = self.state.lock().await;
            state.subscribe_calls += 1;
            if state.failures_left > 0 {
                state.failures_left -= 1;
                return Err(VigilError::transport("channel error"));
            }
            if state.hangs_left > 0 {
                state.hangs_left -= 1;
                true
            } else {
                false
            }
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().await;
        state.next_handle += 1;
        let handle = SubscriptionHandle(state.next_handle);
        let (tx, rx) = mpsc::channel(16);
        state.live.insert(handle, tx);
        Ok(Subscription {
            handle,
            inserts: rx,
        })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), VigilError> {
        let mut state = self.state.lock().await;
        state.live.remove(&handle);
        state.unsubscribed.push(handle);
        Ok(())
    }
}

#[derive(Default)]
struct SourceState {
    latest: Option<InvalidationRecord>,
    fail: bool,
    queries: usize,
}

/// A [`RecordSource`] returning a scripted latest record.
///
/// A gated source holds every query open until the test releases it, and
/// answers with whatever latest record is set at release time.
#[derive(Default)]
pub struct MockRecordSource {
    state: Mutex<SourceState>,
    gate: Option<Arc<Semaphore>>,
}

impl MockRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Let `n` pending or future queries complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub async fn set_latest(&self, record: Option<InvalidationRecord>) {
        self.state.lock().await.latest = record;
    }

    pub async fn fail_queries(&self, fail: bool) {
        self.state.lock().await.fail = fail;
    }

    pub async fn query_count(&self) -> usize {
        self.state.lock().await.queries
    }
}

#[async_trait]
impl RecordSource for MockRecordSource {
    async fn query_latest(&self, _table: &str) -> Result<Option<InvalidationRecord>, VigilError> {
        self.state.lock().await.queries += 1;
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| VigilError::transport("query gate closed"))?;
            permit.forget();
        }
        let state = self.state.lock().await;
        if state.fail {
            return Err(VigilError::transport("query failed"));
        }
        Ok(state.latest.clone())
    }
}
