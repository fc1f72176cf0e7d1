// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Polling change feed over an append-only SQLite invalidation table.
//!
//! Each subscription captures the table's highest sequence number when it is
//! acknowledged and then polls for rows above that high-water mark, so only
//! records inserted after the subscribe call are delivered. A failed poll
//! keeps the subscription open and is retried on the next tick from the last
//! delivered row, so a transient error never skips records.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vigil_core::{
    BroadcastTransport, ClearType, InvalidationRecord, RecordSource, Subscription,
    SubscriptionHandle, VigilError, Version,
};

use crate::database::Database;
use crate::queries::records;

/// Buffered INSERT events per subscription before the poller waits.
const SUBSCRIPTION_BUFFER: usize = 64;

struct Poller {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// SQLite-backed [`BroadcastTransport`] and [`RecordSource`].
pub struct SqliteFeed {
    db: Database,
    poll_interval: Duration,
    next_handle: AtomicU64,
    pollers: Mutex<HashMap<SubscriptionHandle, Poller>>,
}

impl SqliteFeed {
    pub fn new(db: Database, poll_interval: Duration) -> Self {
        Self {
            db,
            poll_interval,
            next_handle: AtomicU64::new(1),
            pollers: Mutex::new(HashMap::new()),
        }
    }

    /// Publish a new invalidation with a fresh time-ordered identifier.
    pub async fn publish(
        &self,
        table: &str,
        clear_type: ClearType,
        reason: Option<String>,
        is_skippable: bool,
    ) -> Result<InvalidationRecord, VigilError> {
        let record = InvalidationRecord {
            id: Version(uuid::Uuid::now_v7().to_string()),
            reason,
            clear_type,
            is_skippable,
            // Stored with millisecond precision.
            created_at: Utc::now().trunc_subsecs(3),
        };
        self.append(table, &record).await?;
        Ok(record)
    }

    /// Append a fully formed record.
    pub async fn append(&self, table: &str, record: &InvalidationRecord) -> Result<(), VigilError> {
        records::ensure_table(&self.db, table).await?;
        let seq = records::insert(&self.db, table, record).await?;
        info!(
            table,
            seq,
            version = %record.id,
            clear_type = %record.clear_type,
            skippable = record.is_skippable,
            "invalidation published"
        );
        Ok(())
    }

    /// Number of live pollers, including ones whose subscription has closed
    /// but has not yet been unsubscribed.
    pub fn active_subscriptions(&self) -> usize {
        self.pollers.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn register(&self, handle: SubscriptionHandle, poller: Poller) -> Result<(), VigilError> {
        self.pollers
            .lock()
            .map_err(|_| VigilError::Internal("feed poller registry poisoned".into()))?
            .insert(handle, poller);
        Ok(())
    }

    fn take(&self, handle: SubscriptionHandle) -> Result<Option<Poller>, VigilError> {
        Ok(self
            .pollers
            .lock()
            .map_err(|_| VigilError::Internal("feed poller registry poisoned".into()))?
            .remove(&handle))
    }
}

#[async_trait]
impl BroadcastTransport for SqliteFeed {
    async fn subscribe(&self, table: &str) -> Result<Subscription, VigilError> {
        records::ensure_table(&self.db, table)
            .await
            .map_err(|e| transport_error("subscribe failed", e))?;
        let high_water = records::max_seq(&self.db, table)
            .await
            .map_err(|e| transport_error("subscribe failed", e))?;

        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_inserts(
            self.db.clone(),
            table.to_string(),
            high_water,
            self.poll_interval,
            tx,
            cancel.clone(),
            handle,
        ));
        self.register(handle, Poller { cancel, task })?;

        debug!(%handle, table, high_water, "subscription acknowledged");
        Ok(Subscription {
            handle,
            inserts: rx,
        })
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), VigilError> {
        let Some(poller) = self.take(handle)? else {
            debug!(%handle, "unsubscribe for unknown handle");
            return Ok(());
        };
        poller.cancel.cancel();
        if let Err(e) = poller.task.await {
            warn!(%handle, error = %e, "feed poller ended abnormally");
        }
        debug!(%handle, "unsubscribed");
        Ok(())
    }
}

#[async_trait]
impl RecordSource for SqliteFeed {
    async fn query_latest(&self, table: &str) -> Result<Option<InvalidationRecord>, VigilError> {
        records::ensure_table(&self.db, table).await?;
        records::latest(&self.db, table).await
    }
}

impl Drop for SqliteFeed {
    fn drop(&mut self) {
        if let Ok(pollers) = self.pollers.get_mut() {
            for poller in pollers.values() {
                poller.cancel.cancel();
            }
        }
    }
}

fn transport_error(message: &str, source: VigilError) -> VigilError {
    VigilError::Transport {
        message: message.to_string(),
        source: Some(Box::new(source)),
    }
}

async fn poll_inserts(
    db: Database,
    table: String,
    mut last_seq: i64,
    interval: Duration,
    tx: mpsc::Sender<InvalidationRecord>,
    cancel: CancellationToken,
    handle: SubscriptionHandle,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failed_polls: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let rows = match records::inserted_after(&db, &table, last_seq).await {
            Ok(rows) => rows,
            Err(e) => {
                if failed_polls == 0 {
                    warn!(%handle, table, last_seq, error = %e, "change feed poll failed, retrying");
                }
                failed_polls = failed_polls.saturating_add(1);
                continue;
            }
        };
        if failed_polls > 0 {
            info!(%handle, table, failed_polls, "change feed poll recovered");
            failed_polls = 0;
        }

        for (seq, record) in rows {
            last_seq = seq;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = tx.send(record) => {
                    if sent.is_err() {
                        debug!(%handle, "subscriber dropped, stopping poller");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "cache_invalidations";

    async fn feed() -> SqliteFeed {
        let db = Database::open_in_memory().await.unwrap();
        SqliteFeed::new(db, Duration::from_millis(10))
    }

    async fn next(sub: &mut Subscription) -> Option<InvalidationRecord> {
        tokio::time::timeout(Duration::from_secs(5), sub.inserts.recv())
            .await
            .expect("timed out waiting for insert")
    }

    #[tokio::test]
    async fn delivers_only_inserts_after_subscribe() {
        let feed = feed().await;
        feed.publish(TABLE, ClearType::Full, Some("before".into()), false)
            .await
            .unwrap();

        let mut sub = feed.subscribe(TABLE).await.unwrap();
        let published = feed
            .publish(TABLE, ClearType::Storage, Some("after".into()), true)
            .await
            .unwrap();

        let received = next(&mut sub).await.unwrap();
        assert_eq!(received, published);
        feed.unsubscribe(sub.handle).await.unwrap();
    }

    #[tokio::test]
    async fn delivers_in_insertion_order() {
        let feed = feed().await;
        let mut sub = feed.subscribe(TABLE).await.unwrap();

        for reason in ["one", "two", "three"] {
            feed.publish(TABLE, ClearType::Full, Some(reason.into()), false)
                .await
                .unwrap();
        }

        let mut reasons = Vec::new();
        for _ in 0..3 {
            reasons.push(next(&mut sub).await.unwrap().reason.unwrap());
        }
        assert_eq!(reasons, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_stream() {
        let feed = feed().await;
        let mut sub = feed.subscribe(TABLE).await.unwrap();
        assert_eq!(feed.active_subscriptions(), 1);

        feed.unsubscribe(sub.handle).await.unwrap();
        assert_eq!(feed.active_subscriptions(), 0);
        assert!(next(&mut sub).await.is_none());

        // Unknown handles are ignored.
        feed.unsubscribe(sub.handle).await.unwrap();
    }

    #[tokio::test]
    async fn handles_are_unique() {
        let feed = feed().await;
        let a = feed.subscribe(TABLE).await.unwrap();
        let b = feed.subscribe(TABLE).await.unwrap();
        assert_ne!(a.handle, b.handle);
    }

    #[tokio::test]
    async fn query_latest_sees_newest_record() {
        let feed = feed().await;
        assert!(feed.query_latest(TABLE).await.unwrap().is_none());

        feed.publish(TABLE, ClearType::Full, None, false).await.unwrap();
        let newest = feed
            .publish(TABLE, ClearType::ServiceWorker, None, true)
            .await
            .unwrap();
        assert_eq!(feed.query_latest(TABLE).await.unwrap(), Some(newest));
    }

    #[tokio::test]
    async fn failed_poll_does_not_skip_records() {
        let feed = feed().await;
        let mut sub = feed.subscribe(TABLE).await.unwrap();

        // Moving the table away makes every poll fail until it is back.
        rename(&feed, TABLE, "parked_invalidations").await;
        assert!(records::inserted_after(&feed.db, TABLE, 0).await.is_err());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let record = InvalidationRecord {
            id: Version::from("v-gap"),
            reason: Some("published while polls failed".into()),
            clear_type: ClearType::Full,
            is_skippable: false,
            created_at: Utc::now().trunc_subsecs(3),
        };
        records::insert(&feed.db, "parked_invalidations", &record)
            .await
            .unwrap();
        rename(&feed, "parked_invalidations", TABLE).await;

        assert_eq!(next(&mut sub).await, Some(record));
        assert_eq!(feed.active_subscriptions(), 1);
        feed.unsubscribe(sub.handle).await.unwrap();
    }

    async fn rename(feed: &SqliteFeed, from: &str, to: &str) {
        let sql = format!("ALTER TABLE {from} RENAME TO {to}");
        feed.db
            .connection()
            .call(move |conn| conn.execute_batch(&sql))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn subscribe_rejects_invalid_table() {
        let feed = feed().await;
        let err = feed.subscribe("Bad Table").await.unwrap_err();
        assert!(matches!(err, VigilError::Transport { .. }));
    }
}
