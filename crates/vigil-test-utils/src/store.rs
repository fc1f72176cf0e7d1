// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use vigil_core::{KeyValueStore, VigilError};
use vigil_storage::MemoryStore;

/// In-memory store with switchable failures.
///
/// With `fail_writes` set, `set`, `delete` and `clear` return a persistence
/// error and leave the contents untouched. With `fail_keys` set, key listing
/// fails, as it does on hosts that cannot enumerate storage.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    fail_keys: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            inner: MemoryStore::with_entries(entries),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_keys(&self, fail: bool) {
        self.fail_keys.store(fail, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.snapshot().await
    }

    fn check_write(&self) -> Result<(), VigilError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(VigilError::persistence("quota exceeded"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, VigilError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), VigilError> {
        self.check_write()?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), VigilError> {
        self.check_write()?;
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<(), VigilError> {
        self.check_write()?;
        self.inner.clear().await
    }

    async fn keys(&self) -> Result<Vec<String>, VigilError> {
        if self.fail_keys.load(Ordering::SeqCst) {
            return Err(VigilError::persistence("key listing unsupported"));
        }
        self.inner.keys().await
    }
}
