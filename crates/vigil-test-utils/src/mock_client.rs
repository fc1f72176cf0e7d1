// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock purge targets and navigator.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use vigil_core::{CookieJar, Navigator, VigilError, WorkerHost};

#[derive(Default)]
struct WorkerState {
    caches: BTreeSet<String>,
    workers: usize,
    notifications: usize,
    fail_notify: bool,
    fail_cache_listing: bool,
}

/// Worker host holding named caches and a count of registered workers.
#[derive(Default)]
pub struct MockWorkerHost {
    state: Mutex<WorkerState>,
}

impl MockWorkerHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caches<I, S>(caches: I, workers: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Mutex::new(WorkerState {
                caches: caches.into_iter().map(Into::into).collect(),
                workers,
                ..WorkerState::default()
            }),
        }
    }

    pub async fn fail_notify(&self, fail: bool) {
        self.state.lock().await.fail_notify = fail;
    }

    pub async fn fail_cache_listing(&self, fail: bool) {
        self.state.lock().await.fail_cache_listing = fail;
    }

    pub async fn caches(&self) -> Vec<String> {
        self.state.lock().await.caches.iter().cloned().collect()
    }

    pub async fn registered_workers(&self) -> usize {
        self.state.lock().await.workers
    }

    pub async fn notifications(&self) -> usize {
        self.state.lock().await.notifications
    }
}

#[async_trait]
impl WorkerHost for MockWorkerHost {
    async fn cache_names(&self) -> Result<Vec<String>, VigilError> {
        let state = self.state.lock().await;
        if state.fail_cache_listing {
            return Err(VigilError::SideEffect {
                step: "cache_names".into(),
                message: "cache storage unavailable".into(),
            });
        }
        Ok(state.caches.iter().cloned().collect())
    }

    async fn delete_cache(&self, name: &str) -> Result<(), VigilError> {
        self.state.lock().await.caches.remove(name);
        Ok(())
    }

    async fn unregister_workers(&self) -> Result<usize, VigilError> {
        Ok(std::mem::take(&mut self.state.lock().await.workers))
    }

    async fn notify_clear(&self) -> Result<(), VigilError> {
        let mut state = self.state.lock().await;
        if state.fail_notify {
            return Err(VigilError::SideEffect {
                step: "notify_clear".into(),
                message: "no active worker".into(),
            });
        }
        state.notifications += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct MockCookieJar {
    cookies: Mutex<BTreeSet<String>>,
}

impl MockCookieJar {
    pub fn with_cookies<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cookies: Mutex::new(names.into_iter().map(Into::into).collect()),
        }
    }

    pub async fn cookies(&self) -> Vec<String> {
        self.cookies.lock().await.iter().cloned().collect()
    }
}

#[async_trait]
impl CookieJar for MockCookieJar {
    async fn names(&self) -> Result<Vec<String>, VigilError> {
        Ok(self.cookies.lock().await.iter().cloned().collect())
    }

    async fn remove(&self, name: &str) -> Result<(), VigilError> {
        self.cookies.lock().await.remove(name);
        Ok(())
    }
}

/// Records redirect targets. A gated navigator blocks every redirect until
/// the test releases it, which keeps a purge observably in progress.
#[derive(Default)]
pub struct MockNavigator {
    redirects: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
    fail: Mutex<bool>,
}

impl MockNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    /// Let `n` blocked or future redirects through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub async fn fail_redirects(&self, fail: bool) {
        *self.fail.lock().await = fail;
    }

    pub async fn redirects(&self) -> Vec<String> {
        self.redirects.lock().await.clone()
    }
}

#[async_trait]
impl Navigator for MockNavigator {
    async fn redirect(&self, target: &str) -> Result<(), VigilError> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| VigilError::Internal("navigator gate closed".into()))?;
            permit.forget();
        }
        if *self.fail.lock().await {
            return Err(VigilError::Internal("navigation blocked".into()));
        }
        self.redirects.lock().await.push(target.to_string());
        Ok(())
    }
}
