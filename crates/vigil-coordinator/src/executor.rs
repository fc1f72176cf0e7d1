// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local side effects of an applied invalidation: clearing caches, storage
//! and cookies, then revoking the session and returning to sign-in.
//!
//! Every clearing sub-step is independent. A failure is recorded in the
//! [`PurgeReport`] and the remaining steps still run.

use std::sync::Arc;
use std::time::Duration;

use strum::Display;
use tracing::{debug, info, warn};
use vigil_config::VigilConfig;
use vigil_core::{
    AuthProvider, ClearType, CookieJar, KeyValueStore, Navigator, VigilError, WorkerHost,
};

use crate::version_store::BOOKKEEPING_KEYS;

/// One independently executed clearing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PurgeStep {
    DeleteWorkerCaches,
    UnregisterWorkers,
    NotifyWorkers,
    ClearDurableStorage,
    ClearSessionStorage,
    ClearCookies,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: PurgeStep,
    /// Items removed (caches, workers, keys, cookies).
    pub affected: usize,
    pub error: Option<String>,
}

impl StepOutcome {
    fn from_result(step: PurgeStep, result: Result<usize, VigilError>) -> Self {
        match result {
            Ok(affected) => {
                debug!(%step, affected, "purge step done");
                Self {
                    step,
                    affected,
                    error: None,
                }
            }
            Err(e) => {
                warn!(%step, error = %e, "purge step failed");
                Self {
                    step,
                    affected: 0,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// What a purge did, step by step, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub outcomes: Vec<StepOutcome>,
}

impl PurgeReport {
    pub fn steps(&self) -> Vec<PurgeStep> {
        self.outcomes.iter().map(|o| o.step).collect()
    }

    pub fn failed_steps(&self) -> Vec<PurgeStep> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| o.step)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(StepOutcome::succeeded)
    }

    pub fn outcome(&self, step: PurgeStep) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.step == step)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Redirect target after sign-out.
    pub entry_point: String,
    /// Pause between sign-out and redirect so the notice stays visible.
    pub sign_out_delay: Duration,
    /// Storage keys that survive a storage purge.
    pub preserved_keys: Vec<String>,
}

impl ExecutorSettings {
    pub fn from_config(config: &VigilConfig) -> Self {
        let mut preserved_keys = vec![config.client.impersonation_key.clone()];
        preserved_keys.extend(BOOKKEEPING_KEYS.iter().map(|k| k.to_string()));
        Self {
            entry_point: config.client.entry_point.clone(),
            sign_out_delay: config.client.sign_out_delay(),
            preserved_keys,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_config(&VigilConfig::default())
    }
}

/// Client surfaces a purge clears.
#[derive(Clone)]
pub struct PurgeTargets {
    pub workers: Arc<dyn WorkerHost>,
    pub cookies: Arc<dyn CookieJar>,
    pub durable: Arc<dyn KeyValueStore>,
    pub session: Arc<dyn KeyValueStore>,
}

pub struct SideEffectExecutor {
    targets: PurgeTargets,
    auth: Arc<dyn AuthProvider>,
    navigator: Arc<dyn Navigator>,
    settings: ExecutorSettings,
}

impl SideEffectExecutor {
    pub fn new(
        targets: PurgeTargets,
        auth: Arc<dyn AuthProvider>,
        navigator: Arc<dyn Navigator>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            targets,
            auth,
            navigator,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Clear everything `clear_type` covers. Never fails as a whole.
    pub async fn purge(&self, clear_type: ClearType) -> PurgeReport {
        let mut report = PurgeReport::default();

        if clear_type.clears_worker_caches() {
            report.outcomes.push(StepOutcome::from_result(
                PurgeStep::DeleteWorkerCaches,
                self.delete_worker_caches().await,
            ));
            report.outcomes.push(StepOutcome::from_result(
                PurgeStep::UnregisterWorkers,
                self.targets.workers.unregister_workers().await,
            ));
            report.outcomes.push(StepOutcome::from_result(
                PurgeStep::NotifyWorkers,
                self.targets.workers.notify_clear().await.map(|()| 0),
            ));
        }

        if clear_type.clears_storage() {
            report.outcomes.push(StepOutcome::from_result(
                PurgeStep::ClearDurableStorage,
                clear_preserving(self.targets.durable.as_ref(), &self.settings.preserved_keys)
                    .await,
            ));
            report.outcomes.push(StepOutcome::from_result(
                PurgeStep::ClearSessionStorage,
                clear_preserving(self.targets.session.as_ref(), &self.settings.preserved_keys)
                    .await,
            ));
        }

        if clear_type.clears_cookies() {
            report.outcomes.push(StepOutcome::from_result(
                PurgeStep::ClearCookies,
                self.clear_cookies().await,
            ));
        }

        info!(
            %clear_type,
            steps = report.outcomes.len(),
            failed = report.failed_steps().len(),
            "local state purged"
        );
        report
    }

    /// Revoke the session, pause, then navigate to the entry point.
    ///
    /// The redirect is attempted even when revocation fails; the revocation
    /// error is still returned.
    pub async fn sign_out_and_redirect(&self) -> Result<(), VigilError> {
        let revoked = self.auth.sign_out().await;
        match &revoked {
            Ok(()) => info!("session revoked"),
            Err(e) => warn!(error = %e, "session revocation failed, redirecting anyway"),
        }

        tokio::time::sleep(self.settings.sign_out_delay).await;

        self.navigator.redirect(&self.settings.entry_point).await?;
        info!(entry_point = %self.settings.entry_point, "redirected to sign-in");
        revoked
    }

    async fn delete_worker_caches(&self) -> Result<usize, VigilError> {
        let names = self.targets.workers.cache_names().await?;
        let mut deleted = 0;
        let mut failures = Vec::new();
        for name in &names {
            match self.targets.workers.delete_cache(name).await {
                Ok(()) => deleted += 1,
                Err(e) => failures.push(format!("{name}: {e}")),
            }
        }
        partial(PurgeStep::DeleteWorkerCaches, deleted, failures)
    }

    async fn clear_cookies(&self) -> Result<usize, VigilError> {
        let names = self.targets.cookies.names().await?;
        let mut removed = 0;
        let mut failures = Vec::new();
        for name in &names {
            match self.targets.cookies.remove(name).await {
                Ok(()) => removed += 1,
                Err(e) => failures.push(format!("{name}: {e}")),
            }
        }
        partial(PurgeStep::ClearCookies, removed, failures)
    }
}

fn partial(step: PurgeStep, done: usize, failures: Vec<String>) -> Result<usize, VigilError> {
    if failures.is_empty() {
        Ok(done)
    } else {
        Err(VigilError::SideEffect {
            step: step.to_string(),
            message: failures.join("; "),
        })
    }
}

/// Remove every key except `keep`.
///
/// Stores that cannot enumerate their keys are cleared wholesale and the
/// preserved values written back.
async fn clear_preserving(store: &dyn KeyValueStore, keep: &[String]) -> Result<usize, VigilError> {
    let keys = match store.keys().await {
        Ok(keys) => keys,
        Err(e) => {
            debug!(error = %e, "key listing unavailable, clearing and restoring preserved keys");
            let mut saved = Vec::new();
            for key in keep {
                if let Some(value) = store.get(key).await? {
                    saved.push((key, value));
                }
            }
            store.clear().await?;
            for (key, value) in &saved {
                store.set(key, value).await?;
            }
            return Ok(0);
        }
    };

    let mut removed = 0;
    let mut failures = Vec::new();
    for key in keys.iter().filter(|k| !keep.contains(k)) {
        match store.delete(key).await {
            Ok(()) => removed += 1,
            Err(e) => failures.push(format!("{key}: {e}")),
        }
    }
    if failures.is_empty() {
        Ok(removed)
    } else {
        Err(VigilError::persistence(failures.join("; ")))
    }
}
