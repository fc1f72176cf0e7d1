// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `vigil watch` command implementation.
//!
//! Runs one client session against the SQLite change feed until the session
//! is purged and redirected, or until SIGINT/SIGTERM.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use vigil_config::VigilConfig;
use vigil_coordinator::{
    CoordinatorParts, CoordinatorSettings, HeadlessPresenter, InvalidationCoordinator,
    InvalidationEvent,
};
use vigil_core::{DecisionPresenter, Identity, SessionContext, SystemClock, VigilError};
use vigil_storage::{Database, MemoryStore, SqliteFeed, SqliteStore};

use crate::client::{FileCookieJar, FsWorkerHost, LocalAuth, LogNavigator};
use crate::shutdown::install_signal_handler;
use crate::terminal::TerminalPresenter;

/// Directory next to the database holding worker caches and cookies.
pub fn data_dir(database_path: &str) -> PathBuf {
    Path::new(database_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn presenter() -> Arc<dyn DecisionPresenter> {
    use std::io::IsTerminal;
    if std::io::stdin().is_terminal() {
        Arc::new(TerminalPresenter::detect())
    } else {
        Arc::new(HeadlessPresenter)
    }
}

/// Assemble the coordinator's collaborators for a local session.
pub fn local_parts(config: &VigilConfig, db: Database, user: &str) -> CoordinatorParts {
    let dir = data_dir(&config.storage.database_path);
    let feed = Arc::new(SqliteFeed::new(db.clone(), config.storage.poll_interval()));

    CoordinatorParts {
        transport: feed.clone(),
        records: feed,
        auth: Arc::new(LocalAuth::new(Identity {
            user_id: user.to_string(),
            email: None,
        })),
        presenter: presenter(),
        durable: Arc::new(SqliteStore::durable(db)),
        session: Arc::new(MemoryStore::new()),
        workers: Arc::new(FsWorkerHost::new(dir.join("workers"))),
        cookies: Arc::new(FileCookieJar::new(dir.join("cookies"))),
        navigator: Arc::new(LogNavigator),
        clock: Arc::new(SystemClock),
    }
}

/// Run the `vigil watch` command.
pub async fn run_watch(config: VigilConfig, user: String) -> Result<(), VigilError> {
    let db = Database::open(&config.storage.database_path).await?;
    let parts = local_parts(&config, db, &user);
    let coordinator =
        InvalidationCoordinator::new(CoordinatorSettings::from_config(&config), parts).await?;

    let mut events = coordinator.on_invalidation_applied();
    let shutdown = install_signal_handler();

    coordinator
        .start(SessionContext::new(Identity {
            user_id: user.clone(),
            email: None,
        }))
        .await;
    info!(
        user = %user,
        table = %config.invalidation.table,
        database = %config.storage.database_path,
        "watching for invalidations"
    );

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Ok(InvalidationEvent::Applied { version, clear_type, report }) => {
                    info!(
                        %version,
                        %clear_type,
                        failed_steps = report.failed_steps().len(),
                        "session purged"
                    );
                    break;
                }
                Ok(InvalidationEvent::PurgeFailed { version, message }) => {
                    warn!(%version, %message, "purge did not complete, still watching");
                }
                Ok(other) => debug!(version = %other.version(), event = ?other, "invalidation event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event listener lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    coordinator.stop().await;
    info!("watch session ended");
    Ok(())
}
