// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local client surfaces for the `watch` session.
//!
//! Worker caches are directories under the data directory, cookies live in a
//! `name=value` file, navigation is logged, and the session is whatever
//! user `watch` was started as.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use vigil_core::{AuthProvider, CookieJar, Identity, Navigator, VigilError, WorkerHost};

fn fs_error(path: &Path, e: std::io::Error) -> VigilError {
    VigilError::persistence(format!("{}: {e}", path.display()))
}

/// Reads `path`, treating a missing file as empty.
async fn read_optional(path: &Path) -> Result<String, VigilError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(fs_error(path, e)),
    }
}

/// Worker host backed by a directory tree.
///
/// ```text
/// <root>/caches/<name>/     one directory per response cache
/// <root>/registrations      one registered worker scope per line
/// <root>/clear-requested    written by notify_clear
/// ```
pub struct FsWorkerHost {
    root: PathBuf,
}

impl FsWorkerHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn caches_dir(&self) -> PathBuf {
        self.root.join("caches")
    }

    fn registrations(&self) -> PathBuf {
        self.root.join("registrations")
    }
}

#[async_trait]
impl WorkerHost for FsWorkerHost {
    async fn cache_names(&self) -> Result<Vec<String>, VigilError> {
        let dir = self.caches_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(fs_error(&dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| fs_error(&dir, e))? {
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if is_dir {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete_cache(&self, name: &str) -> Result<(), VigilError> {
        let path = self.caches_dir().join(name);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!(cache = name, "cache deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(fs_error(&path, e)),
        }
    }

    async fn unregister_workers(&self) -> Result<usize, VigilError> {
        let path = self.registrations();
        let registered = read_optional(&path)
            .await?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count();
        if registered > 0 {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| fs_error(&path, e))?;
        }
        Ok(registered)
    }

    async fn notify_clear(&self) -> Result<(), VigilError> {
        let path = self.root.join("clear-requested");
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| fs_error(&self.root, e))?;
        tokio::fs::write(&path, Utc::now().to_rfc3339())
            .await
            .map_err(|e| fs_error(&path, e))
    }
}

/// Cookie jar persisted as `name=value` lines.
pub struct FileCookieJar {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCookieJar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

fn cookie_name(line: &str) -> Option<&str> {
    let name = line.split_once('=').map_or(line, |(name, _)| name).trim();
    (!name.is_empty()).then_some(name)
}

#[async_trait]
impl CookieJar for FileCookieJar {
    async fn names(&self) -> Result<Vec<String>, VigilError> {
        let _guard = self.lock.lock().await;
        Ok(read_optional(&self.path)
            .await?
            .lines()
            .filter_map(cookie_name)
            .map(str::to_string)
            .collect())
    }

    async fn remove(&self, name: &str) -> Result<(), VigilError> {
        let _guard = self.lock.lock().await;
        let content = read_optional(&self.path).await?;
        let kept: Vec<&str> = content
            .lines()
            .filter(|line| cookie_name(line).is_some_and(|n| n != name))
            .collect();
        if kept.len() == content.lines().count() {
            return Ok(());
        }

        let mut rewritten = kept.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }
        tokio::fs::write(&self.path, rewritten)
            .await
            .map_err(|e| fs_error(&self.path, e))
    }
}

/// Navigator for a terminal session: the redirect is logged and printed.
pub struct LogNavigator;

#[async_trait]
impl Navigator for LogNavigator {
    async fn redirect(&self, target: &str) -> Result<(), VigilError> {
        info!(entry_point = target, "redirecting to sign-in");
        println!("Signed out. Sign in again at {target}");
        Ok(())
    }
}

/// The user `watch` was started for, until signed out.
pub struct LocalAuth {
    identity: Mutex<Option<Identity>>,
}

impl LocalAuth {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity: Mutex::new(Some(identity)),
        }
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn current_session(&self) -> Result<Option<Identity>, VigilError> {
        Ok(self.identity.lock().await.clone())
    }

    async fn sign_out(&self) -> Result<(), VigilError> {
        if let Some(identity) = self.identity.lock().await.take() {
            info!(user = %identity.user_id, "signed out");
        }
        Ok(())
    }
}
