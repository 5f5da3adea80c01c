//! Temporary file lifecycle for uploads and engine output.
//!
//! Every request gets exclusive paths inside the manager's working directory.
//! Once a request has produced its response, both paths are handed to a
//! [`TempFileGuard`] which deletes them exactly once: when the guard is
//! dropped, when [`TempFileGuard::cleanup_now`] is awaited, or when the
//! backstop timer fires, whichever happens first.

use crate::server::metrics;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::engine::OUTPUT_EXTENSION;

pub const UPLOAD_PREFIX: &str = "upload_";
pub const OUTPUT_PREFIX: &str = "enhanced_";

const FALLBACK_EXTENSION: &str = "bin";
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum TempFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct TempFileManager {
    dir: PathBuf,
    grace_period: Duration,
}

impl TempFileManager {
    pub fn new(dir: impl Into<PathBuf>, grace_period: Duration) -> Self {
        Self {
            dir: dir.into(),
            grace_period,
        }
    }

    /// Creates the working directory and removes files left behind by a
    /// previous process. Returns how many leftovers were removed.
    pub async fn init(&self) -> Result<usize, TempFileError> {
        fs::create_dir_all(&self.dir).await?;

        let mut removed = 0;
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !(name.starts_with(UPLOAD_PREFIX) || name.starts_with(OUTPUT_PREFIX)) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if remove_path(&entry.path()).await {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(
                "Removed {} leftover temporary files from {:?}",
                removed, self.dir
            );
        }
        Ok(removed)
    }

    /// Fresh path for an upload, keeping a sanitized version of the client's extension.
    pub fn upload_path(&self, original_filename: Option<&str>) -> PathBuf {
        let extension = original_filename
            .and_then(sanitize_extension)
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
        self.dir.join(format!(
            "{}{}.{}",
            UPLOAD_PREFIX,
            uuid::Uuid::new_v4(),
            extension
        ))
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.join(format!(
            "{}{}.{}",
            OUTPUT_PREFIX,
            uuid::Uuid::new_v4(),
            OUTPUT_EXTENSION
        ))
    }

    /// Registers `paths` for deletion. Duplicate paths are deleted once.
    pub fn track<I>(&self, paths: I) -> TempFileGuard
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut unique: Vec<PathBuf> = Vec::new();
        for path in paths {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }

        let state = Arc::new(GuardState {
            paths: unique,
            released: AtomicBool::new(false),
        });
        let cancel_backstop = spawn_backstop(state.clone(), self.grace_period);

        TempFileGuard {
            state,
            _cancel_backstop: cancel_backstop,
        }
    }
}

struct GuardState {
    paths: Vec<PathBuf>,
    released: AtomicBool,
}

impl GuardState {
    /// True for exactly one caller.
    fn claim(&self) -> bool {
        !self.released.swap(true, Ordering::SeqCst)
    }
}

/// Owns a set of temporary paths until they are deleted.
pub struct TempFileGuard {
    state: Arc<GuardState>,
    // Dropping the sender stops the backstop timer.
    _cancel_backstop: Option<oneshot::Sender<()>>,
}

impl TempFileGuard {
    pub fn paths(&self) -> &[PathBuf] {
        &self.state.paths
    }

    #[cfg(test)]
    fn is_released(&self) -> bool {
        self.state.released.load(Ordering::SeqCst)
    }

    /// Deletes the tracked files now and waits for the deletions to finish.
    pub async fn cleanup_now(self) {
        if self.state.claim() {
            remove_all(&self.state.paths).await;
        }
    }

    /// Stops tracking without deleting anything. The caller becomes responsible
    /// for the returned paths.
    pub fn disarm(self) -> Vec<PathBuf> {
        self.state.claim();
        self.state.paths.clone()
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if !self.state.claim() {
            return;
        }
        let paths = self.state.paths.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    remove_all(&paths).await;
                });
            }
            Err(_) => {
                for path in &paths {
                    log_removal(path, std::fs::remove_file(path));
                }
            }
        }
    }
}

fn spawn_backstop(state: Arc<GuardState>, grace_period: Duration) -> Option<oneshot::Sender<()>> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

    handle.spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(grace_period) => {
                if state.claim() {
                    warn!(
                        "Temporary files not released after {:?}, removing {:?}",
                        grace_period, state.paths
                    );
                    remove_all(&state.paths).await;
                }
            }
            _ = cancel_rx => {}
        }
    });

    Some(cancel_tx)
}

async fn remove_all(paths: &[PathBuf]) {
    for path in paths {
        remove_path(path).await;
    }
}

async fn remove_path(path: &Path) -> bool {
    log_removal(path, fs::remove_file(path).await)
}

fn log_removal(path: &Path, result: std::io::Result<()>) -> bool {
    match result {
        Ok(()) => {
            debug!("Removed temporary file {:?}", path);
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("Temporary file {:?} already gone", path);
            false
        }
        Err(e) => {
            warn!("Failed to remove temporary file {:?}: {}", path, e);
            metrics::record_cleanup_failure();
            false
        }
    }
}

/// Lowercased alphanumeric extension of `filename`, if it has a usable one.
pub fn sanitize_extension(filename: &str) -> Option<String> {
    let extension = Path::new(filename).extension()?.to_str()?;
    if extension.is_empty()
        || extension.len() > MAX_EXTENSION_LEN
        || !extension.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}
