//! Waits for a browser-triggered download to land in a directory.
//!
//! An [`ExportJob`] captures the directory contents *before* the triggering
//! click. Every tick the directory is listed again and compared against that
//! baseline, so files that existed beforehand are never mistaken for the export.

mod listing;

pub use listing::{
    classify, pick_latest, snapshot, Candidates, DirectoryLister, FileEntry, FsDirectory, Pick,
    WatchRules, DEFAULT_PARTIAL_SUFFIXES,
};

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::error::WatchError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ExportJob {
    pub directory: PathBuf,
    pub baseline: HashSet<String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub rules: WatchRules,
    pub require_unambiguous: bool,
}

impl ExportJob {
    /// Snapshots `directory` now. Call immediately before the click.
    pub fn begin(directory: impl Into<PathBuf>, rules: WatchRules, timeout: Duration) -> Result<Self, WatchError> {
        let directory = directory.into();
        let baseline = snapshot(&FsDirectory::new(&directory)).map_err(|source| WatchError::Directory {
            path: directory.clone(),
            source,
        })?;
        tracing::debug!(dir = %directory.display(), files = baseline.len(), "Captured download baseline");
        Ok(Self::with_baseline(directory, baseline, rules, timeout))
    }

    pub fn with_baseline(
        directory: impl Into<PathBuf>,
        baseline: HashSet<String>,
        rules: WatchRules,
        timeout: Duration,
    ) -> Self {
        Self {
            directory: directory.into(),
            baseline,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
            rules,
            require_unambiguous: false,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn require_unambiguous(mut self, strict: bool) -> Self {
        self.require_unambiguous = strict;
        self
    }

    /// Polls the job's directory on disk until a finished file appears.
    pub async fn await_new_file(&self) -> Result<PathBuf, WatchError> {
        await_new_file(&FsDirectory::new(&self.directory), self).await
    }
}

/// Polls `lister` until a finished, non-baseline file shows up or the job
/// times out. The triggering action is never retried here.
pub async fn await_new_file<L: DirectoryLister + ?Sized>(lister: &L, job: &ExportJob) -> Result<PathBuf, WatchError> {
    let start = Instant::now();
    let mut observed = Vec::new();

    loop {
        match lister.list() {
            Ok(listing) => {
                let candidates = classify(&listing, &job.baseline, &job.rules);
                observed = candidates.names();

                match pick_latest(&candidates.complete, job.require_unambiguous) {
                    Pick::Latest(entry) => {
                        let path = job.directory.join(&entry.name);
                        tracing::info!(
                            file = %path.display(),
                            elapsed = ?start.elapsed(),
                            "Download completed"
                        );
                        return Ok(path);
                    }
                    Pick::Tied(entries) => {
                        return Err(WatchError::AmbiguousResult {
                            directory: job.directory.clone(),
                            candidates: entries.into_iter().map(|e| e.name.clone()).collect(),
                        });
                    }
                    Pick::Nothing => {
                        if !candidates.pending.is_empty() {
                            tracing::debug!(pending = ?candidates.pending, "Download still in progress");
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(dir = %job.directory.display(), error = %e, "Failed to list download directory");
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= job.timeout {
            tracing::error!(
                dir = %job.directory.display(),
                ?elapsed,
                ?observed,
                "Timed out waiting for download"
            );
            return Err(WatchError::TimedOut {
                directory: job.directory.clone(),
                elapsed,
                observed,
            });
        }

        sleep(job.poll_interval.min(job.timeout - elapsed)).await;
    }
}
