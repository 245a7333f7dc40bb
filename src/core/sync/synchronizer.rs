// ─── Synchronizer ───
// Converges a local install onto its manifest: check, remove stale files,
// download what is missing, verify again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::core::downloader::{
    DownloadScheduler, DownloadTask, FileFailure, FileSource, TransferObserver, TransferOutcome,
};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::endpoint_with_query;
use crate::core::install::LocalInstall;
use crate::core::integrity::{AssetSampling, IntegrityChecker, VerifyMode, VerifyReport};
use crate::core::manifest::VersionManifest;

use super::progress::{ProgressReporter, Stage};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub verify_mode: VerifyMode,
    pub sampling: AssetSampling,
    pub visibility_attempts: u32,
    pub visibility_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            verify_mode: VerifyMode::Full,
            sampling: AssetSampling::default(),
            visibility_attempts: 5,
            visibility_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub downloaded: Vec<String>,
    pub skipped: usize,
    /// Files deleted before the pool ran because their content was wrong.
    pub removed_stale: Vec<String>,
    /// Non-critical failures; the next run retries them.
    pub warnings: Vec<FileFailure>,
    pub final_report: VerifyReport,
}

pub struct Synchronizer {
    source: Arc<dyn FileSource>,
    api_base_url: String,
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(source: Arc<dyn FileSource>, api_base_url: impl Into<String>, options: SyncOptions) -> Self {
        Self {
            source,
            api_base_url: api_base_url.into(),
            options,
        }
    }

    fn checker(&self) -> IntegrityChecker {
        IntegrityChecker::new(self.options.verify_mode, self.options.sampling)
    }

    /// `GET {api}/client-versions/{versionId}/file?path=..&clientDirectory=..`
    pub fn file_url(&self, manifest: &VersionManifest, relative: &str) -> LauncherResult<String> {
        endpoint_with_query(
            &self.api_base_url,
            &format!("client-versions/{}/file", manifest.version_id),
            &[
                ("path", relative),
                ("clientDirectory", manifest.client_directory.as_str()),
            ],
        )
    }

    /// Bring `install` in line with `manifest`.
    ///
    /// Only a failure of the primary archive is an error; every other failed
    /// file ends up in [`SyncReport::warnings`].
    #[instrument(skip_all, fields(directory = %install.client_directory))]
    pub async fn synchronize(
        &self,
        manifest: &VersionManifest,
        install: &LocalInstall,
        concurrency: usize,
        reporter: &ProgressReporter,
    ) -> LauncherResult<SyncReport> {
        let ensure_current = || match reporter.ticket() {
            Some(ticket) => ticket.ensure_current(),
            None => Ok(()),
        };

        ensure_current()?;
        info!("Checking {} declared files", manifest.files.len());
        reporter.stage(Stage::Checking, 0.0, None, 0, 0);

        let precheck = self
            .checker()
            .verify_observed(Some(manifest), install, |index, total, path| {
                let fraction = index as f64 / total.max(1) as f64;
                reporter.stage(Stage::Checking, fraction, Some(path.to_string()), total, 0);
            })
            .await?;

        let mut removed_stale = Vec::new();
        for path in precheck.stale_paths() {
            let absolute = install.resolve(path)?;
            match tokio::fs::remove_file(&absolute).await {
                Ok(()) => {
                    info!("Removed stale file {}", path);
                    removed_stale.push(path.to_string());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(LauncherError::Io {
                        path: absolute,
                        source: e,
                    })
                }
            }
        }

        ensure_current()?;

        let tasks = self.build_tasks(manifest, install);
        let total_files = tasks.len();
        info!(
            "Downloading up to {} files with concurrency {}",
            total_files, concurrency
        );
        reporter.stage(Stage::Downloading, 0.0, None, total_files, 0);

        let scheduler = DownloadScheduler::new(self.source.clone())
            .with_concurrency(concurrency)
            .with_visibility_retry(self.options.visibility_attempts, self.options.visibility_delay);
        let observer = DownloadProgress::new(reporter, total_files);
        let summary = scheduler.run(tasks, &observer).await;

        if let Some(failure) = summary.critical_failure() {
            error!("Primary archive {} failed: {}", failure.path, failure.reason);
            return Err(LauncherError::CriticalFileFailed {
                path: failure.path.clone(),
                reason: failure.reason.clone(),
            });
        }

        ensure_current()?;
        reporter.stage(Stage::Verifying, 0.0, None, total_files, total_files);

        let final_report = self.checker().verify(Some(manifest), install).await?;
        if !final_report.client_ready() {
            warn!(
                "{} file(s) still not ready after synchronization",
                final_report.problems.len()
            );
        }

        reporter.stage(Stage::Complete, 1.0, None, total_files, total_files);
        info!(
            "Synchronization finished: {} downloaded, {} skipped, {} warnings",
            summary.downloaded.len(),
            summary.skipped,
            summary.failures.len()
        );

        Ok(SyncReport {
            downloaded: summary.downloaded,
            skipped: summary.skipped,
            removed_stale,
            warnings: summary.failures,
            final_report,
        })
    }

    fn build_tasks(&self, manifest: &VersionManifest, install: &LocalInstall) -> Vec<DownloadTask> {
        manifest
            .client_files()
            .filter_map(|entry| {
                let dest = match install.resolve(&entry.path) {
                    Ok(dest) => dest,
                    Err(err) => {
                        warn!("Skipping manifest entry: {}", err);
                        return None;
                    }
                };
                let url = match self.file_url(manifest, &entry.path) {
                    Ok(url) => url,
                    Err(err) => {
                        warn!("Skipping {}: {}", entry.path, err);
                        return None;
                    }
                };
                Some(DownloadTask {
                    critical: install.is_primary_archive(&entry.path),
                    entry: entry.clone(),
                    dest,
                    url,
                })
            })
            .collect()
    }
}

/// Turns per-file byte counts into the aggregate download percentage.
/// Each file owns an equal slice; bytes fill the slice proportionally.
struct DownloadProgress<'a> {
    reporter: &'a ProgressReporter,
    total_files: usize,
    state: Mutex<DownloadState>,
}

#[derive(Default)]
struct DownloadState {
    settled: usize,
    in_flight: HashMap<String, f64>,
}

impl<'a> DownloadProgress<'a> {
    fn new(reporter: &'a ProgressReporter, total_files: usize) -> Self {
        Self {
            reporter,
            total_files,
            state: Mutex::new(DownloadState::default()),
        }
    }

    fn publish(&self, state: &DownloadState, file_name: &str) {
        let partial: f64 = state.in_flight.values().sum();
        let fraction = (state.settled as f64 + partial) / self.total_files.max(1) as f64;
        self.reporter.stage(
            Stage::Downloading,
            fraction,
            Some(file_name.to_string()),
            self.total_files,
            state.settled,
        );
    }
}

impl TransferObserver for DownloadProgress<'_> {
    fn on_bytes(&self, task: &DownloadTask, received: u64, total: Option<u64>) {
        let Some(total) = total.filter(|t| *t > 0) else {
            return;
        };
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let fraction = (received as f64 / total as f64).min(1.0);
        state.in_flight.insert(task.entry.path.clone(), fraction);
        self.publish(&state, task.file_name());
    }

    fn on_settled(&self, task: &DownloadTask, _outcome: &LauncherResult<TransferOutcome>) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.in_flight.remove(&task.entry.path);
        state.settled += 1;
        self.publish(&state, task.file_name());
    }
}
