use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::downloader::{
    DownloadScheduler, DownloadTask, FileSource, TransferObserver, TransferOutcome,
};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::endpoint_with_query;
use crate::core::install::{asset_object_relative, LocalInstall};
use crate::core::integrity::checker::file_exists;
use crate::core::manifest::{FileEntry, FileKind};
use crate::core::sync::{ProgressReporter, Stage};

use super::asset_index::AssetIndex;

pub const DEFAULT_PROGRESS_EVERY: usize = 100;
const REMOTE_INDEX_PATH: &str = "index.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSource {
    Fetched,
    /// Backend unreachable; a previously saved index was used.
    Cached,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReport {
    pub index_source: IndexSource,
    pub total_objects: usize,
    pub already_present: usize,
    pub downloaded: usize,
    pub failed: usize,
}

impl AssetReport {
    fn unavailable() -> Self {
        Self {
            index_source: IndexSource::Unavailable,
            total_objects: 0,
            already_present: 0,
            downloaded: 0,
            failed: 0,
        }
    }
}

/// Fills the shared content-addressed asset store.
///
/// Assets never block a launch, so nothing here returns an error: every
/// failure is logged and counted in the [`AssetReport`].
pub struct AssetFetcher {
    source: Arc<dyn FileSource>,
    api_base_url: String,
    concurrency: usize,
    progress_every: usize,
    visibility_delay: Duration,
}

impl AssetFetcher {
    pub fn new(source: Arc<dyn FileSource>, api_base_url: impl Into<String>) -> Self {
        Self {
            source,
            api_base_url: api_base_url.into(),
            concurrency: crate::core::downloader::scheduler::DEFAULT_CONCURRENCY,
            progress_every: DEFAULT_PROGRESS_EVERY,
            visibility_delay: crate::core::downloader::scheduler::DEFAULT_VISIBILITY_DELAY,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_progress_every(mut self, n: usize) -> Self {
        self.progress_every = n.max(1);
        self
    }

    pub fn with_visibility_delay(mut self, delay: Duration) -> Self {
        self.visibility_delay = delay;
        self
    }

    /// `GET {api}/updates/{profileId}/asset/file?path=..`
    pub fn asset_url(&self, profile_id: &str, path: &str) -> LauncherResult<String> {
        endpoint_with_query(
            &self.api_base_url,
            &format!("updates/{profile_id}/asset/file"),
            &[("path", path)],
        )
    }

    #[instrument(skip(self, install, reporter))]
    pub async fn fetch(
        &self,
        profile_id: &str,
        asset_index: &str,
        install: &LocalInstall,
        reporter: &ProgressReporter,
    ) -> AssetReport {
        let Some((index, index_source)) = self.load_index(profile_id, asset_index, install).await
        else {
            warn!("No asset index {} available, skipping assets", asset_index);
            return AssetReport::unavailable();
        };

        let objects = index.unique_objects();
        let total_objects = objects.len();
        let mut tasks = Vec::new();
        for object in objects {
            let dest = install.asset_object_path(&object.hash);
            if file_exists(&dest).await {
                continue;
            }
            let path = format!("objects/{}", asset_object_relative(&object.hash));
            let url = match self.asset_url(profile_id, &path) {
                Ok(url) => url,
                Err(err) => {
                    warn!("Skipping asset {}: {}", object.hash, err);
                    continue;
                }
            };
            tasks.push(DownloadTask {
                entry: FileEntry {
                    path,
                    content_hash: Some(object.hash.clone()),
                    size: object.size,
                    kind: FileKind::Asset,
                },
                dest,
                url,
                critical: false,
            });
        }

        let already_present = total_objects - tasks.len();
        info!(
            "Downloading {} asset objects ({} already cached)",
            tasks.len(),
            already_present
        );

        let observer = AssetProgress {
            reporter,
            total: tasks.len(),
            every: self.progress_every,
            settled: AtomicUsize::new(0),
        };
        let scheduler = DownloadScheduler::new(self.source.clone())
            .with_concurrency(self.concurrency)
            .with_visibility_retry(
                crate::core::downloader::scheduler::DEFAULT_VISIBILITY_ATTEMPTS,
                self.visibility_delay,
            );
        let summary = scheduler.run(tasks, &observer).await;
        if !summary.failures.is_empty() {
            warn!("{} asset downloads failed", summary.failures.len());
        }
        reporter.stage(Stage::Complete, 1.0, None, observer.total, summary.downloaded.len());

        AssetReport {
            index_source,
            total_objects,
            already_present,
            downloaded: summary.downloaded.len(),
            failed: summary.failures.len(),
        }
    }

    async fn load_index(
        &self,
        profile_id: &str,
        asset_index: &str,
        install: &LocalInstall,
    ) -> Option<(AssetIndex, IndexSource)> {
        let index_path = match install.asset_index_path(asset_index) {
            Ok(path) => path,
            Err(err) => {
                warn!("Refusing asset index name: {}", err);
                return None;
            }
        };
        match self.fetch_remote_index(profile_id).await {
            Ok(raw) => match AssetIndex::parse(&raw) {
                Ok(index) => {
                    if let Err(err) = persist(&index_path, &raw).await {
                        warn!("Could not save asset index: {}", err);
                    }
                    return Some((index, IndexSource::Fetched));
                }
                Err(err) => warn!("Asset index from backend is malformed: {}", err),
            },
            Err(err) => warn!("Asset index download failed: {}", err),
        }

        match AssetIndex::load(&index_path).await {
            Ok(index) => {
                info!("Using cached asset index {:?}", index_path);
                Some((index, IndexSource::Cached))
            }
            Err(_) => None,
        }
    }

    async fn fetch_remote_index(&self, profile_id: &str) -> LauncherResult<String> {
        let url = self.asset_url(profile_id, REMOTE_INDEX_PATH)?;
        let mut remote = self.source.open(&url).await?;
        let mut raw = Vec::new();
        while let Some(chunk) = remote.body.next().await {
            raw.extend_from_slice(&chunk?);
        }
        String::from_utf8(raw).map_err(|e| LauncherError::Other(format!("Asset index is not UTF-8: {e}")))
    }
}

async fn persist(path: &std::path::Path, raw: &str) -> LauncherResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LauncherError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    tokio::fs::write(path, raw)
        .await
        .map_err(|e| LauncherError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Publishes once every `every` settled objects, and once at the end.
struct AssetProgress<'a> {
    reporter: &'a ProgressReporter,
    total: usize,
    every: usize,
    settled: AtomicUsize,
}

impl TransferObserver for AssetProgress<'_> {
    fn on_settled(&self, _task: &DownloadTask, _outcome: &LauncherResult<TransferOutcome>) {
        let settled = self.settled.fetch_add(1, Ordering::SeqCst) + 1;
        if settled % self.every == 0 || settled == self.total {
            self.reporter.stage(
                Stage::Downloading,
                settled as f64 / self.total.max(1) as f64,
                Some("assets".to_string()),
                self.total,
                settled,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::downloader::scheduler::testing::FakeSource;
    use crate::core::integrity::hash::{hash_bytes, HashAlgorithm};

    fn temp_root(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("assets-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn index_json(bodies: &[&[u8]]) -> String {
        let objects: Vec<String> = bodies
            .iter()
            .enumerate()
            .map(|(i, body)| {
                format!(
                    "\"minecraft/sounds/{i}.ogg\": {{\"hash\": \"{}\", \"size\": {}}}",
                    hash_bytes(HashAlgorithm::Sha1, body),
                    body.len()
                )
            })
            .collect();
        format!("{{\"objects\": {{{}}}}}", objects.join(","))
    }

    #[tokio::test]
    async fn downloads_only_missing_objects_and_saves_index() {
        let root = temp_root("missing");
        let install = LocalInstall::new(&root, "Industrial");
        let bodies: Vec<Vec<u8>> = (0..5).map(|i| format!("sound {i}").into_bytes()).collect();
        let refs: Vec<&[u8]> = bodies.iter().map(Vec::as_slice).collect();

        let source = Arc::new(FakeSource::default());
        let fetcher = AssetFetcher::new(source.clone(), "http://backend.test")
            .with_progress_every(2)
            .with_visibility_delay(Duration::from_millis(1));
        source.serve(&fetcher.asset_url("42", "index.json").unwrap(), index_json(&refs).as_bytes());
        for body in &bodies {
            let hash = hash_bytes(HashAlgorithm::Sha1, body);
            let path = format!("objects/{}", asset_object_relative(&hash));
            source.serve(&fetcher.asset_url("42", &path).unwrap(), body);
        }

        let present = install.asset_object_path(&hash_bytes(HashAlgorithm::Sha1, &bodies[0]));
        std::fs::create_dir_all(present.parent().unwrap()).unwrap();
        std::fs::write(&present, &bodies[0]).unwrap();

        let (reporter, mut rx) = ProgressReporter::channel(None);
        let report = fetcher.fetch("42", "1.12", &install, &reporter).await;

        assert_eq!(report.index_source, IndexSource::Fetched);
        assert_eq!(report.total_objects, 5);
        assert_eq!(report.already_present, 1);
        assert_eq!(report.downloaded, 4);
        assert_eq!(report.failed, 0);
        assert!(install.asset_index_path("1.12").unwrap().is_file());
        // index + four objects
        assert_eq!(source.opened().len(), 5);

        let stages: Vec<Stage> = std::iter::from_fn(|| rx.try_recv().ok()).map(|p| p.stage).collect();
        assert_eq!(
            stages,
            vec![Stage::Downloading, Stage::Downloading, Stage::Complete]
        );
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn hashes_that_are_not_digests_are_never_written() {
        let root = temp_root("traversal");
        let updates = root.join("updates");
        let install = LocalInstall::new(&updates, "Industrial");
        let body = b"real sound".as_slice();
        let good = hash_bytes(HashAlgorithm::Sha1, body);
        let index = format!(
            "{{\"objects\": {{\"a.ogg\": {{\"hash\": \"{good}\", \"size\": {}}}, \
             \"evil\": {{\"hash\": \"../../pwned\", \"size\": 4}}}}}}",
            body.len()
        );

        let source = Arc::new(FakeSource::default());
        let fetcher = AssetFetcher::new(source.clone(), "http://backend.test")
            .with_visibility_delay(Duration::from_millis(1));
        source.serve(&fetcher.asset_url("42", "index.json").unwrap(), index.as_bytes());
        source.serve(
            &fetcher
                .asset_url("42", &format!("objects/{}", asset_object_relative(&good)))
                .unwrap(),
            body,
        );
        let escape_url = fetcher
            .asset_url("42", &format!("objects/{}", asset_object_relative("../../pwned")))
            .unwrap();
        source.serve(&escape_url, b"evil");

        let report = fetcher
            .fetch("42", "1.12", &install, &ProgressReporter::silent())
            .await;

        assert_eq!(report.total_objects, 1);
        assert_eq!(report.downloaded, 1);
        assert!(!source.opened().contains(&escape_url));
        assert!(!root.join("pwned").exists());
        assert!(!updates.join("pwned").exists());

        let rejected = fetcher
            .fetch("42", "../../pwned", &install, &ProgressReporter::silent())
            .await;
        assert_eq!(rejected.index_source, IndexSource::Unavailable);
        assert!(!root.join("pwned.json").exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn falls_back_to_saved_index() {
        let root = temp_root("cached");
        let install = LocalInstall::new(&root, "Industrial");
        let body = b"cached sound".as_slice();
        let index_path = install.asset_index_path("1.7.10").unwrap();
        std::fs::create_dir_all(index_path.parent().unwrap()).unwrap();
        std::fs::write(&index_path, index_json(&[body])).unwrap();

        let source = Arc::new(FakeSource::default());
        let fetcher = AssetFetcher::new(source.clone(), "http://backend.test")
            .with_visibility_delay(Duration::from_millis(1));

        let report = fetcher
            .fetch("42", "1.7.10", &install, &ProgressReporter::silent())
            .await;
        assert_eq!(report.index_source, IndexSource::Cached);
        assert_eq!(report.total_objects, 1);
        assert_eq!(report.failed, 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn missing_index_everywhere_is_not_an_error() {
        let root = temp_root("unavailable");
        let install = LocalInstall::new(&root, "Industrial");
        let fetcher = AssetFetcher::new(Arc::new(FakeSource::default()), "http://backend.test");

        let report = fetcher
            .fetch("42", "1.12", &install, &ProgressReporter::silent())
            .await;
        assert_eq!(report.index_source, IndexSource::Unavailable);
        assert_eq!(report.downloaded, 0);
        let _ = std::fs::remove_dir_all(&root);
    }
}
