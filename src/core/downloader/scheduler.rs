use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::integrity::hash::{self, HashAlgorithm, StreamingHasher};
use crate::core::manifest::FileEntry;

use super::source::FileSource;

pub const DEFAULT_CONCURRENCY: usize = 2;
pub const DEFAULT_VISIBILITY_ATTEMPTS: u32 = 5;
pub const DEFAULT_VISIBILITY_DELAY: Duration = Duration::from_millis(200);

/// A single file to fetch. Built per run and thrown away afterwards.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub entry: FileEntry,
    pub dest: PathBuf,
    pub url: String,
    /// Failure of a critical task fails the whole run.
    pub critical: bool,
}

impl DownloadTask {
    pub fn file_name(&self) -> &str {
        self.entry.file_name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Downloaded { bytes: u64 },
    /// Destination already existed.
    Skipped,
}

/// Callbacks from the pool. Calls for different tasks interleave.
pub trait TransferObserver: Send + Sync {
    fn on_bytes(&self, _task: &DownloadTask, _received: u64, _total: Option<u64>) {}
    fn on_settled(&self, _task: &DownloadTask, _outcome: &LauncherResult<TransferOutcome>) {}
}

pub struct NoopObserver;

impl TransferObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
    pub critical: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TransferSummary {
    pub downloaded: Vec<String>,
    pub skipped: usize,
    pub failures: Vec<FileFailure>,
}

impl TransferSummary {
    pub fn critical_failure(&self) -> Option<&FileFailure> {
        self.failures.iter().find(|f| f.critical)
    }
}

/// Bounded pool of streaming transfers.
///
/// No retries inside a run: a failed file is reported and picked up again by
/// the next run's integrity check.
pub struct DownloadScheduler {
    source: Arc<dyn FileSource>,
    concurrency: usize,
    visibility_attempts: u32,
    visibility_delay: Duration,
}

impl DownloadScheduler {
    pub fn new(source: Arc<dyn FileSource>) -> Self {
        Self {
            source,
            concurrency: DEFAULT_CONCURRENCY,
            visibility_attempts: DEFAULT_VISIBILITY_ATTEMPTS,
            visibility_delay: DEFAULT_VISIBILITY_DELAY,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_visibility_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.visibility_attempts = attempts.max(1);
        self.visibility_delay = delay;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every task with at most `concurrency` transfers in flight.
    /// A new task is admitted as soon as any in-flight one settles.
    pub async fn run(
        &self,
        tasks: Vec<DownloadTask>,
        observer: &dyn TransferObserver,
    ) -> TransferSummary {
        info!(
            "Starting batch download: {} files, concurrency={}",
            tasks.len(),
            self.concurrency
        );

        let results: Vec<_> = stream::iter(tasks)
            .map(|task| async move {
                let result = self.transfer(&task, observer).await;
                observer.on_settled(&task, &result);
                (task, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = TransferSummary::default();
        for (task, result) in results {
            match result {
                Ok(TransferOutcome::Downloaded { .. }) => summary.downloaded.push(task.entry.path),
                Ok(TransferOutcome::Skipped) => summary.skipped += 1,
                Err(err) => {
                    warn!("Download of {} failed: {}", task.entry.path, err);
                    summary.failures.push(FileFailure {
                        path: task.entry.path,
                        reason: err.to_string(),
                        critical: task.critical,
                    });
                }
            }
        }

        info!(
            "Batch finished: {} downloaded, {} skipped, {} failed",
            summary.downloaded.len(),
            summary.skipped,
            summary.failures.len()
        );
        summary
    }

    /// Fetch one file unless it already exists.
    pub async fn transfer(
        &self,
        task: &DownloadTask,
        observer: &dyn TransferObserver,
    ) -> LauncherResult<TransferOutcome> {
        if is_file(&task.dest).await {
            debug!("Already present, skipping: {:?}", task.dest);
            return Ok(TransferOutcome::Skipped);
        }

        if let Some(parent) = task.dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let expected = task.entry.strong_hash();
        let mut hasher = expected
            .and_then(HashAlgorithm::detect)
            .map(StreamingHasher::new);

        let written = match self.stream_to_disk(task, hasher.as_mut(), observer).await {
            Ok(written) => written,
            Err(err) => {
                // A truncated file would pass the next run's existence check.
                let _ = tokio::fs::remove_file(&task.dest).await;
                return Err(err);
            }
        };

        self.wait_until_visible(&task.dest).await?;

        if let (Some(expected), Some(hasher)) = (expected, hasher) {
            let actual = hasher.finalize_hex();
            if !hash::digests_match(expected, &actual) {
                let _ = tokio::fs::remove_file(&task.dest).await;
                return Err(LauncherError::HashMismatch {
                    path: task.dest.clone(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        debug!("Downloaded: {} -> {:?}", task.url, task.dest);
        Ok(TransferOutcome::Downloaded { bytes: written })
    }

    async fn stream_to_disk(
        &self,
        task: &DownloadTask,
        mut hasher: Option<&mut StreamingHasher>,
        observer: &dyn TransferObserver,
    ) -> LauncherResult<u64> {
        let mut remote = self.source.open(&task.url).await?;
        let total = remote.total_bytes.or(Some(task.entry.size).filter(|s| *s > 0));
        let io_err = |e: std::io::Error| LauncherError::Io {
            path: task.dest.clone(),
            source: e,
        };

        let mut received = 0u64;
        // The handle must be dropped before the existence re-check.
        {
            let mut file = tokio::fs::File::create(&task.dest).await.map_err(io_err)?;
            while let Some(chunk) = remote.body.next().await {
                let chunk = chunk?;
                if let Some(hasher) = hasher.as_deref_mut() {
                    hasher.update(&chunk);
                }
                file.write_all(&chunk).await.map_err(io_err)?;
                received += chunk.len() as u64;
                observer.on_bytes(task, received, total);
            }
            file.flush().await.map_err(io_err)?;
        }

        Ok(received)
    }

    async fn wait_until_visible(&self, path: &Path) -> LauncherResult<()> {
        for attempt in 1..=self.visibility_attempts {
            if is_file(path).await {
                return Ok(());
            }
            debug!(
                "{:?} not visible yet (attempt {}/{})",
                path, attempt, self.visibility_attempts
            );
            tokio::time::sleep(self.visibility_delay).await;
        }
        Err(LauncherError::FileNotVisible(path.to_path_buf()))
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures_util::stream::{self, StreamExt};

    use super::super::source::{FileSource, RemoteFile};
    use crate::core::error::{LauncherError, LauncherResult};

    /// In-memory source that records how many transfers overlap.
    #[derive(Default)]
    pub struct FakeSource {
        pub files: Mutex<HashMap<String, Vec<u8>>>,
        pub opened: Mutex<Vec<String>>,
        pub active: AtomicUsize,
        pub max_active: AtomicUsize,
        pub latency_ms: u64,
    }

    impl FakeSource {
        pub fn with_latency(latency_ms: u64) -> Self {
            Self {
                latency_ms,
                ..Self::default()
            }
        }

        pub fn serve(&self, url: &str, body: &[u8]) {
            self.files
                .lock()
                .unwrap()
                .insert(url.to_string(), body.to_vec());
        }

        pub fn opened(&self) -> Vec<String> {
            self.opened.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FileSource for FakeSource {
        async fn open(&self, url: &str) -> LauncherResult<RemoteFile> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.opened.lock().unwrap().push(url.to_string());
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            let body = self.files.lock().unwrap().get(url).cloned();
            match body {
                Some(body) => {
                    let total = body.len() as u64;
                    let chunks: Vec<LauncherResult<Vec<u8>>> =
                        body.chunks(4).map(|c| Ok(c.to_vec())).collect();
                    Ok(RemoteFile {
                        total_bytes: Some(total),
                        body: stream::iter(chunks).boxed(),
                    })
                }
                None => Err(LauncherError::DownloadFailed {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::FakeSource;
    use super::*;
    use crate::core::manifest::FileKind;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("scheduler-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn task(root: &Path, path: &str, hash: Option<String>, critical: bool) -> DownloadTask {
        DownloadTask {
            entry: FileEntry {
                path: path.to_string(),
                content_hash: hash,
                size: 0,
                kind: FileKind::Client,
            },
            dest: root.join(path),
            url: format!("mem://{path}"),
            critical,
        }
    }

    #[tokio::test]
    async fn pool_never_exceeds_concurrency() {
        let root = temp_root("bounded");
        let source = Arc::new(FakeSource::with_latency(20));
        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let path = format!("mods/mod{i}.jar");
                source.serve(&format!("mem://{path}"), b"payload");
                task(&root, &path, None, false)
            })
            .collect();

        let scheduler = DownloadScheduler::new(source.clone()).with_concurrency(2);
        let summary = scheduler.run(tasks, &NoopObserver).await;

        assert_eq!(summary.downloaded.len(), 10);
        assert!(summary.failures.is_empty());
        assert_eq!(source.opened().len(), 10);
        assert_eq!(source.max_active.load(Ordering::SeqCst), 2);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn existing_files_are_skipped_and_parents_created() {
        let root = temp_root("skip");
        std::fs::write(root.join("client.jar"), b"old").unwrap();
        let source = Arc::new(FakeSource::default());
        source.serve("mem://natives/deep/lib.so", b"native");

        let summary = DownloadScheduler::new(source.clone())
            .run(
                vec![
                    task(&root, "client.jar", None, true),
                    task(&root, "natives/deep/lib.so", None, false),
                ],
                &NoopObserver,
            )
            .await;

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.downloaded, vec!["natives/deep/lib.so".to_string()]);
        assert_eq!(source.opened(), vec!["mem://natives/deep/lib.so".to_string()]);
        assert_eq!(std::fs::read(root.join("natives/deep/lib.so")).unwrap(), b"native");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn hash_mismatch_removes_file_and_fails_task() {
        let root = temp_root("mismatch");
        let source = Arc::new(FakeSource::default());
        source.serve("mem://client.jar", b"tampered");
        let expected = hash::hash_bytes(HashAlgorithm::Sha1, b"original");

        let summary = DownloadScheduler::new(source)
            .run(vec![task(&root, "client.jar", Some(expected), true)], &NoopObserver)
            .await;

        let failure = summary.critical_failure().unwrap();
        assert_eq!(failure.path, "client.jar");
        assert!(failure.reason.contains("Hash mismatch"));
        assert!(!root.join("client.jar").exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn failures_do_not_stop_other_tasks() {
        let root = temp_root("failsoft");
        let source = Arc::new(FakeSource::default());
        source.serve("mem://a.txt", b"a");
        source.serve("mem://c.txt", b"c");

        let summary = DownloadScheduler::new(source)
            .run(
                vec![
                    task(&root, "a.txt", None, false),
                    task(&root, "b.txt", None, false),
                    task(&root, "c.txt", None, false),
                ],
                &NoopObserver,
            )
            .await;

        assert_eq!(summary.downloaded.len(), 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].path, "b.txt");
        assert!(summary.critical_failure().is_none());
        let _ = std::fs::remove_dir_all(&root);
    }
}
