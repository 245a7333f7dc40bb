// ─── Integrity Checker ───
// Read-only comparison of a local install against the server manifest.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::assets::AssetIndex;
use crate::core::error::LauncherResult;
use crate::core::install::LocalInstall;
use crate::core::manifest::{FileEntry, VersionManifest};

use super::hash::{self, HashAlgorithm};

/// `Full` hashes every file with a strong digest; `Fast` only checks existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    Full,
    Fast,
}

/// Bounded asset sampling.
///
/// Checking every object of a large asset index is too slow before each
/// launch, so only the first `sample_size` objects are probed. This is an
/// approximation: a ready verdict does not prove the whole store is intact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssetSampling {
    pub sample_size: usize,
    /// Fraction of sampled objects that must be present.
    pub ready_ratio: f64,
}

impl Default for AssetSampling {
    fn default() -> Self {
        Self {
            sample_size: 10,
            ready_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileProblem {
    Missing,
    HashMismatch { expected: String, actual: String },
    Unreadable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemFile {
    pub path: String,
    pub problem: FileProblem,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssetCheck {
    /// The version does not reference an asset index.
    NotDeclared,
    IndexMissing,
    Sampled {
        sampled: usize,
        present: usize,
        ready: bool,
    },
}

impl AssetCheck {
    pub fn is_ready(&self) -> bool {
        match self {
            AssetCheck::NotDeclared => true,
            AssetCheck::IndexMissing => false,
            AssetCheck::Sampled { ready, .. } => *ready,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady(Vec<String>),
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub problems: Vec<ProblemFile>,
    pub assets: AssetCheck,
    /// No manifest was available; only the primary archive was probed.
    pub degraded: bool,
    pub checked_files: usize,
}

impl VerifyReport {
    /// Client readiness. Assets never block launch on their own.
    pub fn readiness(&self) -> Readiness {
        if self.problems.is_empty() {
            Readiness::Ready
        } else {
            Readiness::NotReady(self.problems.iter().map(|p| p.path.clone()).collect())
        }
    }

    pub fn client_ready(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn fully_ready(&self) -> bool {
        self.client_ready() && self.assets.is_ready()
    }

    /// Files that exist but must be replaced.
    pub fn stale_paths(&self) -> impl Iterator<Item = &str> {
        self.problems
            .iter()
            .filter(|p| !matches!(p.problem, FileProblem::Missing))
            .map(|p| p.path.as_str())
    }
}

pub struct IntegrityChecker {
    mode: VerifyMode,
    sampling: AssetSampling,
}

impl Default for IntegrityChecker {
    fn default() -> Self {
        Self::new(VerifyMode::Full, AssetSampling::default())
    }
}

impl IntegrityChecker {
    pub fn new(mode: VerifyMode, sampling: AssetSampling) -> Self {
        Self { mode, sampling }
    }

    pub async fn verify(
        &self,
        manifest: Option<&VersionManifest>,
        install: &LocalInstall,
    ) -> LauncherResult<VerifyReport> {
        self.verify_observed(manifest, install, |_, _, _| {}).await
    }

    /// Same as [`verify`](Self::verify), calling `on_file(index, total, path)`
    /// before each client file is examined.
    pub async fn verify_observed<F>(
        &self,
        manifest: Option<&VersionManifest>,
        install: &LocalInstall,
        mut on_file: F,
    ) -> LauncherResult<VerifyReport>
    where
        F: FnMut(usize, usize, &str),
    {
        let manifest = match manifest.filter(|m| m.has_files()) {
            Some(manifest) => manifest,
            None => return Ok(self.verify_degraded(install, manifest).await),
        };

        let entries: Vec<&FileEntry> = manifest.client_files().collect();
        let total = entries.len();
        let mut problems = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            on_file(index, total, &entry.path);
            if let Some(problem) = self.check_entry(entry, install).await {
                debug!("Integrity problem for {}: {:?}", entry.path, problem);
                problems.push(ProblemFile {
                    path: entry.path.clone(),
                    problem,
                });
            }
        }

        let assets = self
            .check_assets(manifest.asset_index.as_deref(), install)
            .await;

        info!(
            "Verified {} client files in {}: {} problem(s), assets {:?}",
            total,
            install.client_directory,
            problems.len(),
            assets
        );

        Ok(VerifyReport {
            problems,
            assets,
            degraded: false,
            checked_files: total,
        })
    }

    /// Without a server manifest, the primary archive's presence is the only
    /// available signal.
    async fn verify_degraded(
        &self,
        install: &LocalInstall,
        manifest: Option<&VersionManifest>,
    ) -> VerifyReport {
        let archive = install.primary_archive_path();
        let problems = if file_exists(&archive).await {
            Vec::new()
        } else {
            vec![ProblemFile {
                path: install.primary_archive.clone(),
                problem: FileProblem::Missing,
            }]
        };

        let assets = match manifest.and_then(|m| m.asset_index.as_deref()) {
            Some(index) => self.check_assets(Some(index), install).await,
            None => AssetCheck::NotDeclared,
        };

        info!(
            "No manifest for {}; primary archive present: {}",
            install.client_directory,
            problems.is_empty()
        );

        VerifyReport {
            problems,
            assets,
            degraded: true,
            checked_files: 1,
        }
    }

    /// `None` when the file is acceptable.
    pub async fn check_entry(
        &self,
        entry: &FileEntry,
        install: &LocalInstall,
    ) -> Option<FileProblem> {
        let path = match install.resolve(&entry.path) {
            Ok(path) => path,
            Err(err) => {
                warn!("Ignoring manifest entry: {}", err);
                return None;
            }
        };

        if !file_exists(&path).await {
            return Some(FileProblem::Missing);
        }

        if self.mode == VerifyMode::Fast {
            return None;
        }

        let expected = entry.strong_hash()?;
        let algorithm = HashAlgorithm::detect(expected)?;
        match hash::hash_file(&path, algorithm).await {
            Ok(actual) if hash::digests_match(expected, &actual) => None,
            Ok(actual) => Some(FileProblem::HashMismatch {
                expected: expected.to_string(),
                actual,
            }),
            Err(err) => Some(FileProblem::Unreadable {
                reason: err.to_string(),
            }),
        }
    }

    pub async fn check_assets(&self, asset_index: Option<&str>, install: &LocalInstall) -> AssetCheck {
        let Some(asset_index) = asset_index else {
            return AssetCheck::NotDeclared;
        };

        let index_path = match install.asset_index_path(asset_index) {
            Ok(path) => path,
            Err(err) => {
                warn!("Asset index name rejected: {}", err);
                return AssetCheck::IndexMissing;
            }
        };
        if !file_exists(&index_path).await {
            return AssetCheck::IndexMissing;
        }

        let index = match AssetIndex::load(&index_path).await {
            Ok(index) => index,
            Err(err) => {
                warn!("Asset index {:?} is unreadable: {}", index_path, err);
                return AssetCheck::IndexMissing;
            }
        };

        let sample: Vec<_> = index
            .unique_objects()
            .into_iter()
            .take(self.sampling.sample_size)
            .collect();
        let sampled = sample.len();
        let mut present = 0;
        for object in sample {
            if file_exists(&install.asset_object_path(&object.hash)).await {
                present += 1;
            }
        }

        let ready = sampled == 0 || present as f64 >= sampled as f64 * self.sampling.ready_ratio;
        AssetCheck::Sampled {
            sampled,
            present,
            ready,
        }
    }
}

pub(crate) async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::FileKind;

    fn temp_root(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("integrity-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn manifest(files: Vec<FileEntry>, asset_index: Option<&str>) -> VersionManifest {
        VersionManifest {
            version_id: "1".into(),
            client_directory: "client".into(),
            jvm_version: None,
            asset_index: asset_index.map(str::to_string),
            files,
        }
    }

    fn client_file(path: &str, hash: Option<&str>) -> FileEntry {
        FileEntry {
            path: path.into(),
            content_hash: hash.map(str::to_string),
            size: 3,
            kind: FileKind::Client,
        }
    }

    #[tokio::test]
    async fn missing_client_file_is_not_ready() {
        let root = temp_root("missing");
        let install = LocalInstall::new(&root, "client");
        let manifest = manifest(vec![client_file("client.jar", Some("abc123"))], None);

        let report = IntegrityChecker::default()
            .verify(Some(&manifest), &install)
            .await
            .unwrap();

        assert_eq!(report.readiness(), Readiness::NotReady(vec!["client.jar".into()]));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn placeholder_hash_accepts_any_content() {
        let root = temp_root("placeholder");
        let install = LocalInstall::new(&root, "client");
        std::fs::create_dir_all(install.client_dir()).unwrap();
        std::fs::write(install.client_dir().join("options.txt"), b"whatever").unwrap();
        let zeros = "0".repeat(40);
        let manifest = manifest(vec![client_file("options.txt", Some(&zeros))], None);

        let report = IntegrityChecker::default()
            .verify(Some(&manifest), &install)
            .await
            .unwrap();

        assert_eq!(report.readiness(), Readiness::Ready);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn hash_mismatch_is_reported_unless_fast_mode() {
        let root = temp_root("mismatch");
        let install = LocalInstall::new(&root, "client");
        std::fs::create_dir_all(install.client_dir()).unwrap();
        std::fs::write(install.client_dir().join("client.jar"), b"abd").unwrap();
        let expected = hash::hash_bytes(HashAlgorithm::Sha1, b"abc");
        let manifest = manifest(vec![client_file("client.jar", Some(&expected))], None);

        let report = IntegrityChecker::default()
            .verify(Some(&manifest), &install)
            .await
            .unwrap();
        assert!(matches!(
            report.problems[0].problem,
            FileProblem::HashMismatch { .. }
        ));
        assert_eq!(report.stale_paths().collect::<Vec<_>>(), vec!["client.jar"]);

        let fast = IntegrityChecker::new(VerifyMode::Fast, AssetSampling::default());
        let report = fast.verify(Some(&manifest), &install).await.unwrap();
        assert!(report.client_ready());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn without_manifest_only_primary_archive_matters() {
        let root = temp_root("degraded");
        let install = LocalInstall::new(&root, "1.7.10");

        let report = IntegrityChecker::default().verify(None, &install).await.unwrap();
        assert!(report.degraded);
        assert_eq!(report.readiness(), Readiness::NotReady(vec!["client.jar".into()]));

        std::fs::create_dir_all(install.client_dir()).unwrap();
        std::fs::write(install.primary_archive_path(), b"jar").unwrap();
        let report = IntegrityChecker::default().verify(None, &install).await.unwrap();
        assert_eq!(report.readiness(), Readiness::Ready);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn asset_sampling_uses_ratio_of_first_objects() {
        let root = temp_root("assets");
        let install = LocalInstall::new(&root, "client");
        std::fs::create_dir_all(install.client_dir()).unwrap();
        std::fs::write(install.client_dir().join("client.jar"), b"jar").unwrap();

        let index_path = install.asset_index_path("1.12").unwrap();
        std::fs::create_dir_all(index_path.parent().unwrap()).unwrap();
        let objects: Vec<String> = (0..4)
            .map(|i| format!("\"file{i}\": {{\"hash\": \"{i}{i}aa{i}\", \"size\": 1}}"))
            .collect();
        std::fs::write(&index_path, format!("{{\"objects\": {{{}}}}}", objects.join(","))).unwrap();

        for hash in ["00aa0", "11aa1"] {
            let object = install.asset_object_path(hash);
            std::fs::create_dir_all(object.parent().unwrap()).unwrap();
            std::fs::write(object, b"x").unwrap();
        }

        let manifest = manifest(vec![client_file("client.jar", None)], Some("1.12"));
        let checker = IntegrityChecker::new(
            VerifyMode::Full,
            AssetSampling {
                sample_size: 4,
                ready_ratio: 0.5,
            },
        );
        let report = checker.verify(Some(&manifest), &install).await.unwrap();
        assert_eq!(
            report.assets,
            AssetCheck::Sampled {
                sampled: 4,
                present: 2,
                ready: true
            }
        );

        let strict = IntegrityChecker::new(
            VerifyMode::Full,
            AssetSampling {
                sample_size: 4,
                ready_ratio: 0.75,
            },
        );
        let report = strict.verify(Some(&manifest), &install).await.unwrap();
        assert!(!report.assets.is_ready());
        assert!(report.client_ready());
        assert!(!report.fully_ready());
        let _ = std::fs::remove_dir_all(&root);
    }
}
