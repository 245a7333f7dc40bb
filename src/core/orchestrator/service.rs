// ─── Orchestrator ───
// The one launch entry point: converge the install, then start and track
// the game.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, instrument, warn};

use crate::core::assets::{AssetFetcher, AssetReport};
use crate::core::auth::PlayerIdentity;
use crate::core::downloader::{FileFailure, FileSource, HttpFileSource};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::install::LocalInstall;
use crate::core::integrity::checker::file_exists;
use crate::core::integrity::{IntegrityChecker, VerifyReport};
use crate::core::java::{parse_major_version, resolve_java_binary};
use crate::core::launch::{
    build_args, launch, prepare_natives, LaunchCommand, LaunchProfile, LaunchResult,
    ProcessEvent, ProcessRegistry, RuntimeConfig, SessionTracker, TrackContext,
};
use crate::core::manifest::{HttpManifestSource, ManifestSource, VersionManifest};
use crate::core::state::{AppState, LauncherSettings};
use crate::core::sync::{Progress, ProgressReporter, RunRegistry, Stage, SyncReport, Synchronizer};
use crate::core::telemetry::{os_description, LaunchStats, LoggingReporter};

/// Share of the progress bar given to the client files when assets follow.
const CLIENT_PHASE_END: f64 = 80.0;

/// What the UI asks for when the player presses "play".
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub profile: LaunchProfile,
    pub player: PlayerIdentity,
    /// Join the profile's server right away.
    pub auto_enter: bool,
}

/// A client directory that passed verification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyInstall {
    #[serde(skip)]
    pub install: LocalInstall,
    #[serde(skip)]
    pub manifest: Option<VersionManifest>,
    pub sync: Option<SyncReport>,
    pub assets: Option<AssetReport>,
}

impl ReadyInstall {
    /// Optional files that failed this run; the next run retries them.
    pub fn warnings(&self) -> &[FileFailure] {
        match &self.sync {
            Some(sync) => &sync.warnings,
            None => &[],
        }
    }
}

pub struct Orchestrator {
    manifests: Arc<dyn ManifestSource>,
    files: Arc<dyn FileSource>,
    settings: LauncherSettings,
    runs: Arc<RunRegistry>,
    processes: ProcessRegistry,
    tracker: SessionTracker,
}

impl Orchestrator {
    pub fn new(
        manifests: Arc<dyn ManifestSource>,
        files: Arc<dyn FileSource>,
        settings: LauncherSettings,
        runs: Arc<RunRegistry>,
        processes: ProcessRegistry,
        tracker: SessionTracker,
    ) -> Self {
        Self {
            manifests,
            files,
            settings,
            runs,
            processes,
            tracker,
        }
    }

    /// Wire the HTTP collaborators from the shared state. Statistics and
    /// crashes go to the log.
    pub fn from_state(state: &AppState, access_token: Option<String>) -> Self {
        let reporter = Arc::new(LoggingReporter);
        Self::new(
            Arc::new(HttpManifestSource::new(
                state.http_client.clone(),
                state.settings.api_base_url.clone(),
                access_token.clone(),
            )),
            Arc::new(HttpFileSource::new(state.http_client.clone(), access_token)),
            state.settings.clone(),
            state.run_registry.clone(),
            state.processes.clone(),
            SessionTracker::new(reporter.clone(), reporter),
        )
    }

    pub fn processes(&self) -> &ProcessRegistry {
        &self.processes
    }

    /// Verify, repair and launch. Never fails: errors come back as an
    /// unsuccessful [`LaunchResult`] with a remediation hint.
    pub async fn ensure_ready_and_launch(
        &self,
        request: LaunchRequest,
        progress: UnboundedSender<Progress>,
        game_events: Option<UnboundedSender<ProcessEvent>>,
    ) -> LaunchResult {
        match self.try_launch(request, progress, game_events).await {
            Ok(result) => result,
            Err(err) => {
                error!("Launch failed: {}", err);
                LaunchResult::failed(&err)
            }
        }
    }

    async fn try_launch(
        &self,
        request: LaunchRequest,
        progress: UnboundedSender<Progress>,
        game_events: Option<UnboundedSender<ProcessEvent>>,
    ) -> LauncherResult<LaunchResult> {
        let profile = &request.profile;
        if profile.main_class.trim().is_empty() {
            return Err(LauncherError::Other(format!(
                "profile {} declares no main class",
                profile.profile_id
            )));
        }

        let ready = self.ensure_ready(profile, progress).await?;
        let install = &ready.install;

        let required_major = profile.required_java_major().or_else(|| {
            ready
                .manifest
                .as_ref()
                .and_then(|m| m.jvm_version.as_deref())
                .and_then(parse_major_version)
        });
        let java = resolve_java_binary(
            required_major,
            self.settings.java_runtime,
            self.settings.selected_java_path.as_deref(),
        )
        .await?;

        let natives_dir = prepare_natives(&install.client_dir()).await?;
        let mut runtime = RuntimeConfig::for_install(install, self.settings.ram_mb)
            .with_resolution(self.settings.resolution, self.settings.full_screen)
            .with_auto_enter(request.auto_enter);
        runtime.natives_dir = natives_dir;

        let player = request.player.clone().sanitized();
        let args = build_args(profile, &player, &runtime);
        let command = LaunchCommand {
            executable: java.path.clone(),
            jvm_args: args.jvm_args,
            main_class: profile.main_class.clone(),
            class_path: profile.class_path.clone(),
            game_args: args.game_args,
            working_dir: install.client_dir(),
        };

        let game = launch(&command, &self.processes).await?;
        let result = LaunchResult::started(&game.process_id, game.pid);

        let stats = LaunchStats {
            profile_id: profile.profile_id.clone(),
            profile_version: profile.version.clone(),
            server_address: profile.server_address.clone(),
            server_port: profile.server_port,
            java_version: Some(java.version.clone()),
            ram: self.settings.ram_mb,
            resolution: self.settings.resolution,
            full_screen: self.settings.full_screen,
            auto_enter: request.auto_enter,
            os: os_description(),
        };
        let session = self.tracker.open_session(&stats).await;

        let tracker = self.tracker.clone();
        let context = TrackContext {
            profile_id: profile.profile_id.clone(),
            server_address: profile.server_address.clone(),
            server_port: profile.server_port,
        };
        tokio::spawn(async move {
            let exit = tracker.track(game, session, context, game_events).await;
            info!(
                "Game for profile finished: exit={:?} crashed={}",
                exit.exit_code, exit.crashed
            );
        });

        Ok(result)
    }

    /// Bring the profile's client directory to a launchable state.
    ///
    /// Runs for the same directory are serialized; a run overtaken by a newer
    /// one fails with [`LauncherError::Superseded`].
    #[instrument(skip(self, profile, progress), fields(profile = %profile.profile_id))]
    pub async fn ensure_ready(
        &self,
        profile: &LaunchProfile,
        progress: UnboundedSender<Progress>,
    ) -> LauncherResult<ReadyInstall> {
        let manifest = match self
            .manifests
            .fetch_manifest(&profile.version, profile.client_directory.as_deref())
            .await
        {
            Ok(lookup) => lookup.into_option(),
            Err(err) => {
                warn!("Manifest for {} unavailable, checking local files only: {}", profile.version, err);
                None
            }
        };

        let fallback_directory = profile
            .client_directory
            .as_deref()
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or(&profile.version);
        let install = LocalInstall::for_version(
            &self.settings.updates_dir,
            fallback_directory,
            manifest.as_ref(),
        )?
        .with_primary_archive(self.settings.primary_archive.clone());

        let ticket = self.runs.begin(&install.client_directory);
        let _guard = ticket.lock().await;
        ticket.ensure_current()?;
        let reporter = ProgressReporter::new(progress, Some(ticket.clone()));

        let checker = IntegrityChecker::new(self.settings.verify_mode(), self.settings.sampling());
        let report = checker.verify(manifest.as_ref(), &install).await?;

        let asset_index = manifest
            .as_ref()
            .and_then(|m| m.asset_index.clone())
            .or_else(|| profile.asset_index.clone());
        let pending_assets = match asset_index {
            Some(asset_index) => {
                let check = checker.check_assets(Some(&asset_index), &install).await;
                if check.is_ready() {
                    None
                } else {
                    info!("Assets for {} not ready ({:?}), fetching", asset_index, check);
                    Some(asset_index)
                }
            }
            None => None,
        };

        let sync = if report.client_ready() {
            info!("{} is ready", install.client_directory);
            None
        } else {
            let Some(manifest) = manifest.as_ref().filter(|m| m.has_files()) else {
                return Err(LauncherError::FilesMissing(
                    report.problems.iter().map(|p| p.path.clone()).collect(),
                ));
            };
            let client_end = if pending_assets.is_some() {
                CLIENT_PHASE_END
            } else {
                100.0
            };
            reporter.phase(0.0, client_end);
            let synchronizer = Synchronizer::new(
                self.files.clone(),
                self.settings.api_base_url.clone(),
                self.settings.sync_options(),
            );
            let sync = synchronizer
                .synchronize(manifest, &install, self.settings.download_concurrency, &reporter)
                .await?;
            ensure_launchable(&sync.final_report, &install).await?;
            if !sync.warnings.is_empty() {
                warn!(
                    "Launching with {} optional file(s) not downloaded",
                    sync.warnings.len()
                );
            }
            Some(sync)
        };

        ticket.ensure_current()?;
        let mut assets = None;
        if let Some(asset_index) = pending_assets {
            let start = if sync.is_some() { CLIENT_PHASE_END } else { 0.0 };
            reporter.phase(start, 100.0);
            let fetcher = AssetFetcher::new(self.files.clone(), self.settings.api_base_url.clone())
                .with_concurrency(self.settings.download_concurrency)
                .with_progress_every(self.settings.asset_progress_every)
                .with_visibility_delay(self.settings.visibility_delay());
            assets = Some(
                fetcher
                    .fetch(&profile.profile_id, &asset_index, &install, &reporter)
                    .await,
            );
        }

        ticket.ensure_current()?;
        if !reporter.is_complete() {
            reporter.phase(0.0, 100.0);
            reporter.stage(Stage::Complete, 1.0, None, report.checked_files, report.checked_files);
        }

        Ok(ReadyInstall {
            install,
            manifest,
            sync,
            assets,
        })
    }
}

/// Only the primary archive is required to start the game; anything else
/// still missing after a sync is retried on the next run.
async fn ensure_launchable(report: &VerifyReport, install: &LocalInstall) -> LauncherResult<()> {
    let primary_broken = report
        .problems
        .iter()
        .any(|p| install.is_primary_archive(&p.path));
    if primary_broken || !file_exists(&install.primary_archive_path()).await {
        return Err(LauncherError::FilesMissing(vec![install.primary_archive.clone()]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::core::downloader::scheduler::testing::FakeSource;
    use crate::core::error::LaunchFailureKind;
    use crate::core::install::asset_object_relative;
    use crate::core::integrity::hash::{hash_bytes, HashAlgorithm};
    use crate::core::manifest::{FileEntry, FileKind, ManifestLookup};
    use crate::core::telemetry::reporter::testing::RecordingReporter;

    const API: &str = "http://backend.test/api";

    struct StaticManifests(Option<VersionManifest>);

    #[async_trait]
    impl ManifestSource for StaticManifests {
        async fn fetch_manifest(
            &self,
            _version: &str,
            _client_directory: Option<&str>,
        ) -> LauncherResult<ManifestLookup> {
            Ok(match &self.0 {
                Some(manifest) => ManifestLookup::Found(manifest.clone()),
                None => ManifestLookup::NotFound,
            })
        }
    }

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("orchestrator-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn settings(root: &PathBuf) -> LauncherSettings {
        LauncherSettings {
            api_base_url: API.into(),
            updates_dir: root.clone(),
            visibility_retry_delay_ms: 10,
            ..Default::default()
        }
    }

    fn manifest() -> VersionManifest {
        VersionManifest {
            version_id: "12".into(),
            client_directory: "Industrial".into(),
            jvm_version: Some("8".into()),
            asset_index: None,
            files: vec![FileEntry {
                path: "client.jar".into(),
                content_hash: Some(hash_bytes(HashAlgorithm::Sha1, b"client bytes")),
                size: 12,
                kind: FileKind::Client,
            }],
        }
    }

    fn profile() -> LaunchProfile {
        LaunchProfile {
            profile_id: "7".into(),
            version: "1.12.2".into(),
            main_class: "net.minecraft.launchwrapper.Launch".into(),
            class_path: vec!["client.jar".into()],
            ..Default::default()
        }
    }

    fn orchestrator(
        root: &PathBuf,
        manifest: Option<VersionManifest>,
        files: Arc<FakeSource>,
    ) -> Orchestrator {
        let reporter = Arc::new(RecordingReporter::default());
        Orchestrator::new(
            Arc::new(StaticManifests(manifest)),
            files,
            settings(root),
            Arc::new(RunRegistry::new()),
            ProcessRegistry::new(),
            SessionTracker::new(reporter.clone(), reporter),
        )
    }

    #[tokio::test]
    async fn missing_client_is_downloaded_before_launch() {
        let root = temp_root("repair");
        let manifest = manifest();
        let files = Arc::new(FakeSource::default());
        let url = Synchronizer::new(files.clone(), API, Default::default())
            .file_url(&manifest, "client.jar")
            .unwrap();
        files.serve(&url, b"client bytes");

        let orchestrator = orchestrator(&root, Some(manifest), files.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ready = orchestrator.ensure_ready(&profile(), tx).await.unwrap();

        assert_eq!(ready.install.client_directory, "Industrial");
        let sync = ready.sync.unwrap();
        assert_eq!(sync.downloaded, vec!["client.jar".to_string()]);
        assert!(ready.install.primary_archive_path().is_file());
        assert!(ready.assets.is_none());

        let events: Vec<Progress> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.last().map(|p| p.stage), Some(Stage::Complete));

        let (tx, _rx) = mpsc::unbounded_channel();
        let again = orchestrator.ensure_ready(&profile(), tx).await.unwrap();
        assert!(again.sync.is_none());
        assert_eq!(files.opened().len(), 1);
        let _ = std::fs::remove_dir_all(&root);
    }

    fn serve_client(files: &FakeSource, manifest: &VersionManifest) {
        let url = Synchronizer::new(Arc::new(FakeSource::default()), API, Default::default())
            .file_url(manifest, "client.jar")
            .unwrap();
        files.serve(&url, b"client bytes");
    }

    #[tokio::test]
    async fn optional_file_failure_does_not_block_launch() {
        let root = temp_root("optional");
        let mut manifest = manifest();
        manifest.files.push(FileEntry {
            path: "mods/optional.jar".into(),
            content_hash: Some(hash_bytes(HashAlgorithm::Sha1, b"optional")),
            size: 8,
            kind: FileKind::Client,
        });
        let files = Arc::new(FakeSource::default());
        serve_client(&files, &manifest);

        let orchestrator = orchestrator(&root, Some(manifest), files);
        let (tx, _rx) = mpsc::unbounded_channel();
        let ready = orchestrator.ensure_ready(&profile(), tx).await.unwrap();

        assert!(ready.install.primary_archive_path().is_file());
        let warnings: Vec<&str> = ready.warnings().iter().map(|w| w.path.as_str()).collect();
        assert_eq!(warnings, vec!["mods/optional.jar"]);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn escaping_client_directory_installs_under_the_version() {
        let root = temp_root("escape");
        let updates = root.join("updates");
        let mut manifest = manifest();
        manifest.client_directory = "../outside".into();
        let files = Arc::new(FakeSource::default());
        serve_client(&files, &manifest);

        let orchestrator = orchestrator(&updates, Some(manifest), files);
        let (tx, _rx) = mpsc::unbounded_channel();
        let ready = orchestrator.ensure_ready(&profile(), tx).await.unwrap();

        assert_eq!(ready.install.client_directory, "1.12.2");
        assert!(updates.join("1.12.2").join("client.jar").is_file());
        assert!(!root.join("outside").exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn client_and_assets_share_one_progress_run() {
        let root = temp_root("phases");
        let mut manifest = manifest();
        manifest.asset_index = Some("1.12".into());
        let files = Arc::new(FakeSource::default());
        serve_client(&files, &manifest);

        let fetcher = AssetFetcher::new(files.clone(), API);
        let sounds: [&[u8]; 2] = [b"sound one", b"sound two"];
        let objects: Vec<String> = sounds
            .iter()
            .enumerate()
            .map(|(i, body)| {
                let hash = hash_bytes(HashAlgorithm::Sha1, body);
                let path = format!("objects/{}", asset_object_relative(&hash));
                files.serve(&fetcher.asset_url("7", &path).unwrap(), body);
                format!("\"s{i}.ogg\": {{\"hash\": \"{hash}\", \"size\": {}}}", body.len())
            })
            .collect();
        let index = format!("{{\"objects\": {{{}}}}}", objects.join(","));
        files.serve(&fetcher.asset_url("7", "index.json").unwrap(), index.as_bytes());

        let orchestrator = orchestrator(&root, Some(manifest), files);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ready = orchestrator.ensure_ready(&profile(), tx).await.unwrap();
        assert_eq!(ready.sync.map(|s| s.downloaded.len()), Some(1));
        assert_eq!(ready.assets.map(|a| a.downloaded), Some(2));

        let events: Vec<Progress> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(events
            .windows(2)
            .all(|pair| pair[0].percent_complete <= pair[1].percent_complete));
        let completes = events.iter().filter(|p| p.stage == Stage::Complete).count();
        assert_eq!(completes, 1);
        assert_eq!(events.last().map(|p| p.stage), Some(Stage::Complete));
        assert!(events
            .iter()
            .any(|p| p.stage == Stage::Downloading && p.percent_complete > CLIENT_PHASE_END));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn unregistered_version_without_client_cannot_launch() {
        let root = temp_root("unregistered");
        let orchestrator = orchestrator(&root, None, Arc::new(FakeSource::default()));
        let request = LaunchRequest {
            profile: profile(),
            player: PlayerIdentity::offline("Steve"),
            auto_enter: false,
        };

        let (tx, _rx) = mpsc::unbounded_channel();
        let result = orchestrator.ensure_ready_and_launch(request, tx, None).await;

        assert!(!result.success);
        assert_eq!(result.failure_kind, Some(LaunchFailureKind::FilesMissing));
        assert!(result.error.unwrap().contains("client.jar"));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn unregistered_version_with_client_is_ready() {
        let root = temp_root("degraded");
        let dir = root.join("1.12.2");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("client.jar"), b"anything").unwrap();

        let orchestrator = orchestrator(&root, None, Arc::new(FakeSource::default()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ready = orchestrator.ensure_ready(&profile(), tx).await.unwrap();

        assert!(ready.sync.is_none());
        assert_eq!(ready.install.client_dir(), dir);
        assert_eq!(rx.try_recv().map(|p| p.percent_complete).ok(), Some(100.0));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn profile_without_main_class_is_rejected() {
        let root = temp_root("no-main");
        let orchestrator = orchestrator(&root, None, Arc::new(FakeSource::default()));
        let request = LaunchRequest {
            profile: LaunchProfile {
                main_class: String::new(),
                ..profile()
            },
            player: PlayerIdentity::default(),
            auto_enter: false,
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = orchestrator.ensure_ready_and_launch(request, tx, None).await;
        assert!(!result.success);
        assert_eq!(result.failure_kind, Some(LaunchFailureKind::Unknown));
    }
}
