// ─── UI Commands ───
// Async operations the UI layer binds to buttons. Each takes the shared
// state, holds its lock only long enough to read what it needs, and returns
// serializable results.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::error::LauncherResult;
use crate::core::install::LocalInstall;
use crate::core::integrity::{IntegrityChecker, VerifyReport};
use crate::core::java::{detect_java_installations, JavaInstallation};
use crate::core::launch::{LaunchProfile, LaunchResult, ProcessEvent, ProcessStatus};
use crate::core::manifest::{HttpManifestSource, ManifestSource};
use crate::core::orchestrator::{LaunchRequest, Orchestrator};
use crate::core::state::{AppState, LauncherSettings};
use crate::core::sync::Progress;
use crate::logging::latest_log_path;

pub type SharedState = Arc<Mutex<AppState>>;

/// Verify, repair and start the profile's game.
pub async fn launch_profile(
    state: &SharedState,
    request: LaunchRequest,
    progress: UnboundedSender<Progress>,
    game_events: Option<UnboundedSender<ProcessEvent>>,
) -> LaunchResult {
    let orchestrator = {
        let state = state.lock().await;
        let token = Some(request.player.access_token.clone()).filter(|t| !t.trim().is_empty());
        Orchestrator::from_state(&state, token)
    };
    info!("Launch requested for profile {}", request.profile.profile_id);
    orchestrator
        .ensure_ready_and_launch(request, progress, game_events)
        .await
}

/// Read-only readiness check for a "play / update" button.
pub async fn check_profile(
    state: &SharedState,
    profile: &LaunchProfile,
    access_token: Option<String>,
) -> LauncherResult<VerifyReport> {
    let (manifests, settings) = {
        let state = state.lock().await;
        (
            HttpManifestSource::new(
                state.http_client.clone(),
                state.settings.api_base_url.clone(),
                access_token,
            ),
            state.settings.clone(),
        )
    };

    let manifest = manifests
        .fetch_manifest(&profile.version, profile.client_directory.as_deref())
        .await?
        .into_option();
    let fallback = profile
        .client_directory
        .clone()
        .unwrap_or_else(|| profile.version.clone());
    let install = LocalInstall::for_version(&settings.updates_dir, &fallback, manifest.as_ref())?
        .with_primary_archive(settings.primary_archive.clone());

    IntegrityChecker::new(settings.verify_mode(), settings.sampling())
        .verify(manifest.as_ref(), &install)
        .await
}

pub async fn get_process_status(state: &SharedState, process_id: &str) -> LauncherResult<ProcessStatus> {
    let processes = state.lock().await.processes.clone();
    processes.status(process_id).await
}

pub async fn list_running_processes(state: &SharedState) -> Vec<ProcessStatus> {
    let processes = state.lock().await.processes.clone();
    processes.running().await
}

pub async fn force_close_process(state: &SharedState, process_id: &str) -> LauncherResult<()> {
    let processes = state.lock().await.processes.clone();
    processes.kill(process_id).await?;
    info!("Kill requested for {}", process_id);
    Ok(())
}

pub async fn get_java_installations(state: &SharedState) -> Vec<JavaInstallation> {
    let preference = state.lock().await.settings.java_runtime;
    detect_java_installations(preference).await
}

pub async fn get_launcher_settings(state: &SharedState) -> LauncherSettings {
    state.lock().await.settings.clone()
}

pub async fn update_launcher_settings(
    state: &SharedState,
    settings: LauncherSettings,
) -> LauncherResult<LauncherSettings> {
    let mut state = state.lock().await;
    state.update_settings(settings)?;
    info!("Launcher settings updated");
    Ok(state.settings.clone())
}

pub async fn get_latest_log_path(state: &SharedState) -> Option<PathBuf> {
    let logs_dir = state.lock().await.logs_dir();
    latest_log_path(&logs_dir)
}
