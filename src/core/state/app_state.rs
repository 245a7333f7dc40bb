use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::core::error::LauncherResult;
use crate::core::http::build_http_client;
use crate::core::launch::ProcessRegistry;
use crate::core::sync::RunRegistry;

use super::settings::{default_data_dir, LauncherSettings};

/// Long-lived launcher state shared by every launch.
pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: LauncherSettings,
    pub http_client: Client,
    pub run_registry: Arc<RunRegistry>,
    pub processes: ProcessRegistry,
}

impl AppState {
    pub fn new() -> LauncherResult<Self> {
        Self::with_data_dir(default_data_dir())
    }

    pub fn with_data_dir(data_dir: PathBuf) -> LauncherResult<Self> {
        let settings = LauncherSettings::load(&data_dir);
        info!(
            "Launcher data in {:?}, updates in {:?}",
            data_dir, settings.updates_dir
        );
        Ok(Self {
            data_dir,
            settings,
            http_client: build_http_client()?,
            run_registry: Arc::new(RunRegistry::new()),
            processes: ProcessRegistry::new(),
        })
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn save_settings(&self) -> LauncherResult<()> {
        self.settings.save(&self.data_dir)
    }

    pub fn update_settings(&mut self, settings: LauncherSettings) -> LauncherResult<()> {
        self.settings = settings;
        self.save_settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_updates_are_persisted() {
        let dir = std::env::temp_dir().join(format!("app-state-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let mut state = AppState::with_data_dir(dir.clone()).unwrap();
        assert_eq!(state.settings, LauncherSettings::default());
        assert_eq!(state.logs_dir(), dir.join("logs"));

        let mut settings = state.settings.clone();
        settings.ram_mb = 3072;
        state.update_settings(settings).unwrap();

        let reloaded = AppState::with_data_dir(dir.clone()).unwrap();
        assert_eq!(reloaded.settings.ram_mb, 3072);
        let _ = std::fs::remove_dir_all(dir);
    }
}
