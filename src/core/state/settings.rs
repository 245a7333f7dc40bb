use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::install::DEFAULT_PRIMARY_ARCHIVE;
use crate::core::integrity::{AssetSampling, VerifyMode};
use crate::core::java::JavaRuntimePreference;
use crate::core::launch::Resolution;
use crate::core::sync::SyncOptions;

const APP_DIR_NAME: &str = "ALauncher";
pub const SETTINGS_FILE: &str = "launcher_settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    pub api_base_url: String,
    pub updates_dir: PathBuf,
    pub download_concurrency: usize,
    /// `false` switches the integrity checker to existence-only checks.
    pub verify_hashes: bool,
    pub asset_sample_size: usize,
    pub asset_ready_ratio: f64,
    pub asset_progress_every: usize,
    pub visibility_retry_attempts: u32,
    pub visibility_retry_delay_ms: u64,
    pub primary_archive: String,
    pub ram_mb: u32,
    pub resolution: Resolution,
    pub full_screen: bool,
    pub java_runtime: JavaRuntimePreference,
    pub selected_java_path: Option<PathBuf>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".into(),
            updates_dir: default_data_dir(),
            download_concurrency: 2,
            verify_hashes: true,
            asset_sample_size: 10,
            asset_ready_ratio: 0.5,
            asset_progress_every: 100,
            visibility_retry_attempts: 5,
            visibility_retry_delay_ms: 200,
            primary_archive: DEFAULT_PRIMARY_ARCHIVE.into(),
            ram_mb: 2048,
            resolution: Resolution::default(),
            full_screen: false,
            java_runtime: JavaRuntimePreference::Auto,
            selected_java_path: None,
        }
    }
}

impl LauncherSettings {
    /// Read `<data_dir>/launcher_settings.json`. A missing or unreadable
    /// file yields the defaults.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                debug!("No settings at {:?} ({}), using defaults", path, err);
                return Self::default();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!("Ignoring invalid settings file {:?}: {}", path, err);
            Self::default()
        })
    }

    pub fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        std::fs::create_dir_all(data_dir).map_err(|source| LauncherError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;
        let path = data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| LauncherError::Io { path, source })
    }

    pub fn verify_mode(&self) -> VerifyMode {
        if self.verify_hashes {
            VerifyMode::Full
        } else {
            VerifyMode::Fast
        }
    }

    pub fn sampling(&self) -> AssetSampling {
        AssetSampling {
            sample_size: self.asset_sample_size,
            ready_ratio: self.asset_ready_ratio.clamp(0.0, 1.0),
        }
    }

    pub fn visibility_delay(&self) -> Duration {
        Duration::from_millis(self.visibility_retry_delay_ms)
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            verify_mode: self.verify_mode(),
            sampling: self.sampling(),
            visibility_attempts: self.visibility_retry_attempts,
            visibility_delay: self.visibility_delay(),
        }
    }
}

/// `<local data dir>/ALauncher`; also the default updates root.
pub fn default_data_dir() -> PathBuf {
    let base = if cfg!(target_os = "macos") {
        dirs::data_dir()
    } else {
        dirs::data_local_dir()
    };
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR_NAME)
}
