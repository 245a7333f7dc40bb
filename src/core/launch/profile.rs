use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::install::LocalInstall;

/// Main class of the legacy LaunchWrapper bootstrap (Forge 1.6 - 1.12).
pub const LAUNCHWRAPPER_MAIN_CLASS: &str = "net.minecraft.launchwrapper.Launch";

/// Server-side description of a playable profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LaunchProfile {
    pub profile_id: String,
    /// Version name handed to the game and used to look up the manifest.
    pub version: String,
    pub client_directory: Option<String>,
    pub main_class: String,
    /// Entries relative to the client directory; `libraries` expands to every
    /// jar below `libraries/`.
    pub class_path: Vec<String>,
    pub jvm_args: Vec<String>,
    /// Extra game arguments declared by the profile author.
    pub game_args: Vec<String>,
    pub asset_index: Option<String>,
    pub jvm_version: Option<String>,
    pub server_address: Option<String>,
    pub server_port: Option<u16>,
}

impl LaunchProfile {
    pub fn uses_launchwrapper(&self) -> bool {
        self.main_class.trim() == LAUNCHWRAPPER_MAIN_CLASS
    }

    pub fn asset_index_name(&self) -> &str {
        self.asset_index.as_deref().unwrap_or(&self.version)
    }

    pub fn required_java_major(&self) -> Option<u32> {
        self.jvm_version
            .as_deref()
            .and_then(crate::core::java::parse_major_version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 854,
            height: 480,
        }
    }
}

/// Machine-local settings for one launch.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub ram_mb: u32,
    pub resolution: Resolution,
    pub full_screen: bool,
    /// Join the profile's server right after the game starts.
    pub auto_enter: bool,
    pub game_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub natives_dir: PathBuf,
}

impl RuntimeConfig {
    pub fn for_install(install: &LocalInstall, ram_mb: u32) -> Self {
        Self {
            ram_mb,
            resolution: Resolution::default(),
            full_screen: false,
            auto_enter: false,
            game_dir: install.client_dir(),
            assets_dir: install.assets_root(),
            natives_dir: install.natives_dir(),
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution, full_screen: bool) -> Self {
        self.resolution = resolution;
        self.full_screen = full_screen;
        self
    }

    pub fn with_auto_enter(mut self, auto_enter: bool) -> Self {
        self.auto_enter = auto_enter;
        self
    }
}
