use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::manifest::VersionManifest;

pub const DEFAULT_PRIMARY_ARCHIVE: &str = "client.jar";

/// On-disk layout for one client directory plus the shared asset store.
///
/// ```text
/// <updates_root>/
///   <client_directory>/      client files (client.jar, libraries/, natives/ ...)
///   assets/
///     indexes/<asset_index>.json
///     objects/<2-char prefix>/<hash>
/// ```
///
/// The asset store is shared across versions and is never removed together
/// with a client directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInstall {
    pub updates_root: PathBuf,
    pub client_directory: String,
    /// File whose presence alone marks a usable client when no manifest exists.
    pub primary_archive: String,
}

impl LocalInstall {
    pub fn new(updates_root: impl Into<PathBuf>, client_directory: impl Into<String>) -> Self {
        Self {
            updates_root: updates_root.into(),
            client_directory: client_directory.into(),
            primary_archive: DEFAULT_PRIMARY_ARCHIVE.to_string(),
        }
    }

    /// Key the install by the manifest's client directory, or by the raw
    /// version string when the backend declared none.
    ///
    /// The directory must be a single path segment. A manifest directory that
    /// is not falls back to `version`; an unusable `version` is an error.
    pub fn for_version(
        updates_root: impl Into<PathBuf>,
        version: &str,
        manifest: Option<&VersionManifest>,
    ) -> LauncherResult<Self> {
        let declared = manifest
            .map(|m| m.client_directory.as_str())
            .filter(|dir| !dir.trim().is_empty());
        let directory = match declared {
            Some(dir) if is_single_segment(dir) => dir,
            Some(dir) => {
                warn!("Ignoring unsafe client directory {:?}, using {}", dir, version);
                version
            }
            None => version,
        };
        if !is_single_segment(directory) {
            return Err(LauncherError::UnsafePath(directory.to_string()));
        }
        Ok(Self::new(updates_root, directory))
    }

    pub fn with_primary_archive(mut self, primary_archive: impl Into<String>) -> Self {
        self.primary_archive = primary_archive.into();
        self
    }

    /// Game working directory (`<updates_root>/<client_directory>`).
    pub fn client_dir(&self) -> PathBuf {
        self.updates_root.join(&self.client_directory)
    }

    pub fn primary_archive_path(&self) -> PathBuf {
        self.client_dir().join(&self.primary_archive)
    }

    pub fn is_primary_archive(&self, relative: &str) -> bool {
        relative == self.primary_archive
    }

    pub fn natives_dir(&self) -> PathBuf {
        self.client_dir().join("natives")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.client_dir().join("libraries")
    }

    pub fn assets_root(&self) -> PathBuf {
        self.updates_root.join("assets")
    }

    pub fn asset_index_path(&self, asset_index: &str) -> LauncherResult<PathBuf> {
        if !is_single_segment(asset_index) {
            return Err(LauncherError::UnsafePath(asset_index.to_string()));
        }
        Ok(self
            .assets_root()
            .join("indexes")
            .join(format!("{asset_index}.json")))
    }

    /// `objects/<first two hex chars>/<hash>`; callers pass hashes that
    /// passed [`is_asset_hash`].
    pub fn asset_object_path(&self, hash: &str) -> PathBuf {
        self.assets_root()
            .join("objects")
            .join(asset_object_relative(hash))
    }

    /// Resolve a manifest-relative path inside the client directory,
    /// rejecting anything that would land outside it.
    pub fn resolve(&self, relative: &str) -> LauncherResult<PathBuf> {
        let candidate = Path::new(relative);
        let safe = !relative.trim().is_empty()
            && candidate
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(LauncherError::UnsafePath(relative.to_string()));
        }
        Ok(self.client_dir().join(candidate))
    }
}

/// Exactly one normal path component: no separators, `..`, or roots.
pub fn is_single_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

/// Asset objects are addressed by hex digests.
pub fn is_asset_hash(hash: &str) -> bool {
    hash.len() >= 2 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Relative location of a content-addressed object inside `objects/`.
pub fn asset_object_relative(hash: &str) -> String {
    let prefix: String = hash.chars().take(2).collect();
    format!("{prefix}/{hash}")
}
