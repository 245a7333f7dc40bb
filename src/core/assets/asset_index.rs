use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::install::is_asset_hash;

/// Top-level asset index JSON structure.
///
/// A `BTreeMap` keeps iteration order stable, so "the first N objects" means
/// the same objects on every run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetIndex {
    #[serde(default)]
    pub objects: BTreeMap<String, AssetObject>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetObject {
    pub hash: String,
    #[serde(default)]
    pub size: u64,
}

impl AssetIndex {
    pub fn parse(raw: &str) -> LauncherResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub async fn load(path: &Path) -> LauncherResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LauncherError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&raw)
    }

    /// Distinct objects; several logical paths may share one hash. Entries
    /// whose hash is not a hex digest are skipped, since the hash becomes a
    /// file name in the object store.
    pub fn unique_objects(&self) -> Vec<&AssetObject> {
        let mut seen = std::collections::HashSet::new();
        self.objects
            .iter()
            .filter(|(name, obj)| {
                if is_asset_hash(&obj.hash) {
                    return true;
                }
                warn!("Skipping asset {} with invalid hash {:?}", name, obj.hash);
                false
            })
            .map(|(_, obj)| obj)
            .filter(|obj| seen.insert(obj.hash.as_str()))
            .collect()
    }
}
