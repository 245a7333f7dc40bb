use serde::{Deserialize, Serialize};

use crate::core::integrity::hash;

/// Which store a declared file belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Client,
    Asset,
}

impl FileKind {
    pub fn from_wire(raw: Option<&str>) -> Self {
        match raw {
            Some(kind) if kind.trim().eq_ignore_ascii_case("asset") => FileKind::Asset,
            _ => FileKind::Client,
        }
    }
}

/// One file declared by the server for a version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEntry {
    /// Relative, slash-normalized path inside the client directory.
    pub path: String,
    /// Hex digest. `None` or an all-zero placeholder means "existence only".
    pub content_hash: Option<String>,
    pub size: u64,
    pub kind: FileKind,
}

impl FileEntry {
    /// The digest to compare against, if the server declared a usable one.
    pub fn strong_hash(&self) -> Option<&str> {
        self.content_hash
            .as_deref()
            .filter(|digest| !hash::is_placeholder(digest))
            .filter(|digest| hash::HashAlgorithm::detect(digest).is_some())
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Server-declared truth for one logical game version. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionManifest {
    pub version_id: String,
    pub client_directory: String,
    pub jvm_version: Option<String>,
    pub asset_index: Option<String>,
    pub files: Vec<FileEntry>,
}

impl VersionManifest {
    pub fn client_files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter().filter(|f| f.kind == FileKind::Client)
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }
}

/// Normalize a server path: forward slashes, no leading `/` or `./`.
pub fn normalize_path(raw: &str) -> String {
    let slashed = raw.trim().replace('\\', "/");
    let mut rest = slashed.as_str();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            break;
        }
    }
    rest.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: Option<&str>) -> FileEntry {
        FileEntry {
            path: "libraries/lwjgl.jar".into(),
            content_hash: hash.map(str::to_string),
            size: 10,
            kind: FileKind::Client,
        }
    }

    #[test]
    fn placeholder_and_unknown_hashes_are_not_strong() {
        assert_eq!(entry(None).strong_hash(), None);
        assert_eq!(entry(Some(&"0".repeat(64))).strong_hash(), None);
        assert_eq!(entry(Some("abc123")).strong_hash(), None);
        let sha1 = "a9993e364706816aba3e25717850c26c9cd0d89d";
        assert_eq!(entry(Some(sha1)).strong_hash(), Some(sha1));
    }

    #[test]
    fn paths_are_slash_normalized() {
        assert_eq!(normalize_path("\\mods\\a.jar"), "mods/a.jar");
        assert_eq!(normalize_path("./client.jar"), "client.jar");
        assert_eq!(normalize_path("natives/x.dll"), "natives/x.dll");
    }

    #[test]
    fn file_kind_defaults_to_client() {
        assert_eq!(FileKind::from_wire(Some("ASSET")), FileKind::Asset);
        assert_eq!(FileKind::from_wire(Some("library")), FileKind::Client);
        assert_eq!(FileKind::from_wire(None), FileKind::Client);
        assert_eq!(entry(None).file_name(), "lwjgl.jar");
    }
}
