use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the launcher core.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Path escapes the install root: {0}")]
    UnsafePath(String),

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("Hash mismatch for {path:?}: expected {expected}, got {actual}")]
    HashMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("File never appeared on disk after download: {0:?}")]
    FileNotVisible(PathBuf),

    // ── Synchronization ─────────────────────────────────
    #[error("Primary client archive {path} could not be downloaded: {reason}")]
    CriticalFileFailed { path: String, reason: String },

    #[error("Client files are missing: {}", .0.join(", "))]
    FilesMissing(Vec<String>),

    #[error("Synchronization run for {0} was superseded by a newer run")]
    Superseded(String),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Java / launch ───────────────────────────────────
    #[error("Java runtime not found: {0}")]
    RuntimeMissing(String),

    #[error("Invalid classpath: {0}")]
    InvalidClasspath(String),

    #[error("Failed to start game process: {0}")]
    Spawn(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Collaborators ───────────────────────────────────
    #[error("Statistics reporting failed: {0}")]
    Statistics(String),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

/// Coarse cause of a failed launch, used by the UI to pick a remediation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchFailureKind {
    RuntimeMissing,
    FilesMissing,
    Unknown,
}

impl LauncherError {
    pub fn launch_failure_kind(&self) -> LaunchFailureKind {
        match self {
            LauncherError::RuntimeMissing(_) => LaunchFailureKind::RuntimeMissing,
            LauncherError::FilesMissing(_)
            | LauncherError::CriticalFileFailed { .. }
            | LauncherError::InvalidClasspath(_)
            | LauncherError::HashMismatch { .. }
            | LauncherError::FileNotVisible(_) => LaunchFailureKind::FilesMissing,
            _ => LaunchFailureKind::Unknown,
        }
    }

    /// Message with a suggested next step, shown inline next to the launch button.
    pub fn user_message(&self) -> String {
        match self.launch_failure_kind() {
            LaunchFailureKind::RuntimeMissing => format!(
                "{self}. Install a compatible Java runtime or select one in the launcher settings."
            ),
            LaunchFailureKind::FilesMissing => format!(
                "{self}. Game files are incomplete; run the launch again to repair them."
            ),
            LaunchFailureKind::Unknown => format!("{self}. Check the launcher log for details."),
        }
    }
}

// ── Serialization for the UI layer ──────────────────────
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
