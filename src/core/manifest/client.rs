// ─── Manifest Client ───
// Fetches the server-declared file list for a client version.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::{endpoint, with_bearer};

use super::model::{normalize_path, FileEntry, FileKind, VersionManifest};

/// Outcome of a manifest lookup. `NotFound` is a normal answer for versions
/// the backend never registered; callers fall back to presence checks.
#[derive(Debug, Clone)]
pub enum ManifestLookup {
    Found(VersionManifest),
    NotFound,
}

impl ManifestLookup {
    pub fn into_option(self) -> Option<VersionManifest> {
        match self {
            ManifestLookup::Found(manifest) => Some(manifest),
            ManifestLookup::NotFound => None,
        }
    }
}

#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn fetch_manifest(
        &self,
        version: &str,
        client_directory: Option<&str>,
    ) -> LauncherResult<ManifestLookup>;
}

/// `GET /client-versions/version/{version}[?clientDirectory=]`
pub struct HttpManifestSource {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpManifestSource {
    pub fn new(client: Client, base_url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            access_token,
        }
    }
}

#[async_trait]
impl ManifestSource for HttpManifestSource {
    #[instrument(skip(self))]
    async fn fetch_manifest(
        &self,
        version: &str,
        client_directory: Option<&str>,
    ) -> LauncherResult<ManifestLookup> {
        let url = endpoint(&self.base_url, &format!("client-versions/version/{version}"));
        let mut request = self.client.get(&url);
        if let Some(dir) = client_directory {
            request = request.query(&[("clientDirectory", dir)]);
        }

        let response = with_bearer(request, self.access_token.as_deref())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            info!("Version {} is not registered on the backend", version);
            return Ok(ManifestLookup::NotFound);
        }
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_manifest_response(&body, version, client_directory)
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<WireVersion>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVersion {
    id: Value,
    #[serde(default)]
    files: Vec<WireFile>,
    #[serde(default)]
    jvm_version: Option<Value>,
    #[serde(default)]
    client_directory: Option<String>,
    #[serde(default)]
    asset_index: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    file_path: String,
    #[serde(default)]
    file_hash: Option<String>,
    #[serde(default)]
    file_size: u64,
    #[serde(default)]
    file_type: Option<String>,
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

/// Decode the backend envelope. `success: false` or a missing payload is
/// treated the same as a 404.
pub fn parse_manifest_response(
    body: &str,
    version: &str,
    requested_directory: Option<&str>,
) -> LauncherResult<ManifestLookup> {
    let envelope: ApiEnvelope = serde_json::from_str(body)?;

    let data = match (envelope.success, envelope.data) {
        (true, Some(data)) => data,
        (_, _) => {
            debug!(
                "Manifest for {} unavailable: {}",
                version,
                envelope.message.as_deref().unwrap_or("no data")
            );
            return Ok(ManifestLookup::NotFound);
        }
    };

    let version_id = value_to_string(&data.id).unwrap_or_else(|| version.to_string());
    let client_directory = data
        .client_directory
        .filter(|dir| !dir.trim().is_empty())
        .or_else(|| requested_directory.map(str::to_string))
        .unwrap_or_else(|| version.to_string());

    let files: Vec<FileEntry> = data
        .files
        .into_iter()
        .map(|file| FileEntry {
            path: normalize_path(&file.file_path),
            content_hash: file
                .file_hash
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty()),
            size: file.file_size,
            kind: FileKind::from_wire(file.file_type.as_deref()),
        })
        .filter(|file| !file.path.is_empty())
        .collect();

    info!(
        "Loaded manifest for {} ({} files, client dir {})",
        version_id,
        files.len(),
        client_directory
    );

    Ok(ManifestLookup::Found(VersionManifest {
        version_id,
        client_directory,
        jvm_version: data.jvm_version.as_ref().and_then(value_to_string),
        asset_index: data.asset_index.filter(|index| !index.trim().is_empty()),
        files,
    }))
}
