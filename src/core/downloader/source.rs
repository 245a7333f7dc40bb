use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::Client;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::with_bearer;

/// An open remote body, consumed chunk by chunk.
pub struct RemoteFile {
    pub total_bytes: Option<u64>,
    pub body: BoxStream<'static, LauncherResult<Vec<u8>>>,
}

/// Where file bytes come from. The HTTP backend in production, an in-memory
/// map in tests.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn open(&self, url: &str) -> LauncherResult<RemoteFile>;
}

pub struct HttpFileSource {
    client: Client,
    access_token: Option<String>,
}

impl HttpFileSource {
    pub fn new(client: Client, access_token: Option<String>) -> Self {
        Self {
            client,
            access_token,
        }
    }
}

#[async_trait]
impl FileSource for HttpFileSource {
    async fn open(&self, url: &str) -> LauncherResult<RemoteFile> {
        let response = with_bearer(self.client.get(url), self.access_token.as_deref())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LauncherError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(LauncherError::from))
            .boxed();

        Ok(RemoteFile { total_bytes, body })
    }
}
