// Plain HTTP downloads for direct media links (scraped images, API results)

use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::config::PipelineConfig;
use crate::downloader::errors::DownloadError;
use crate::downloader::traits::FileFetcher;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Client shared by the HTTP-based backends, honoring the configured proxy.
pub fn build_client(config: &PipelineConfig) -> Result<reqwest::Client, DownloadError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(config.timeouts.socket())
        .timeout(config.timeouts.attempt());

    if let Some(proxy_url) = config.proxy.as_deref().filter(|p| !p.is_empty()) {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| DownloadError::Failed(format!("invalid proxy URL {proxy_url}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| DownloadError::CapabilityUnavailable(format!("failed to build HTTP client: {e}")))
}

pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &PipelineConfig) -> Result<Self, DownloadError> {
        Ok(Self::with_client(build_client(config)?, config.max_download_bytes))
    }

    pub fn with_client(client: reqwest::Client, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }

    async fn stream_to(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        let mut response = self.client.get(url).send().await?.error_for_status()?;

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(too_large(url, len, self.max_bytes));
            }
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(too_large(url, written, self.max_bytes));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if written == 0 {
            return Err(DownloadError::ArtifactMissingAfterDownload(dest.to_path_buf()));
        }
        Ok(written)
    }
}

fn too_large(url: &str, size: u64, limit: u64) -> DownloadError {
    DownloadError::Failed(format!(
        "{url} exceeds the per-file limit ({size} > {limit} bytes)"
    ))
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn download_file(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        tracing::debug!(url, dest = %dest.display(), "HTTP download");
        let result = self.stream_to(url, dest).await;
        if result.is_err() {
            // Never leave a truncated file behind
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }
}

/// Extension for a media URL, from its path; `default` when it has none.
pub fn extension_from_url(url: &str, default: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return default.to_string();
    };

    let from_path = Path::new(parsed.path())
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| matches!(e.as_str(), "mp4" | "jpg" | "jpeg" | "png" | "webp" | "mov" | "gif"));
    let from_query = || {
        parsed
            .query_pairs()
            .find(|(k, _)| k == "format")
            .map(|(_, v)| v.to_ascii_lowercase())
    };

    from_path
        .or_else(from_query)
        .unwrap_or_else(|| default.to_string())
}
