// Instagram download API backend - platform API port
//
// The API answers with direct CDN links; files are fetched over HTTP
// into the job's download directory.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

use crate::classifier::{ClassifiedRequest, ContentKind};
use crate::config::PipelineConfig;
use crate::downloader::errors::DownloadError;
use crate::downloader::models::MediaItem;
use crate::downloader::traits::{FileFetcher, PlatformApiPort};

use super::http::{build_client, extension_from_url, HttpFetcher};

const API_KEY_HEADER: &str = "x-avatar-key";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<ApiMedia>,
}

#[derive(Debug, Deserialize)]
struct ApiMedia {
    url: Option<String>,
}

pub struct InstagramApiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    fetcher: HttpFetcher,
}

impl InstagramApiBackend {
    pub fn new(config: &PipelineConfig) -> Result<Self, DownloadError> {
        let client = build_client(config)?;
        Ok(Self {
            fetcher: HttpFetcher::with_client(client.clone(), config.max_download_bytes),
            client,
            endpoint: config.instagram_api.endpoint.clone(),
            api_key: config.instagram_api.api_key.clone(),
        })
    }

    async fn request_links(&self, api_key: &str, request: &ClassifiedRequest) -> Result<Vec<String>, DownloadError> {
        let response: ApiResponse = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, api_key)
            .json(&build_payload(request))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(media_links(response))
    }
}

fn build_payload(request: &ClassifiedRequest) -> serde_json::Value {
    match (request.content_kind, request.owner.as_deref()) {
        (ContentKind::Story, Some(owner)) => json!({
            "type": "insta_story",
            "user_id": owner,
            "video_url": request.raw_url,
        }),
        _ => json!({
            "type": "instagram",
            "video_url": request.raw_url,
        }),
    }
}

fn media_links(response: ApiResponse) -> Vec<String> {
    if !response.success {
        return Vec::new();
    }
    let mut links: Vec<String> = Vec::new();
    for url in response.data.into_iter().filter_map(|m| m.url) {
        if !url.is_empty() && !links.contains(&url) {
            links.push(url);
        }
    }
    links
}

#[async_trait]
impl PlatformApiPort for InstagramApiBackend {
    fn name(&self) -> &'static str {
        "instagram-api"
    }

    async fn fetch_media(
        &self,
        request: &ClassifiedRequest,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<Vec<MediaItem>, DownloadError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(DownloadError::Unsupported(
                "instagram API key not configured".to_string(),
            ));
        };

        let links = self.request_links(api_key, request).await?;
        tracing::info!(
            id = %request.canonical_id,
            kind = ?request.content_kind,
            count = links.len(),
            "Instagram API returned media"
        );

        let mut items = Vec::with_capacity(links.len());
        for (index, link) in links.iter().enumerate() {
            let ext = extension_from_url(link, "mp4");
            let dest = dest_dir.join(format!("{file_stem}_{index}.{ext}"));
            self.fetcher.download_file(link, &dest).await?;
            items.push(MediaItem::new(dest, index));
        }
        Ok(items)
    }
}
