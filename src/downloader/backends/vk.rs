// VK wall-post resolver
//
// `wall.getById` lists a post's text and attachments. Photos resolve to
// their largest size; videos resolve to watch-page links for the
// extraction tool.

use async_trait::async_trait;
use serde_json::Value;

use crate::classifier::{ClassifiedRequest, ContentKind, Platform};
use crate::config::{PipelineConfig, VkConfig};
use crate::downloader::errors::DownloadError;
use crate::downloader::models::PageMedia;
use crate::downloader::traits::PostResolver;

use super::http::build_client;

pub struct VkWallResolver {
    client: reqwest::Client,
    config: VkConfig,
}

impl VkWallResolver {
    pub fn new(config: &PipelineConfig) -> Result<Self, DownloadError> {
        Ok(Self {
            client: build_client(config)?,
            config: config.vk.clone(),
        })
    }
}

#[async_trait]
impl PostResolver for VkWallResolver {
    async fn resolve_post(&self, request: &ClassifiedRequest) -> Result<PageMedia, DownloadError> {
        if request.platform != Platform::Vk || request.content_kind != ContentKind::Post {
            return Err(DownloadError::Unsupported(request.raw_url.clone()));
        }
        let Some(token) = self.config.access_token.as_deref() else {
            return Err(DownloadError::Unsupported("VK access token not configured".to_string()));
        };

        let url = format!("{}/wall.getById", self.config.endpoint.trim_end_matches('/'));
        let body: Value = self
            .client
            .get(&url)
            .query(&[
                ("posts", request.canonical_id.as_str()),
                ("access_token", token),
                ("v", self.config.api_version.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let media = parse_wall_response(&body)?;
        tracing::info!(
            post = %request.canonical_id,
            images = media.images.len(),
            videos = media.videos.len(),
            "Resolved VK wall post"
        );
        Ok(media)
    }
}

fn api_error(error: &Value) -> DownloadError {
    let code = error["error_code"].as_i64().unwrap_or_default();
    let message = format!(
        "VK API error {}: {}",
        code,
        error["error_msg"].as_str().unwrap_or("unknown")
    );
    match code {
        // too many requests, flood control, rate limit reached
        6 | 9 | 29 => DownloadError::QuotaOrRateLimited(message),
        // access denied, deleted, private profile
        15 | 18 | 19 | 30 => DownloadError::NotFound(message),
        _ => DownloadError::Failed(message),
    }
}

/// Text plus attachment links from a `wall.getById` response. Older API
/// versions answer with a bare array, newer ones wrap it in `items`.
pub fn parse_wall_response(body: &Value) -> Result<PageMedia, DownloadError> {
    if let Some(error) = body.get("error") {
        return Err(api_error(error));
    }

    let response = &body["response"];
    let post = response["items"]
        .as_array()
        .or_else(|| response.as_array())
        .and_then(|items| items.first())
        .ok_or_else(|| DownloadError::NotFound("wall post not returned".to_string()))?;

    let mut media = PageMedia {
        text: post["text"]
            .as_str()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        ..Default::default()
    };

    for attachment in post["attachments"].as_array().into_iter().flatten() {
        match attachment["type"].as_str() {
            Some("photo") => {
                if let Some(url) = largest_photo(&attachment["photo"]) {
                    if !media.images.contains(&url) {
                        media.images.push(url);
                    }
                }
            }
            Some("video") => {
                let video = &attachment["video"];
                if let (Some(owner), Some(id)) = (video["owner_id"].as_i64(), video["id"].as_i64()) {
                    let url = format!("https://vk.com/video{owner}_{id}");
                    if !media.videos.contains(&url) {
                        media.videos.push(url);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(media)
}

fn largest_photo(photo: &Value) -> Option<String> {
    photo["sizes"]
        .as_array()?
        .iter()
        .filter_map(|size| {
            let url = size["url"].as_str()?;
            Some((size["width"].as_u64().unwrap_or(0), url))
        })
        .max_by_key(|(width, _)| *width)
        .map(|(_, url)| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attachments_in_order() {
        let body = json!({
            "response": { "items": [{
                "text": "Trip photos",
                "attachments": [
                    { "type": "photo", "photo": { "sizes": [
                        { "width": 130, "url": "https://sun.userapi.com/s.jpg" },
                        { "width": 1280, "url": "https://sun.userapi.com/x.jpg" },
                        { "width": 604, "url": "https://sun.userapi.com/m.jpg" }
                    ]}},
                    { "type": "link", "link": { "url": "https://example.com" } },
                    { "type": "video", "video": { "owner_id": -22, "id": 333 } },
                    { "type": "photo", "photo": { "sizes": [
                        { "width": 807, "url": "https://sun.userapi.com/y.jpg" }
                    ]}}
                ]
            }]}
        });

        let media = parse_wall_response(&body).unwrap();
        assert_eq!(media.text.as_deref(), Some("Trip photos"));
        assert_eq!(
            media.images,
            vec!["https://sun.userapi.com/x.jpg", "https://sun.userapi.com/y.jpg"]
        );
        assert_eq!(media.videos, vec!["https://vk.com/video-22_333"]);
    }

    #[test]
    fn test_legacy_array_response() {
        let body = json!({ "response": [{ "text": "", "attachments": [] }] });
        let media = parse_wall_response(&body).unwrap();
        assert_eq!(media.text, None);
        assert!(media.is_empty());
    }

    #[test]
    fn test_api_errors() {
        let private = json!({ "error": { "error_code": 15, "error_msg": "Access denied" } });
        assert!(matches!(parse_wall_response(&private), Err(DownloadError::NotFound(_))));

        let flood = json!({ "error": { "error_code": 9, "error_msg": "Flood control" } });
        assert!(matches!(
            parse_wall_response(&flood),
            Err(DownloadError::QuotaOrRateLimited(_))
        ));

        let empty = json!({ "response": { "items": [] } });
        assert!(matches!(parse_wall_response(&empty), Err(DownloadError::NotFound(_))));
    }
}
