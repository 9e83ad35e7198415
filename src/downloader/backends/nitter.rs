// Nitter backend - X/Twitter posts through a plain-HTML front-end
//
// Cheaper than a browser and not behind a login wall. Media links on the
// page are relative to the instance and are made absolute here.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::StatusCode;

use crate::config::PipelineConfig;
use crate::downloader::errors::DownloadError;
use crate::downloader::models::PageMedia;
use crate::downloader::traits::MirrorPort;

use super::http::build_client;

/// Nitter galleries hold at most four images
const MAX_IMAGES: usize = 4;

lazy_static! {
    static ref TWEET_CONTENT: Regex =
        Regex::new(r#"(?s)<div class="tweet-content[^"]*"[^>]*>(.*?)</div>"#).unwrap();
    static ref STILL_IMAGE: Regex = Regex::new(r#"<a class="still-image" href="([^"]+)""#).unwrap();
    static ref VIDEO_MARKER: Regex =
        Regex::new(r#"class="attachment video-container|class="gallery-video|<video"#).unwrap();
    static ref LINE_BREAK: Regex = Regex::new(r"(?i)<br\s*/?>").unwrap();
    static ref TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
}

pub struct NitterBackend {
    client: reqwest::Client,
    base_url: String,
}

impl NitterBackend {
    pub fn new(config: &PipelineConfig) -> Result<Self, DownloadError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.nitter_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_page(&self, mirror_url: &str) -> Result<String, DownloadError> {
        let response = self.client.get(mirror_url).send().await?;
        // A mirror miss says nothing about the post itself, so nothing here
        // maps to NotFound; the next strategy gets its turn.
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                Err(DownloadError::QuotaOrRateLimited(format!("{mirror_url}: HTTP 429")))
            }
            status if !status.is_success() => {
                Err(DownloadError::Failed(format!("{mirror_url}: HTTP {status}")))
            }
            _ => Ok(response.text().await?),
        }
    }
}

/// Same post path on the mirror host; query and fragment are dropped.
fn mirror_url(base_url: &str, post_url: &str) -> Result<String, DownloadError> {
    let parsed = url::Url::parse(post_url)
        .map_err(|e| DownloadError::Unsupported(format!("{post_url}: {e}")))?;
    Ok(format!("{}{}", base_url, parsed.path()))
}

fn parse_post_page(html: &str, base_url: &str, post_url: &str) -> PageMedia {
    let text = TWEET_CONTENT
        .captures(html)
        .map(|caps| strip_markup(&caps[1]))
        .filter(|t| !t.is_empty());

    let mut images: Vec<String> = Vec::new();
    for caps in STILL_IMAGE.captures_iter(html) {
        let link = absolute(base_url, &caps[1]);
        if !images.contains(&link) {
            images.push(link);
        }
    }
    images.truncate(MAX_IMAGES);

    // Mirror video sources are proxied HLS streams; the extractor handles
    // the original post URL better.
    let videos = if VIDEO_MARKER.is_match(html) {
        vec![post_url.to_string()]
    } else {
        Vec::new()
    };

    PageMedia { text, images, videos }
}

fn absolute(base_url: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else {
        format!("{}/{}", base_url, link.trim_start_matches('/'))
    }
}

fn strip_markup(fragment: &str) -> String {
    let text = LINE_BREAK.replace_all(fragment, "\n");
    let text = TAG.replace_all(&text, "");
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .trim()
        .to_string()
}

#[async_trait]
impl MirrorPort for NitterBackend {
    fn name(&self) -> &'static str {
        "nitter"
    }

    async fn scrape_post(&self, url: &str) -> Result<PageMedia, DownloadError> {
        let target = mirror_url(&self.base_url, url)?;
        let html = self.fetch_page(&target).await?;
        if html.contains("Tweet not found") {
            tracing::info!(mirror = %self.base_url, "Mirror does not have the post");
            return Ok(PageMedia::default());
        }

        let page = parse_post_page(&html, &self.base_url, url);
        tracing::info!(
            mirror = %self.base_url,
            images = page.images.len(),
            videos = page.videos.len(),
            has_text = page.text.is_some(),
            "Mirror page parsed"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://nitter.net";
    const POST: &str = "https://x.com/someone/status/123?s=20";

    #[test]
    fn test_mirror_url_keeps_path_only() {
        assert_eq!(
            mirror_url(BASE, POST).unwrap(),
            "https://nitter.net/someone/status/123"
        );
        assert!(mirror_url(BASE, "not a url").is_err());
    }

    #[test]
    fn test_parse_text_and_gallery() {
        let html = r#"
            <div class="tweet-content media-body" dir="auto">Line one<br>Tom &amp; Jerry <a href="/hashtag/x">#x</a></div>
            <div class="attachments"><div class="gallery-row">
              <div class="attachment image"><a class="still-image" href="/pic/orig/media%2FA.jpg" target="_blank"><img src="/pic/media%2FA.jpg%3Fname%3Dsmall"></a></div>
              <div class="attachment image"><a class="still-image" href="/pic/orig/media%2FA.jpg" target="_blank"></a></div>
              <div class="attachment image"><a class="still-image" href="/pic/orig/media%2FB.png" target="_blank"></a></div>
            </div></div>"#;

        let page = parse_post_page(html, BASE, POST);
        assert_eq!(page.text.as_deref(), Some("Line one\nTom & Jerry #x"));
        assert_eq!(
            page.images,
            vec![
                "https://nitter.net/pic/orig/media%2FA.jpg".to_string(),
                "https://nitter.net/pic/orig/media%2FB.png".to_string(),
            ]
        );
        assert!(page.videos.is_empty());
    }

    #[test]
    fn test_video_points_back_to_post() {
        let html = r#"<div class="tweet-content">clip</div>
            <div class="attachments card"><div class="gallery-video"><div class="attachment video-container">
            <video poster="/pic/thumb.jpg" data-url="/video/abc"></video></div></div></div>"#;
        let page = parse_post_page(html, BASE, POST);
        assert_eq!(page.videos, vec![POST.to_string()]);
        assert!(page.images.is_empty());
    }

    #[test]
    fn test_empty_page_has_no_media() {
        let page = parse_post_page("<html><body>nothing</body></html>", BASE, POST);
        assert!(page.is_empty());
        assert!(page.text.is_none());
    }
}
