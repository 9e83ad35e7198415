// URL classification
//
// Turns a raw link into a closed (platform, content kind) pair plus a
// canonical identifier. Matching is by host first, so short-link domains
// or path segments that merely look like another platform never win.
// No network access.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    Instagram,
    Twitter,
    Vk,
    TikTok,
    Reddit,
    Dzen,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::YouTube => "youtube",
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
            Platform::Vk => "vk",
            Platform::TikTok => "tiktok",
            Platform::Reddit => "reddit",
            Platform::Dzen => "dzen",
        }
    }

    /// Platforms whose videos come in several encodings worth offering.
    pub fn has_quality_selection(&self) -> bool {
        matches!(self, Platform::YouTube)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Video,
    Post,
    Story,
    Reel,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentKind::Video => "video",
            ContentKind::Post => "post",
            ContentKind::Story => "story",
            ContentKind::Reel => "reel",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedRequest {
    pub platform: Platform,
    pub content_kind: ContentKind,
    /// Filename-safe identifier of the item (video id, shortcode, `owner_post`)
    pub canonical_id: String,
    /// Account the item belongs to, when the URL names one
    pub owner: Option<String>,
    pub raw_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("unsupported URL: {0}")]
    Unsupported(String),

    /// Recognized platform, but the link does not say which kind of content
    #[error("ambiguous {platform} link, a direct video or post link is needed: {url}")]
    Ambiguous { platform: Platform, url: String },
}

impl ClassificationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => "This link is not supported.",
            Self::Ambiguous { .. } => {
                "Please send a direct link to a video, clip or wall post."
            }
        }
    }
}

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "youtu.be", "youtube-nocookie.com"];
const INSTAGRAM_HOSTS: &[&str] = &["instagram.com", "instagr.am"];
const TWITTER_HOSTS: &[&str] = &["x.com", "twitter.com"];
const VK_HOSTS: &[&str] = &["vk.com", "vk.ru", "vkvideo.ru"];
const TIKTOK_HOSTS: &[&str] = &["tiktok.com"];
const REDDIT_HOSTS: &[&str] = &["reddit.com", "redd.it"];
const DZEN_HOSTS: &[&str] = &["dzen.ru", "zen.yandex.ru"];

lazy_static! {
    static ref YOUTUBE_PATH_ID: Regex =
        Regex::new(r"^/(?:shorts|embed|live|v)/([A-Za-z0-9_-]+)").unwrap();
    static ref INSTAGRAM_PATH: Regex =
        Regex::new(r"^/(?:[^/]+/)?(p|reels?|tv)/([^/?#]+)").unwrap();
    static ref INSTAGRAM_STORY: Regex =
        Regex::new(r"^/stories/([^/?#]+)/(\d+)").unwrap();
    static ref TWITTER_STATUS: Regex =
        Regex::new(r"^/([^/]+)/status(?:es)?/(\d+)").unwrap();
    static ref VK_CLIP: Regex = Regex::new(r"clips?(-?\d+_\d+)").unwrap();
    static ref VK_VIDEO: Regex = Regex::new(r"video(-?\d+_\d+)").unwrap();
    static ref VK_WALL: Regex = Regex::new(r"wall(-?\d+_\d+)").unwrap();
    static ref TIKTOK_VIDEO: Regex = Regex::new(r"/video/(\d+)").unwrap();
    static ref REDDIT_COMMENTS: Regex = Regex::new(r"/comments/([A-Za-z0-9]+)").unwrap();
    static ref UNSAFE_ID_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_-]+").unwrap();
}

/// Classify a URL. Deterministic and side-effect free.
pub fn classify(raw_url: &str) -> Result<ClassifiedRequest, ClassificationError> {
    let raw = raw_url.trim();
    let url = parse_lenient(raw).ok_or_else(|| ClassificationError::Unsupported(raw.to_string()))?;
    let host = url
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| ClassificationError::Unsupported(raw.to_string()))?;

    let build = |platform, content_kind, canonical_id: String, owner: Option<String>| {
        Ok(ClassifiedRequest {
            platform,
            content_kind,
            canonical_id: sanitize_id(&canonical_id),
            owner,
            raw_url: raw.to_string(),
        })
    };

    // 1. Video hosting with a quality-selection flow
    if host_in(&host, YOUTUBE_HOSTS) {
        let id = youtube_id(&url, &host).unwrap_or_else(|| last_segment(&url));
        return build(Platform::YouTube, ContentKind::Video, id, None);
    }

    // 2. Media sharing
    if host_in(&host, INSTAGRAM_HOSTS) {
        let path = url.path();
        if let Some(caps) = INSTAGRAM_STORY.captures(path) {
            return build(
                Platform::Instagram,
                ContentKind::Story,
                caps[2].to_string(),
                Some(caps[1].to_string()),
            );
        }
        if let Some(caps) = INSTAGRAM_PATH.captures(path) {
            let kind = match &caps[1] {
                "p" => ContentKind::Post,
                "tv" => ContentKind::Video,
                _ => ContentKind::Reel,
            };
            return build(Platform::Instagram, kind, caps[2].to_string(), None);
        }
        return Err(ClassificationError::Unsupported(raw.to_string()));
    }

    // 3. Micro-blogging, only with a status marker
    if host_in(&host, TWITTER_HOSTS) {
        if let Some(caps) = TWITTER_STATUS.captures(url.path()) {
            return build(
                Platform::Twitter,
                ContentKind::Post,
                caps[2].to_string(),
                Some(caps[1].to_string()),
            );
        }
        return Err(ClassificationError::Unsupported(raw.to_string()));
    }

    // 4. Social network, disambiguated by path and query markers
    if host_in(&host, VK_HOSTS) {
        return classify_vk(&url, raw).and_then(|(kind, id, owner)| build(Platform::Vk, kind, id, owner));
    }

    // 5. Everything else, first match wins
    if host_in(&host, TIKTOK_HOSTS) {
        let id = TIKTOK_VIDEO
            .captures(url.path())
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| last_segment(&url));
        return build(Platform::TikTok, ContentKind::Video, id, None);
    }
    if host_in(&host, REDDIT_HOSTS) {
        let id = REDDIT_COMMENTS
            .captures(url.path())
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| last_segment(&url));
        return build(Platform::Reddit, ContentKind::Video, id, None);
    }
    if host_in(&host, DZEN_HOSTS) {
        return build(Platform::Dzen, ContentKind::Video, last_segment(&url), None);
    }

    Err(ClassificationError::Unsupported(raw.to_string()))
}

fn classify_vk(
    url: &Url,
    raw: &str,
) -> Result<(ContentKind, String, Option<String>), ClassificationError> {
    // Markers may live in the path or in `?z=` / `?w=` overlays
    let haystack = match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    };

    if let Some(caps) = VK_CLIP.captures(&haystack) {
        let id = caps[1].to_string();
        let owner = vk_owner(&id);
        return Ok((ContentKind::Reel, id, owner));
    }
    if let Some(caps) = VK_VIDEO.captures(&haystack) {
        let id = caps[1].to_string();
        let owner = vk_owner(&id);
        return Ok((ContentKind::Video, id, owner));
    }
    if url.path().ends_with("video_ext.php") {
        let param = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };
        if let (Some(oid), Some(id)) = (param("oid"), param("id")) {
            return Ok((ContentKind::Video, format!("{}_{}", oid, id), Some(oid)));
        }
    }
    if let Some(caps) = VK_WALL.captures(&haystack) {
        let id = caps[1].to_string();
        let owner = vk_owner(&id);
        return Ok((ContentKind::Post, id, owner));
    }

    Err(ClassificationError::Ambiguous {
        platform: Platform::Vk,
        url: raw.to_string(),
    })
}

fn vk_owner(id: &str) -> Option<String> {
    id.split('_').next().map(str::to_string)
}

fn youtube_id(url: &Url, host: &str) -> Option<String> {
    if host_in(host, &["youtu.be"]) {
        return url
            .path_segments()
            .and_then(|mut s| s.next())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }
    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        return Some(v.into_owned());
    }
    YOUTUBE_PATH_ID
        .captures(url.path())
        .map(|c| c[1].to_string())
}

/// Accepts scheme-less links such as `youtu.be/abc`.
fn parse_lenient(raw: &str) -> Option<Url> {
    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{}", raw)).ok()?
        }
        Err(_) => return None,
    };
    matches!(parsed.scheme(), "http" | "https").then_some(parsed)
}

fn host_in(host: &str, domains: &[&str]) -> bool {
    domains
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{}", d)))
}

fn last_segment(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .unwrap_or("item")
        .to_string()
}

fn sanitize_id(id: &str) -> String {
    let cleaned = UNSAFE_ID_CHARS.replace_all(id, "_");
    let trimmed: String = cleaned.trim_matches('_').chars().take(64).collect();
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed
    }
}
