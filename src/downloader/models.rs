// Common data models for the acquisition pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::classifier::{ClassifiedRequest, Platform};

/// What the requester asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetQuality {
    /// Video at an exact height; width only narrows the label
    Video { width: Option<u32>, height: u32 },
    /// Best audio converted to mp3
    AudioOnly,
}

impl TargetQuality {
    pub fn height(&self) -> Option<u32> {
        match self {
            TargetQuality::Video { height, .. } => Some(*height),
            TargetQuality::AudioOnly => None,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, TargetQuality::AudioOnly)
    }
}

impl fmt::Display for TargetQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetQuality::Video {
                width: Some(w),
                height,
            } => write!(f, "{}x{}", w, height),
            TargetQuality::Video { width: None, height } => write!(f, "{}p", height),
            TargetQuality::AudioOnly => f.write_str("mp3"),
        }
    }
}

/// Parses `1280x720`, `720`, `720p`, `mp3` and `audio`.
impl FromStr for TargetQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        if value == "mp3" || value == "audio" {
            return Ok(TargetQuality::AudioOnly);
        }
        if let Some((w, h)) = value.split_once('x') {
            let width = w.parse().map_err(|_| format!("invalid width in {:?}", s))?;
            let height = h.parse().map_err(|_| format!("invalid height in {:?}", s))?;
            return Ok(TargetQuality::Video {
                width: Some(width),
                height,
            });
        }
        let height = value
            .trim_end_matches('p')
            .parse()
            .map_err(|_| format!("invalid quality {:?}", s))?;
        Ok(TargetQuality::Video {
            width: None,
            height,
        })
    }
}

/// One concrete way of acquiring media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    DirectExtract,
    MirrorScrape,
    BrowserScrape,
    PlatformApi,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::DirectExtract => "direct_extract",
            Strategy::MirrorScrape => "mirror_scrape",
            Strategy::BrowserScrape => "browser_scrape",
            Strategy::PlatformApi => "platform_api",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Verifying,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// A download owned by the orchestrator for its lifetime
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub job_id: String,
    pub request: ClassifiedRequest,
    pub strategy: Strategy,
    pub target_quality: Option<TargetQuality>,
    pub attempt_count: u32,
    pub state: JobState,
}

impl DownloadJob {
    pub fn new(
        job_id: String,
        request: ClassifiedRequest,
        strategy: Strategy,
        target_quality: Option<TargetQuality>,
    ) -> Self {
        Self {
            job_id,
            request,
            strategy,
            target_quality,
            attempt_count: 0,
            state: JobState::Pending,
        }
    }

    /// File stem shared by everything this job writes into the download dir.
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_{}",
            self.request.platform, self.request.canonical_id, self.job_id
        )
    }

    /// Terminal states are final; later transitions are ignored.
    pub fn transition(&mut self, state: JobState) {
        if self.state.is_terminal() {
            tracing::warn!(job_id = %self.job_id, state = ?self.state, to = ?state, "Ignoring transition out of terminal state");
            return;
        }
        tracing::debug!(
            job_id = %self.job_id,
            from = ?self.state,
            to = ?state,
            "Job state change"
        );
        self.state = state;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
}

impl MediaKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "webp" | "heic" | "gif" | "bmp" => MediaKind::Photo,
            "mp3" | "m4a" | "ogg" | "opus" | "aac" | "wav" | "flac" => MediaKind::Audio,
            _ => MediaKind::Video,
        }
    }
}

/// A local media file produced by a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub local_path: PathBuf,
    pub kind: MediaKind,
    pub order_index: usize,
}

impl MediaItem {
    pub fn new(local_path: PathBuf, order_index: usize) -> Self {
        let kind = MediaKind::from_path(&local_path);
        Self {
            local_path,
            kind,
            order_index,
        }
    }
}

/// One encoding reported by the extraction tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Encoding {
    /// Format ID (e.g., "137", "140")
    pub format_id: String,
    /// File extension (mp4, webm, m4a)
    pub ext: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Video codec (avc1, vp9, av01, none)
    pub vcodec: Option<String>,
    /// Audio codec (mp4a, opus, none)
    pub acodec: Option<String>,
    pub filesize: Option<u64>,
    pub filesize_approx: Option<u64>,
}

impl Encoding {
    pub fn has_video_track(&self) -> bool {
        self.vcodec
            .as_deref()
            .map_or(self.height.is_some(), |v| v != "none" && !v.is_empty())
    }

    pub fn vcodec_starts_with(&self, prefix: &str) -> bool {
        self.vcodec.as_deref().map_or(false, |v| v.starts_with(prefix))
    }

    pub fn acodec_starts_with(&self, prefix: &str) -> bool {
        self.acodec.as_deref().map_or(false, |a| a.starts_with(prefix))
    }

    pub fn effective_size(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}

/// Text and media URLs attached to a post or page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMedia {
    pub text: Option<String>,
    pub images: Vec<String>,
    pub videos: Vec<String>,
}

impl PageMedia {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.videos.is_empty()
    }
}

/// Per-platform knobs for the extraction tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionProfile {
    pub referer: Option<String>,
    /// Replaces the tiered chain for platforms that expose one progressive file
    pub format_override: Option<String>,
    pub restrict_filenames: bool,
}

impl ExtractionProfile {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Vk => Self {
                referer: Some("https://vk.com/".to_string()),
                format_override: Some(
                    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
                ),
                restrict_filenames: true,
            },
            Platform::Twitter => Self {
                referer: None,
                format_override: Some(
                    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string(),
                ),
                restrict_filenames: false,
            },
            Platform::Instagram => Self {
                referer: None,
                format_override: Some("bv*+ba/b".to_string()),
                restrict_filenames: false,
            },
            _ => Self::default(),
        }
    }
}

/// Arguments for one extraction-port fetch
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub format_selector: String,
    /// Directory the tool writes into
    pub output_dir: PathBuf,
    /// Job-scoped file stem; the tool picks the extension
    pub file_stem: String,
    pub audio_only: bool,
    pub profile: ExtractionProfile,
}

impl FetchRequest {
    /// yt-dlp style output template
    pub fn output_template(&self) -> PathBuf {
        self.output_dir.join(format!("{}.%(ext)s", self.file_stem))
    }

    /// Where the file lands when the tool keeps the deterministic name
    pub fn expected_path(&self, ext: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", self.file_stem, ext))
    }
}

/// Result of a successful acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acquisition {
    pub job_id: String,
    pub strategy: Strategy,
    /// Ordered media files; exactly one for single-item content
    pub items: Vec<MediaItem>,
    pub caption: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_quality() {
        assert_eq!(
            "1280x720".parse::<TargetQuality>().unwrap(),
            TargetQuality::Video {
                width: Some(1280),
                height: 720
            }
        );
        assert_eq!(
            "1080p".parse::<TargetQuality>().unwrap(),
            TargetQuality::Video {
                width: None,
                height: 1080
            }
        );
        assert_eq!("MP3".parse::<TargetQuality>().unwrap(), TargetQuality::AudioOnly);
        assert!("best".parse::<TargetQuality>().is_err());
        assert!("axb".parse::<TargetQuality>().is_err());
    }

    #[test]
    fn test_quality_display_round_trips_choice_strings() {
        for choice in ["854x480", "720p", "mp3"] {
            let parsed: TargetQuality = choice.parse().unwrap();
            assert_eq!(parsed.to_string(), choice);
        }
    }

    #[test]
    fn test_terminal_state_is_final() {
        let request = crate::classifier::classify("https://youtu.be/abc123").unwrap();
        let mut job = DownloadJob::new("j1".to_string(), request, Strategy::DirectExtract, None);
        assert_eq!(job.file_stem(), "youtube_abc123_j1");

        job.transition(JobState::Running);
        job.transition(JobState::Failed);
        job.transition(JobState::Succeeded);
        assert_eq!(job.state, JobState::Failed);
    }

    #[test]
    fn test_media_kind_from_extension() {
        assert_eq!(MediaKind::from_path(Path::new("a/b.JPG")), MediaKind::Photo);
        assert_eq!(MediaKind::from_path(Path::new("a/b.mp3")), MediaKind::Audio);
        assert_eq!(MediaKind::from_path(Path::new("a/b.webm")), MediaKind::Video);
        assert_eq!(MediaKind::from_path(Path::new("a/b")), MediaKind::Video);
    }

    #[test]
    fn test_encoding_video_track() {
        let audio = Encoding {
            vcodec: Some("none".to_string()),
            acodec: Some("mp4a.40.2".to_string()),
            ..Default::default()
        };
        let video = Encoding {
            vcodec: Some("avc1.64001f".to_string()),
            height: Some(720),
            ..Default::default()
        };
        assert!(!audio.has_video_track());
        assert!(video.has_video_track());
        assert!(video.vcodec_starts_with("avc1"));
        assert!(audio.acodec_starts_with("mp4a"));
    }
}
