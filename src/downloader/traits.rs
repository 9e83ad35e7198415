// Capability ports
//
// The pipeline drives external tools only through these traits. Adapters
// live in `backends/`; tests substitute fakes.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::{DownloadError, TranscodeError};
use super::models::{Encoding, FetchRequest, MediaItem, PageMedia};
use super::progress::ProgressSink;
use crate::classifier::ClassifiedRequest;

/// Metadata/extraction engine (yt-dlp)
#[async_trait]
pub trait MetadataPort: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// List the encodings the source exposes
    async fn resolve_available_encodings(&self, url: &str) -> Result<Vec<Encoding>, DownloadError>;

    /// Download one media file. The returned path is what the tool reported;
    /// the orchestrator still verifies it.
    async fn fetch(&self, request: &FetchRequest, progress: ProgressSink) -> Result<PathBuf, DownloadError>;
}

/// Headless browser that renders a page and scrapes attached media
#[async_trait]
pub trait BrowserPort: Send + Sync {
    fn name(&self) -> &'static str;

    /// Each call owns its browser instance and tears it down before returning.
    async fn render_and_scrape(&self, url: &str) -> Result<PageMedia, DownloadError>;
}

/// Plain-HTTP front-end that mirrors a platform's posts
#[async_trait]
pub trait MirrorPort: Send + Sync {
    fn name(&self) -> &'static str;

    /// Text and media links of the post at `url`, fetched without a browser
    async fn scrape_post(&self, url: &str) -> Result<PageMedia, DownloadError>;
}

/// First-party download API of a platform
#[async_trait]
pub trait PlatformApiPort: Send + Sync {
    fn name(&self) -> &'static str;

    /// Download the request's media into `dest_dir`, naming files after
    /// `file_stem`. An empty list means the API had nothing usable.
    async fn fetch_media(
        &self,
        request: &ClassifiedRequest,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<Vec<MediaItem>, DownloadError>;
}

/// Resolves a wall post into its text and attachment links, without
/// downloading anything
#[async_trait]
pub trait PostResolver: Send + Sync {
    async fn resolve_post(&self, request: &ClassifiedRequest) -> Result<PageMedia, DownloadError>;
}

/// Plain HTTP file download
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Stream `url` into `dest`, returning the number of bytes written.
    async fn download_file(&self, url: &str, dest: &Path) -> Result<u64, DownloadError>;
}

/// Transcoding engine (ffmpeg/ffprobe)
#[async_trait]
pub trait TranscoderPort: Send + Sync {
    async fn media_dimensions(&self, path: &Path) -> Option<(u32, u32)>;

    async fn media_duration(&self, path: &Path) -> Option<f64>;

    /// Still image to a fixed-duration H.264 segment with even dimensions
    async fn transcode_image_to_video(
        &self,
        image: &Path,
        duration: Duration,
        output: &Path,
    ) -> Result<PathBuf, TranscodeError>;

    /// Stream-copy a video into a segment file
    async fn copy_segment(&self, input: &Path, output: &Path) -> Result<PathBuf, TranscodeError>;

    /// Concatenate the segments listed in a concat manifest, no re-encode
    async fn concat_segments(&self, manifest: &Path, output: &Path) -> Result<PathBuf, TranscodeError>;

    /// Re-encode so the result lands near `target_size_mb`
    async fn compress(
        &self,
        input: &Path,
        target_size_mb: u64,
        output: &Path,
    ) -> Result<PathBuf, TranscodeError>;
}
