#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mediagrab::classifier::ClassifiedRequest;
use mediagrab::downloader::errors::{DownloadError, TranscodeError};
use mediagrab::downloader::models::{Encoding, FetchRequest, MediaItem, PageMedia};
use mediagrab::downloader::progress::ProgressSink;
use mediagrab::downloader::traits::{FileFetcher, MetadataPort, PlatformApiPort, PostResolver, TranscoderPort};
use mediagrab::downloader::WorkerPool;
use mediagrab::{Orchestrator, PipelineConfig};

/// Extraction engine that writes a small file at the expected path
#[derive(Default)]
pub struct FakeExtractor {
    pub fetches: Mutex<Vec<FetchRequest>>,
    pub encodings: Vec<Encoding>,
    pub payload_len: usize,
}

impl FakeExtractor {
    pub fn with_heights(heights: &[(u32, u32)]) -> Self {
        let encodings = heights
            .iter()
            .enumerate()
            .map(|(i, &(w, h))| Encoding {
                format_id: format!("{}", 100 + i),
                ext: "mp4".to_string(),
                width: Some(w),
                height: Some(h),
                vcodec: Some("avc1.64001F".to_string()),
                acodec: Some("none".to_string()),
                filesize: Some(1_000_000),
                filesize_approx: None,
            })
            .collect();
        Self {
            encodings,
            ..Default::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl MetadataPort for FakeExtractor {
    fn name(&self) -> &'static str {
        "fake-extractor"
    }

    async fn resolve_available_encodings(&self, _url: &str) -> Result<Vec<Encoding>, DownloadError> {
        Ok(self.encodings.clone())
    }

    async fn fetch(&self, request: &FetchRequest, _progress: ProgressSink) -> Result<PathBuf, DownloadError> {
        self.fetches.lock().unwrap().push(request.clone());
        let path = request.expected_path(if request.audio_only { "mp3" } else { "mp4" });
        std::fs::write(&path, vec![0u8; self.payload_len.max(5)]).unwrap();
        Ok(path)
    }
}

pub struct FakeFiles;

#[async_trait]
impl FileFetcher for FakeFiles {
    async fn download_file(&self, _url: &str, dest: &Path) -> Result<u64, DownloadError> {
        std::fs::write(dest, b"image").unwrap();
        Ok(5)
    }
}

/// Platform API returning a fixed carousel, named after the job stem
pub struct FakeCarousel {
    pub files: Vec<&'static str>,
}

#[async_trait]
impl PlatformApiPort for FakeCarousel {
    fn name(&self) -> &'static str {
        "fake-carousel"
    }

    async fn fetch_media(
        &self,
        _request: &ClassifiedRequest,
        dest_dir: &Path,
        file_stem: &str,
    ) -> Result<Vec<MediaItem>, DownloadError> {
        let mut items = Vec::new();
        for (i, ext) in self.files.iter().enumerate() {
            let path = dest_dir.join(format!("{}_{}.{}", file_stem, i, ext));
            std::fs::write(&path, b"media").unwrap();
            items.push(MediaItem::new(path, i));
        }
        Ok(items)
    }
}

pub struct FakePosts {
    pub media: PageMedia,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl PostResolver for FakePosts {
    async fn resolve_post(&self, request: &ClassifiedRequest) -> Result<PageMedia, DownloadError> {
        self.calls.lock().unwrap().push(request.canonical_id.clone());
        Ok(self.media.clone())
    }
}

/// Transcoder that writes placeholder outputs and records concat manifests
#[derive(Default)]
pub struct FakeTranscoder {
    pub manifests: Mutex<Vec<String>>,
}

#[async_trait]
impl TranscoderPort for FakeTranscoder {
    async fn media_dimensions(&self, _path: &Path) -> Option<(u32, u32)> {
        Some((1280, 720))
    }

    async fn media_duration(&self, _path: &Path) -> Option<f64> {
        Some(4.0)
    }

    async fn transcode_image_to_video(
        &self,
        _image: &Path,
        _duration: Duration,
        output: &Path,
    ) -> Result<PathBuf, TranscodeError> {
        std::fs::write(output, b"segment").unwrap();
        Ok(output.to_path_buf())
    }

    async fn copy_segment(&self, _input: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        std::fs::write(output, b"segment").unwrap();
        Ok(output.to_path_buf())
    }

    async fn concat_segments(&self, manifest: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
        self.manifests
            .lock()
            .unwrap()
            .push(std::fs::read_to_string(manifest).unwrap());
        std::fs::write(output, b"merged").unwrap();
        Ok(output.to_path_buf())
    }

    async fn compress(&self, _input: &Path, _target_size_mb: u64, output: &Path) -> Result<PathBuf, TranscodeError> {
        std::fs::write(output, b"small").unwrap();
        Ok(output.to_path_buf())
    }
}

pub struct Fixture {
    pub root: tempfile::TempDir,
    pub config: PipelineConfig,
    pub pool: WorkerPool,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let download = root.path().join("downloads");
        let work = root.path().join("work");
        std::fs::create_dir_all(&download).unwrap();
        std::fs::create_dir_all(&work).unwrap();
        let config = PipelineConfig::default()
            .with_download_dir(download)
            .with_work_dir(work)
            .with_retry(2, Duration::from_millis(1));
        Self {
            root,
            config,
            pool: WorkerPool::new(2),
        }
    }

    pub fn orchestrator(&self, extractor: Arc<FakeExtractor>) -> Orchestrator {
        Orchestrator::new(self.config.clone(), extractor, Arc::new(FakeFiles), self.pool.clone())
    }

    pub fn work_dir(&self) -> PathBuf {
        self.config.work_dir.clone()
    }
}
