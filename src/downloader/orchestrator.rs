// Orchestrator with strategy fallback logic
//
// A classified request maps to an ordered list of strategies. Each one runs
// under the retry policy; a strategy that yields no usable media hands over
// to the next. Everything a job writes into the shared download directory
// carries the job's file stem, and is purged when the job fails.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::backends::http::extension_from_url;
use super::errors::DownloadError;
use super::format_selector::{selector_for, AUDIO_SELECTOR};
use super::models::{
    Acquisition, DownloadJob, Encoding, ExtractionProfile, FetchRequest, JobState, MediaItem,
    PageMedia, Strategy, TargetQuality,
};
use super::pool::WorkerPool;
use super::progress::{spawn_reporter, ProgressCallback, ProgressSink};
use super::retry::run_with_retry;
use super::traits::{BrowserPort, FileFetcher, MetadataPort, MirrorPort, PlatformApiPort};
use super::utils::{is_nonempty_file, purge_job_files, scan_for_artifact};
use crate::classifier::{ClassifiedRequest, ContentKind, Platform};
use crate::config::PipelineConfig;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3"];

/// Strategy order for a request; pure lookup on the classified variant.
/// Wall posts are not downloaded, their attachments are resolved instead.
pub fn strategies_for(request: &ClassifiedRequest) -> Vec<Strategy> {
    match (request.platform, request.content_kind) {
        (Platform::Vk, ContentKind::Post) => Vec::new(),
        (Platform::Instagram, _) => vec![Strategy::PlatformApi, Strategy::DirectExtract],
        (Platform::Twitter, _) => vec![
            Strategy::MirrorScrape,
            Strategy::BrowserScrape,
            Strategy::DirectExtract,
        ],
        _ => vec![Strategy::DirectExtract],
    }
}

fn new_job_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Per-job inputs shared by every strategy attempt
struct JobContext<'a> {
    request: &'a ClassifiedRequest,
    target: Option<TargetQuality>,
    stem: String,
    progress: ProgressSink,
}

/// What one strategy produced; empty `items` means nothing usable
struct StrategyOutput {
    items: Vec<MediaItem>,
    caption: Option<String>,
}

impl StrategyOutput {
    fn empty(caption: Option<String>) -> Self {
        Self {
            items: Vec::new(),
            caption,
        }
    }
}

pub struct Orchestrator {
    config: PipelineConfig,
    metadata: Arc<dyn MetadataPort>,
    files: Arc<dyn FileFetcher>,
    browser: Option<Arc<dyn BrowserPort>>,
    mirror: Option<Arc<dyn MirrorPort>>,
    platform_api: Option<Arc<dyn PlatformApiPort>>,
    pool: WorkerPool,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        metadata: Arc<dyn MetadataPort>,
        files: Arc<dyn FileFetcher>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            config,
            metadata,
            files,
            browser: None,
            mirror: None,
            platform_api: None,
            pool,
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserPort>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn MirrorPort>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_platform_api(mut self, api: Arc<dyn PlatformApiPort>) -> Self {
        self.platform_api = Some(api);
        self
    }

    /// Strategies that can actually run with the ports configured
    fn available_strategies(&self, request: &ClassifiedRequest) -> Vec<Strategy> {
        strategies_for(request)
            .into_iter()
            .filter(|s| match s {
                Strategy::DirectExtract => true,
                Strategy::MirrorScrape => self.mirror.is_some(),
                Strategy::BrowserScrape => self.browser.is_some(),
                Strategy::PlatformApi => self.platform_api.is_some(),
            })
            .collect()
    }

    /// List the encodings a source exposes, under the retry policy
    pub async fn resolve_encodings(&self, url: &str) -> Result<Vec<Encoding>, DownloadError> {
        run_with_retry(&self.config.retry, self.config.timeouts.metadata(), |_| {
            self.metadata.resolve_available_encodings(url)
        })
        .await
    }

    /// Acquire the media behind `request` into the download directory.
    pub async fn acquire(
        &self,
        request: &ClassifiedRequest,
        target: Option<TargetQuality>,
        progress: Option<ProgressCallback>,
    ) -> Result<Acquisition, DownloadError> {
        let strategies = self.available_strategies(request);
        if strategies.is_empty() {
            return Err(DownloadError::Unsupported(request.raw_url.clone()));
        }

        tokio::fs::create_dir_all(&self.config.download_dir).await?;

        let (sink, reporter) = match progress {
            Some(callback) => {
                let (sink, handle) = spawn_reporter(callback, self.config.progress_interval());
                (sink, Some(handle))
            }
            None => (ProgressSink::disabled(), None),
        };

        let mut job = DownloadJob::new(new_job_id(), request.clone(), strategies[0], target);
        let ctx = JobContext {
            request,
            target,
            stem: job.file_stem(),
            progress: sink,
        };

        let result = self.run_job(&mut job, &strategies, &ctx).await;

        // Flush pending progress before handing the result back
        drop(ctx);
        if let Some(handle) = reporter {
            let _ = handle.await;
        }

        match result {
            Ok(acquisition) => {
                job.transition(JobState::Succeeded);
                tracing::info!(
                    job_id = %job.job_id,
                    platform = %request.platform,
                    strategy = %job.strategy,
                    items = acquisition.items.len(),
                    "Acquisition finished"
                );
                Ok(acquisition)
            }
            Err(e) => {
                job.transition(JobState::Failed);
                let purged = self.purge(job.file_stem()).await;
                tracing::warn!(
                    job_id = %job.job_id,
                    platform = %request.platform,
                    error = %e,
                    purged,
                    "Acquisition failed"
                );
                Err(e)
            }
        }
    }

    async fn run_job(
        &self,
        job: &mut DownloadJob,
        strategies: &[Strategy],
        ctx: &JobContext<'_>,
    ) -> Result<Acquisition, DownloadError> {
        let mut last_error: Option<DownloadError> = None;

        for &strategy in strategies {
            job.strategy = strategy;
            job.transition(JobState::Running);
            tracing::info!(
                job_id = %job.job_id,
                platform = %ctx.request.platform,
                kind = %ctx.request.content_kind,
                strategy = %strategy,
                "Trying strategy"
            );

            let attempts = AtomicU32::new(0);
            let outcome = run_with_retry(&self.config.retry, self.config.timeouts.attempt(), |attempt| {
                attempts.store(attempt + 1, Ordering::Relaxed);
                self.run_strategy(strategy, ctx)
            })
            .await;
            job.attempt_count += attempts.load(Ordering::Relaxed);

            match outcome {
                Ok(output) if !output.items.is_empty() => {
                    job.transition(JobState::Verifying);
                    let items = self.verify_items(output.items).await?;
                    return Ok(Acquisition {
                        job_id: job.job_id.clone(),
                        strategy,
                        items,
                        caption: output.caption,
                    });
                }
                Ok(_) => {
                    tracing::info!(job_id = %job.job_id, strategy = %strategy, "Strategy found no media");
                }
                // The resource itself is gone; another strategy won't find it either
                Err(e @ DownloadError::NotFound(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(job_id = %job.job_id, strategy = %strategy, error = %e, "Strategy failed");
                    last_error = Some(e);
                }
            }
            // Leftovers of a partial attempt must not leak into the next strategy
            self.purge(ctx.stem.clone()).await;
        }

        Err(last_error.unwrap_or_else(|| {
            DownloadError::NotFound(format!("no media found at {}", ctx.request.raw_url))
        }))
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        ctx: &JobContext<'_>,
    ) -> Result<StrategyOutput, DownloadError> {
        match strategy {
            Strategy::DirectExtract => {
                let path = self.direct_extract(ctx, &ctx.request.raw_url, &ctx.stem).await?;
                Ok(StrategyOutput {
                    items: vec![MediaItem::new(path, 0)],
                    caption: None,
                })
            }
            Strategy::PlatformApi => self.platform_api(ctx).await,
            Strategy::MirrorScrape => self.mirror_scrape(ctx).await,
            Strategy::BrowserScrape => self.browser_scrape(ctx).await,
        }
    }

    fn format_selector(&self, platform: Platform, target: Option<TargetQuality>) -> (String, ExtractionProfile) {
        let profile = ExtractionProfile::for_platform(platform);
        let selector = match (target, &profile.format_override) {
            (Some(TargetQuality::AudioOnly), _) => AUDIO_SELECTOR.to_string(),
            (None, Some(fixed)) => fixed.clone(),
            (target, _) => selector_for(target.as_ref(), &self.config.codec_preference),
        };
        (selector, profile)
    }

    async fn direct_extract(
        &self,
        ctx: &JobContext<'_>,
        url: &str,
        stem: &str,
    ) -> Result<PathBuf, DownloadError> {
        let (format_selector, profile) = self.format_selector(ctx.request.platform, ctx.target);
        let audio_only = ctx.target.map_or(false, |t| t.is_audio());
        let fetch = FetchRequest {
            url: url.to_string(),
            format_selector,
            output_dir: self.config.download_dir.clone(),
            file_stem: stem.to_string(),
            audio_only,
            profile,
        };

        let reported = self.metadata.fetch(&fetch, ctx.progress.clone()).await?;
        self.locate_artifact(reported, stem.to_string(), audio_only).await
    }

    /// Accept the reported path when it holds data, otherwise scan the
    /// download directory for the newest file of this job.
    async fn locate_artifact(
        &self,
        reported: PathBuf,
        stem: String,
        audio_only: bool,
    ) -> Result<PathBuf, DownloadError> {
        let dir = self.config.download_dir.clone();
        self.pool
            .run_blocking(move || {
                if audio_only {
                    let sibling = reported.with_extension("mp3");
                    if is_nonempty_file(&sibling) {
                        return Ok(sibling);
                    }
                } else if is_nonempty_file(&reported) {
                    return Ok(reported);
                }

                let extensions = if audio_only { AUDIO_EXTENSIONS } else { VIDEO_EXTENSIONS };
                match scan_for_artifact(&dir, &stem, extensions) {
                    Some(found) => {
                        tracing::info!(
                            expected = %reported.display(),
                            found = %found.display(),
                            "Artifact located by directory scan"
                        );
                        Ok(found)
                    }
                    None => Err(DownloadError::ArtifactMissingAfterDownload(reported)),
                }
            })
            .await?
    }

    async fn platform_api(&self, ctx: &JobContext<'_>) -> Result<StrategyOutput, DownloadError> {
        let api = self
            .platform_api
            .as_ref()
            .ok_or_else(|| DownloadError::Unsupported(ctx.request.raw_url.clone()))?;

        tracing::debug!(api = api.name(), id = %ctx.request.canonical_id, "Calling platform API");
        let items = api
            .fetch_media(ctx.request, &self.config.download_dir, &ctx.stem)
            .await?;
        Ok(StrategyOutput { items, caption: None })
    }

    async fn browser_scrape(&self, ctx: &JobContext<'_>) -> Result<StrategyOutput, DownloadError> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| DownloadError::Unsupported(ctx.request.raw_url.clone()))?;

        let page = browser.render_and_scrape(&ctx.request.raw_url).await?;
        tracing::debug!(
            browser = browser.name(),
            images = page.images.len(),
            videos = page.videos.len(),
            "Page scraped"
        );
        self.collect_page(ctx, page).await
    }

    async fn mirror_scrape(&self, ctx: &JobContext<'_>) -> Result<StrategyOutput, DownloadError> {
        let mirror = self
            .mirror
            .as_ref()
            .ok_or_else(|| DownloadError::Unsupported(ctx.request.raw_url.clone()))?;

        let page = mirror.scrape_post(&ctx.request.raw_url).await?;
        tracing::debug!(
            mirror = mirror.name(),
            images = page.images.len(),
            videos = page.videos.len(),
            "Post scraped from mirror"
        );
        self.collect_page(ctx, page).await
    }

    /// Download what a scraped page links to: images over HTTP, video
    /// through the extraction tool on the post URL.
    async fn collect_page(&self, ctx: &JobContext<'_>, page: PageMedia) -> Result<StrategyOutput, DownloadError> {
        if page.is_empty() {
            return Ok(StrategyOutput::empty(page.text));
        }

        let mut items = Vec::with_capacity(page.images.len() + 1);
        for (index, url) in page.images.iter().enumerate() {
            let ext = extension_from_url(url, "jpg");
            let dest = self
                .config
                .download_dir
                .join(format!("{}_{}.{}", ctx.stem, index, ext));
            self.files.download_file(url, &dest).await?;
            items.push(MediaItem::new(dest, items.len()));
        }

        // Scraped video sources are usually blob URLs; the post itself goes
        // through the extraction tool instead.
        if !page.videos.is_empty() {
            let stem = format!("{}_video", ctx.stem);
            let path = self.direct_extract(ctx, &ctx.request.raw_url, &stem).await?;
            items.push(MediaItem::new(path, items.len()));
        }

        Ok(StrategyOutput {
            items,
            caption: page.text,
        })
    }

    /// Drop items whose file vanished or is empty; fail when none remain.
    async fn verify_items(&self, items: Vec<MediaItem>) -> Result<Vec<MediaItem>, DownloadError> {
        let first = items
            .first()
            .map(|i| i.local_path.clone())
            .unwrap_or_default();
        let verified = self
            .pool
            .run_blocking(move || {
                items
                    .into_iter()
                    .filter(|item| is_nonempty_file(&item.local_path))
                    .enumerate()
                    .map(|(order_index, item)| MediaItem { order_index, ..item })
                    .collect::<Vec<_>>()
            })
            .await?;

        if verified.is_empty() {
            return Err(DownloadError::ArtifactMissingAfterDownload(first));
        }
        Ok(verified)
    }

    async fn purge(&self, stem: String) -> usize {
        let dir = self.config.download_dir.clone();
        self.pool
            .run_blocking(move || purge_job_files(&dir, &stem))
            .await
            .unwrap_or(0)
    }

    pub fn download_dir(&self) -> &Path {
        &self.config.download_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::downloader::models::PageMedia;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeExtractor {
        calls: Mutex<Vec<FetchRequest>>,
        fail_with: Option<DownloadError>,
        /// Extension actually written, simulating a tool-side rename
        written_ext: Option<&'static str>,
        report_wrong_path: bool,
    }

    #[async_trait]
    impl MetadataPort for FakeExtractor {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn resolve_available_encodings(&self, _url: &str) -> Result<Vec<Encoding>, DownloadError> {
            Ok(Vec::new())
        }

        async fn fetch(&self, request: &FetchRequest, progress: ProgressSink) -> Result<PathBuf, DownloadError> {
            self.calls.lock().unwrap().push(request.clone());
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            let ext = self.written_ext.unwrap_or(if request.audio_only { "mp3" } else { "mp4" });
            let path = request.expected_path(ext);
            std::fs::write(&path, b"media").unwrap();
            progress.emit(crate::downloader::progress::ProgressUpdate::finished(5));
            if self.report_wrong_path {
                Ok(request.expected_path("mp4"))
            } else {
                Ok(path)
            }
        }
    }

    struct NoFiles;

    #[async_trait]
    impl FileFetcher for NoFiles {
        async fn download_file(&self, _url: &str, dest: &Path) -> Result<u64, DownloadError> {
            std::fs::write(dest, b"img").unwrap();
            Ok(3)
        }
    }

    struct EmptyApi;

    #[async_trait]
    impl PlatformApiPort for EmptyApi {
        fn name(&self) -> &'static str {
            "empty"
        }

        async fn fetch_media(
            &self,
            _request: &ClassifiedRequest,
            _dest_dir: &Path,
            _file_stem: &str,
        ) -> Result<Vec<MediaItem>, DownloadError> {
            Ok(Vec::new())
        }
    }

    struct ScrapedPage(PageMedia);

    #[async_trait]
    impl BrowserPort for ScrapedPage {
        fn name(&self) -> &'static str {
            "scraped"
        }

        async fn render_and_scrape(&self, _url: &str) -> Result<PageMedia, DownloadError> {
            Ok(self.0.clone())
        }
    }

    struct FakeMirror {
        answer: Result<PageMedia, DownloadError>,
        calls: AtomicU32,
    }

    impl FakeMirror {
        fn new(answer: Result<PageMedia, DownloadError>) -> Self {
            Self {
                answer,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl MirrorPort for FakeMirror {
        fn name(&self) -> &'static str {
            "mirror"
        }

        async fn scrape_post(&self, _url: &str) -> Result<PageMedia, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig::default()
            .with_download_dir(dir)
            .with_retry(3, Duration::from_millis(10))
    }

    fn orchestrator(dir: &Path, extractor: Arc<FakeExtractor>) -> Orchestrator {
        Orchestrator::new(config(dir), extractor, Arc::new(NoFiles), WorkerPool::new(2))
    }

    #[test]
    fn test_dispatch_table() {
        let youtube = classify("https://youtu.be/abc123").unwrap();
        assert_eq!(strategies_for(&youtube), vec![Strategy::DirectExtract]);

        let reel = classify("https://www.instagram.com/reel/Cx1/").unwrap();
        assert_eq!(strategies_for(&reel), vec![Strategy::PlatformApi, Strategy::DirectExtract]);

        let wall = classify("https://vk.com/wall-123_456").unwrap();
        assert!(strategies_for(&wall).is_empty());

        let tweet = classify("https://x.com/someone/status/123").unwrap();
        assert_eq!(
            strategies_for(&tweet),
            vec![Strategy::MirrorScrape, Strategy::BrowserScrape, Strategy::DirectExtract]
        );
    }

    #[tokio::test]
    async fn test_mirror_answers_before_browser() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::default());
        let mirror = Arc::new(FakeMirror::new(Ok(PageMedia {
            text: Some("from mirror".to_string()),
            images: vec!["https://nitter.net/pic/orig/media%2FA.jpg".to_string()],
            videos: Vec::new(),
        })));
        let orch = orchestrator(dir.path(), extractor.clone())
            .with_mirror(mirror.clone())
            .with_browser(Arc::new(ScrapedPage(PageMedia::default())));
        let request = classify("https://x.com/someone/status/123").unwrap();

        let acquisition = orch.acquire(&request, None, None).await.unwrap();
        assert_eq!(acquisition.strategy, Strategy::MirrorScrape);
        assert_eq!(acquisition.caption.as_deref(), Some("from mirror"));
        assert_eq!(acquisition.items.len(), 1);
        assert_eq!(mirror.calls.load(Ordering::SeqCst), 1);
        assert!(extractor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mirror_failure_falls_back_to_browser() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::default());
        let mirror = Arc::new(FakeMirror::new(Err(DownloadError::QuotaOrRateLimited(
            "HTTP 429".to_string(),
        ))));
        let page = PageMedia {
            text: None,
            images: vec!["https://pbs.twimg.com/media/A?format=jpg&name=orig".to_string()],
            videos: Vec::new(),
        };
        let orch = orchestrator(dir.path(), extractor)
            .with_mirror(mirror.clone())
            .with_browser(Arc::new(ScrapedPage(page)));
        let request = classify("https://x.com/someone/status/123").unwrap();

        let acquisition = orch.acquire(&request, None, None).await.unwrap();
        assert_eq!(acquisition.strategy, Strategy::BrowserScrape);
        // Rate limits are not retried within a strategy
        assert_eq!(mirror.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_direct_extract_default_chain() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::default());
        let orch = orchestrator(dir.path(), extractor.clone());
        let request = classify("https://youtu.be/abc123").unwrap();

        let acquisition = orch.acquire(&request, None, None).await.unwrap();
        assert_eq!(acquisition.strategy, Strategy::DirectExtract);
        assert_eq!(acquisition.items.len(), 1);
        assert!(acquisition.items[0].local_path.exists());

        let calls = extractor.calls.lock().unwrap();
        assert_eq!(calls[0].format_selector, selector_for(None, &Default::default()));
        assert!(calls[0].file_stem.starts_with("youtube_abc123_"));
    }

    #[tokio::test]
    async fn test_audio_prefers_mp3_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor {
            report_wrong_path: true,
            ..Default::default()
        });
        let orch = orchestrator(dir.path(), extractor.clone());
        let request = classify("https://youtu.be/abc123").unwrap();

        let acquisition = orch
            .acquire(&request, Some(TargetQuality::AudioOnly), None)
            .await
            .unwrap();
        assert_eq!(acquisition.items[0].local_path.extension().unwrap(), "mp3");
        assert_eq!(extractor.calls.lock().unwrap()[0].format_selector, AUDIO_SELECTOR);
    }

    #[tokio::test]
    async fn test_renamed_artifact_found_by_scan() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor {
            written_ext: Some("webm"),
            report_wrong_path: true,
            ..Default::default()
        });
        let orch = orchestrator(dir.path(), extractor);
        let request = classify("https://youtu.be/abc123").unwrap();

        let acquisition = orch.acquire(&request, None, None).await.unwrap();
        assert_eq!(acquisition.items[0].local_path.extension().unwrap(), "webm");
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried_and_purges() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor {
            fail_with: Some(DownloadError::NotFound("private".to_string())),
            ..Default::default()
        });
        let orch = orchestrator(dir.path(), extractor.clone());
        let request = classify("https://youtu.be/abc123").unwrap();

        let err = orch.acquire(&request, None, None).await.unwrap_err();
        assert!(matches!(err, DownloadError::NotFound(_)));
        assert_eq!(extractor.calls.lock().unwrap().len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_retry_up_to_limit() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor {
            fail_with: Some(DownloadError::NetworkTimeout("read timed out".to_string())),
            ..Default::default()
        });
        let orch = orchestrator(dir.path(), extractor.clone());
        let request = classify("https://youtu.be/abc123").unwrap();

        let err = orch.acquire(&request, None, None).await.unwrap_err();
        assert!(matches!(err, DownloadError::NetworkTimeout(_)));
        assert_eq!(extractor.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_api_falls_back_to_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::default());
        let orch = orchestrator(dir.path(), extractor.clone()).with_platform_api(Arc::new(EmptyApi));
        let request = classify("https://www.instagram.com/reel/Cx1/").unwrap();

        let acquisition = orch.acquire(&request, None, None).await.unwrap();
        assert_eq!(acquisition.strategy, Strategy::DirectExtract);
        assert_eq!(extractor.calls.lock().unwrap()[0].format_selector, "bv*+ba/b");
    }

    #[tokio::test]
    async fn test_scrape_collects_images_then_video() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::default());
        let page = PageMedia {
            text: Some("caption".to_string()),
            images: vec![
                "https://pbs.twimg.com/media/A?format=jpg&name=orig".to_string(),
                "https://pbs.twimg.com/media/B?format=png&name=orig".to_string(),
            ],
            videos: vec!["blob:https://x.com/1".to_string()],
        };
        let orch = orchestrator(dir.path(), extractor.clone()).with_browser(Arc::new(ScrapedPage(page)));
        let request = classify("https://x.com/someone/status/123").unwrap();

        let acquisition = orch.acquire(&request, None, None).await.unwrap();
        assert_eq!(acquisition.strategy, Strategy::BrowserScrape);
        assert_eq!(acquisition.caption.as_deref(), Some("caption"));
        let exts: Vec<_> = acquisition
            .items
            .iter()
            .map(|i| i.local_path.extension().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(exts, vec!["jpg", "png", "mp4"]);
        assert_eq!(acquisition.items[2].order_index, 2);
        assert!(extractor.calls.lock().unwrap()[0].file_stem.ends_with("_video"));
    }

    #[tokio::test]
    async fn test_wall_post_is_unsupported_here() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::default());
        let orch = orchestrator(dir.path(), extractor.clone());
        let request = classify("https://vk.com/wall-123_456").unwrap();

        assert!(matches!(
            orch.acquire(&request, None, None).await,
            Err(DownloadError::Unsupported(_))
        ));
        assert!(extractor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_progress_reaches_callback() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |u| sink.lock().unwrap().push(u));

        let orch = orchestrator(dir.path(), Arc::new(FakeExtractor::default()));
        let request = classify("https://youtu.be/abc123").unwrap();
        orch.acquire(&request, None, Some(callback)).await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
