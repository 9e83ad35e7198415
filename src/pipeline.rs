// Acquisition pipeline
//
// Glue between the front-end and the core: classify, optionally park the
// URL behind a quality-choice token, acquire, merge, and hand back delivery
// payloads. Wall posts skip acquisition and resolve to attachment links.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::classifier::{classify, ClassificationError, ClassifiedRequest, ContentKind, Platform};
use crate::config::{ConfigError, PipelineConfig};
use crate::downloader::backends::{
    ChromiumBackend, FfmpegBackend, HttpFetcher, InstagramApiBackend, NitterBackend, VkWallResolver,
    YtDlpBackend,
};
use crate::downloader::errors::DownloadError;
use crate::downloader::format_selector::{build_quality_options, QualityOption};
use crate::downloader::models::{MediaItem, MediaKind, PageMedia, TargetQuality};
use crate::downloader::orchestrator::Orchestrator;
use crate::downloader::pool::WorkerPool;
use crate::downloader::progress::ProgressCallback;
use crate::downloader::tools::{ToolInfo, ToolManager};
use crate::downloader::traits::{PostResolver, TranscoderPort};
use crate::merge::{MergeEngine, MergeError};
use crate::request_store::{RequestStore, RequesterId, TokenRedemptionError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Token(#[from] TokenRedemptionError),

    #[error("{} is {size} bytes, above the delivery limit of {limit} bytes", .path.display())]
    TooLargeForDelivery { path: PathBuf, size: u64, limit: u64 },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Text for the requester, distinct per failure class
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Classification(e) => e.user_message(),
            Self::Download(e) => e.user_message(),
            Self::Merge(e) => e.user_message(),
            Self::Token(e) => e.user_message(),
            Self::TooLargeForDelivery { .. } => "The file is too large to be sent.",
            Self::Config(_) => "The service is misconfigured.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// What the delivery collaborator receives for one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryPayload {
    pub artifact_path: PathBuf,
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineOutput {
    /// Local files ready for delivery, in order
    Media {
        caption: Option<String>,
        items: Vec<DeliveryPayload>,
    },
    /// A wall post: text and attachment links, nothing downloaded
    Attachments(PageMedia),
}

/// First phase of the quality-selection flow
#[derive(Debug, Clone, Serialize)]
pub struct QualityProposal {
    pub token: String,
    pub request: ClassifiedRequest,
    pub options: Vec<QualityOption>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// Merge multi-item posts into a single video
    pub merge: bool,
}

pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<RequestStore>,
    orchestrator: Orchestrator,
    merger: MergeEngine,
    transcoder: Arc<dyn TranscoderPort>,
    posts: Option<Arc<dyn PostResolver>>,
    tools: ToolManager,
    pool: WorkerPool,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        orchestrator: Orchestrator,
        transcoder: Arc<dyn TranscoderPort>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            store: Arc::new(RequestStore::new(config.request_ttl())),
            merger: MergeEngine::new(&config, transcoder.clone(), pool.clone()),
            tools: ToolManager::from_config(&config),
            config,
            orchestrator,
            transcoder,
            posts: None,
            pool,
        }
    }

    pub fn with_store(mut self, store: Arc<RequestStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_post_resolver(mut self, resolver: Arc<dyn PostResolver>) -> Self {
        self.posts = Some(resolver);
        self
    }

    /// Wire the production adapters: yt-dlp, Nitter, Chromium, ffmpeg and
    /// the platform APIs.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let pool = WorkerPool::new(config.worker_threads);
        let tools = ToolManager::from_config(&config);

        let orchestrator = Orchestrator::new(
            config.clone(),
            Arc::new(YtDlpBackend::new(&config, &tools, pool.clone())),
            Arc::new(HttpFetcher::new(&config)?),
            pool.clone(),
        )
        .with_mirror(Arc::new(NitterBackend::new(&config)?))
        .with_browser(Arc::new(ChromiumBackend::new(&config, &tools, pool.clone())))
        .with_platform_api(Arc::new(InstagramApiBackend::new(&config)?));

        let transcoder = Arc::new(FfmpegBackend::new(&config, &tools, pool.clone()));
        let posts = Arc::new(VkWallResolver::new(&config)?);

        Ok(Self::new(config, orchestrator, transcoder, pool).with_post_resolver(posts))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RequestStore> {
        &self.store
    }

    /// Background upkeep for long-running hosts: periodic token sweep.
    pub fn spawn_maintenance(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        self.store.clone().spawn_sweeper(every)
    }

    /// Remove merge scratch directories left by an earlier process.
    pub async fn sweep_stale_scratch(&self, min_age: Duration) -> usize {
        self.merger.sweep_stale(min_age).await
    }

    /// Park `url` behind a token and list the qualities to choose from.
    /// Lookup failures fall back to the default ladder.
    pub async fn propose_quality(
        &self,
        url: &str,
        requester_id: RequesterId,
    ) -> Result<QualityProposal, PipelineError> {
        let request = classify(url)?;

        let encodings = match self.orchestrator.resolve_encodings(&request.raw_url).await {
            Ok(list) => Some(list),
            Err(err) => {
                tracing::warn!(url = %request.raw_url, error = %err, "Encoding lookup failed, offering default ladder");
                None
            }
        };
        let options = build_quality_options(encodings.as_deref(), self.config.min_quality_height);
        let token = self.store.put(&request.raw_url, requester_id);

        tracing::info!(
            platform = %request.platform,
            id = %request.canonical_id,
            options = options.len(),
            "Quality choice proposed"
        );
        Ok(QualityProposal {
            token,
            request,
            options,
        })
    }

    /// Second phase: redeem the token and run the job with the choice.
    pub async fn process_token(
        &self,
        token: &str,
        requester_id: RequesterId,
        choice: &str,
        options: ProcessOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<PipelineOutput, PipelineError> {
        let url = self.store.redeem(token, requester_id)?;
        let target = choice
            .parse::<TargetQuality>()
            .map_err(|e| DownloadError::Unsupported(format!("quality choice {e}")))?;
        self.process(&url, Some(target), options, progress).await
    }

    /// Classify and acquire `url`, merging multi-item results on request.
    pub async fn process(
        &self,
        url: &str,
        target: Option<TargetQuality>,
        options: ProcessOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<PipelineOutput, PipelineError> {
        let request = classify(url)?;
        tracing::info!(
            platform = %request.platform,
            kind = %request.content_kind,
            id = %request.canonical_id,
            "Processing request"
        );

        if request.platform == Platform::Vk && request.content_kind == ContentKind::Post {
            return self.resolve_attachments(&request).await;
        }

        let acquisition = self.orchestrator.acquire(&request, target, progress).await?;
        let caption = acquisition.caption;

        let items = if options.merge && acquisition.items.len() > 1 {
            let merged = self.merger.merge(acquisition.items).await?;
            let path = self
                .merger
                .finalize_for_delivery(merged.output_path, self.config.merge_size_ceiling_bytes())
                .await;
            vec![self.deliverable(MediaItem::new(path, 0)).await?]
        } else {
            let ceiling = self.single_video_ceiling(request.platform);
            let mut payloads = Vec::with_capacity(acquisition.items.len());
            for item in acquisition.items {
                let item = if item.kind == MediaKind::Video {
                    let path = self.merger.finalize_for_delivery(item.local_path, ceiling).await;
                    MediaItem::new(path, item.order_index)
                } else {
                    item
                };
                payloads.push(self.deliverable(item).await?);
            }
            payloads
        };

        Ok(PipelineOutput::Media { caption, items })
    }

    /// Compression threshold for a downloaded video delivered as is.
    /// Instagram media is squeezed under the merge ceiling like merged
    /// output; everything else is only re-encoded above the delivery ceiling.
    fn single_video_ceiling(&self, platform: Platform) -> u64 {
        match platform {
            Platform::Instagram => self.config.merge_size_ceiling_bytes(),
            _ => self.config.delivery_size_ceiling_bytes(),
        }
    }

    async fn resolve_attachments(&self, request: &ClassifiedRequest) -> Result<PipelineOutput, PipelineError> {
        let resolver = self
            .posts
            .as_ref()
            .ok_or_else(|| DownloadError::Unsupported(request.raw_url.clone()))?;
        let media = resolver.resolve_post(request).await?;
        if media.is_empty() && media.text.is_none() {
            return Err(DownloadError::NotFound(format!("empty wall post {}", request.canonical_id)).into());
        }
        Ok(PipelineOutput::Attachments(media))
    }

    /// Build the payload for one artifact, rejecting it (and deleting the
    /// file) when it exceeds the delivery ceiling.
    pub async fn deliverable(&self, item: MediaItem) -> Result<DeliveryPayload, PipelineError> {
        let size = tokio::fs::metadata(&item.local_path)
            .await
            .map_err(|_| DownloadError::ArtifactMissingAfterDownload(item.local_path.clone()))?
            .len();

        let limit = self.config.delivery_size_ceiling_bytes();
        if size > limit {
            if let Err(err) = tokio::fs::remove_file(&item.local_path).await {
                tracing::warn!(path = %item.local_path.display(), error = %err, "Failed to remove rejected artifact");
            }
            return Err(PipelineError::TooLargeForDelivery {
                path: item.local_path,
                size,
                limit,
            });
        }

        let dimensions = match item.kind {
            MediaKind::Audio => None,
            MediaKind::Photo | MediaKind::Video => self
                .transcoder
                .media_dimensions(&item.local_path)
                .await
                .map(|(width, height)| Dimensions { width, height }),
        };

        Ok(DeliveryPayload {
            artifact_path: item.local_path,
            kind: item.kind,
            dimensions,
            size_bytes: size,
        })
    }

    /// Availability and versions of the external tools
    pub async fn tool_status(&self) -> Vec<ToolInfo> {
        let tools = self.tools.clone();
        self.pool
            .run_blocking(move || tools.get_all_tools())
            .await
            .unwrap_or_default()
    }
}
