// Media merge engine
//
// Normalizes an ordered list of photos and clips into uniform segments in a
// scoped scratch directory, then concatenates them by manifest without
// re-encoding. The scratch directory and the consumed inputs are removed on
// every exit path; only the merged output survives the call.

pub mod manifest;

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::downloader::errors::TranscodeError;
use crate::downloader::models::{MediaItem, MediaKind};
use crate::downloader::pool::WorkerPool;
use crate::downloader::traits::TranscoderPort;
use crate::downloader::utils::is_nonempty_file;

pub use manifest::ConcatManifest;

const SCRATCH_PREFIX: &str = "merge-";
const MANIFEST_NAME: &str = "concat_list.txt";

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("nothing to merge")]
    NoInputs,

    #[error("none of the {attempted} items could be turned into a segment")]
    NoSegments { attempted: usize },

    #[error("concatenation failed: {0}")]
    Concat(#[source] TranscodeError),

    #[error("merged output missing or empty: {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error("merge I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergeError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoInputs | Self::NoSegments { .. } => "None of the media items could be combined.",
            Self::Concat(_) | Self::EmptyOutput(_) => "Combining the media items into one video failed.",
            Self::Io(_) => "A storage error interrupted merging.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub output_path: PathBuf,
    pub segment_count: usize,
    pub total_duration: Duration,
}

/// Owns the input files for the duration of a merge and deletes them when
/// dropped, whatever the outcome.
struct ConsumedInputs {
    items: Vec<MediaItem>,
}

impl Drop for ConsumedInputs {
    fn drop(&mut self) {
        for item in &self.items {
            if let Err(err) = std::fs::remove_file(&item.local_path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %item.local_path.display(), error = %err, "Failed to remove merge input");
                }
            }
        }
    }
}

pub struct MergeEngine {
    transcoder: Arc<dyn TranscoderPort>,
    work_dir: PathBuf,
    output_dir: PathBuf,
    photo_duration: Duration,
    compress_target_mb: u64,
    pool: WorkerPool,
}

impl MergeEngine {
    pub fn new(config: &PipelineConfig, transcoder: Arc<dyn TranscoderPort>, pool: WorkerPool) -> Self {
        Self {
            transcoder,
            work_dir: config.work_dir.clone(),
            output_dir: config.download_dir.clone(),
            photo_duration: config.photo_segment_duration(),
            compress_target_mb: config.compress_target_mb,
            pool,
        }
    }

    /// Merge `items` (ordered by `order_index`) into one video. Items that
    /// cannot be segmented are skipped; the merge fails only when none can.
    pub async fn merge(&self, items: Vec<MediaItem>) -> Result<MergeResult, MergeError> {
        let mut inputs = ConsumedInputs { items };
        if inputs.items.is_empty() {
            return Err(MergeError::NoInputs);
        }
        inputs.items.sort_by_key(|item| item.order_index);

        tokio::fs::create_dir_all(&self.work_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let work_dir = tokio::fs::canonicalize(&self.work_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&work_dir)?;

        tracing::info!(
            items = inputs.items.len(),
            scratch = %scratch.path().display(),
            "Merging media items"
        );

        let mut manifest = ConcatManifest::new();
        let mut total_duration = Duration::ZERO;

        for item in &inputs.items {
            let segment = scratch
                .path()
                .join(format!("segment_{:03}.mp4", manifest.len()));
            match self.make_segment(item, &segment).await {
                Ok(duration) => {
                    manifest.push(segment);
                    total_duration += duration;
                }
                Err(err) => {
                    tracing::warn!(
                        index = item.order_index,
                        path = %item.local_path.display(),
                        error = %err,
                        "Skipping item that could not be segmented"
                    );
                }
            }
        }

        if manifest.is_empty() {
            return Err(MergeError::NoSegments {
                attempted: inputs.items.len(),
            });
        }

        let manifest_path = scratch.path().join(MANIFEST_NAME);
        manifest.write_to(&manifest_path).await?;

        let output = self.output_dir.join(format!("merged_{}.mp4", random_suffix()));
        let merged = match self.transcoder.concat_segments(&manifest_path, &output).await {
            Ok(path) => path,
            Err(err) => {
                let _ = tokio::fs::remove_file(&output).await;
                return Err(MergeError::Concat(err));
            }
        };

        if !is_nonempty_file(&merged) {
            let _ = tokio::fs::remove_file(&merged).await;
            return Err(MergeError::EmptyOutput(merged));
        }

        tracing::info!(
            output = %merged.display(),
            segments = manifest.len(),
            skipped = inputs.items.len() - manifest.len(),
            duration_secs = total_duration.as_secs_f64(),
            "Merge finished"
        );

        Ok(MergeResult {
            output_path: merged,
            segment_count: manifest.len(),
            total_duration,
        })
    }

    async fn make_segment(&self, item: &MediaItem, segment: &Path) -> Result<Duration, TranscodeError> {
        match item.kind {
            MediaKind::Photo => {
                self.transcoder
                    .transcode_image_to_video(&item.local_path, self.photo_duration, segment)
                    .await?;
                Ok(self.photo_duration)
            }
            MediaKind::Video => {
                self.transcoder.copy_segment(&item.local_path, segment).await?;
                let secs = self.transcoder.media_duration(segment).await.unwrap_or(0.0);
                Ok(Duration::from_secs_f64(secs.max(0.0)))
            }
            MediaKind::Audio => Err(TranscodeError::Failed {
                tool: "merge".to_string(),
                status: "skipped".to_string(),
                stderr: "audio items have no video track".to_string(),
            }),
        }
    }

    /// Re-encode a video above `ceiling_bytes` so it lands near the
    /// compress target. Returns the path to deliver; the original is kept
    /// when compression fails.
    pub async fn finalize_for_delivery(&self, path: PathBuf, ceiling_bytes: u64) -> PathBuf {
        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(_) => return path,
        };
        if size <= ceiling_bytes {
            return path;
        }

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let compressed = path.with_file_name(format!("{}_compressed.mp4", stem));

        tracing::info!(
            path = %path.display(),
            size,
            ceiling = ceiling_bytes,
            "Artifact above size ceiling, compressing"
        );
        match self
            .transcoder
            .compress(&path, self.compress_target_mb, &compressed)
            .await
        {
            Ok(out) => {
                if let Err(err) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), error = %err, "Failed to remove uncompressed artifact");
                }
                out
            }
            Err(err) => {
                tracing::warn!(error = %err, "Compression failed, keeping original");
                let _ = tokio::fs::remove_file(&compressed).await;
                path
            }
        }
    }

    /// Remove `merge-*` scratch directories older than `min_age`, left over
    /// by a process that died mid-merge.
    pub async fn sweep_stale(&self, min_age: Duration) -> usize {
        let work_dir = self.work_dir.clone();
        let removed = self
            .pool
            .run_blocking(move || sweep_scratch_dirs(&work_dir, min_age))
            .await
            .unwrap_or(0);
        if removed > 0 {
            tracing::info!(removed, "Removed stale merge directories");
        }
        removed
    }
}

fn sweep_scratch_dirs(work_dir: &Path, min_age: Duration) -> usize {
    let Ok(entries) = std::fs::read_dir(work_dir) else {
        return 0;
    };
    let now = SystemTime::now();
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(SCRATCH_PREFIX))
        .filter(|e| {
            e.metadata()
                .ok()
                .filter(|m| m.is_dir())
                .and_then(|m| m.modified().ok())
                .map(|modified| now.duration_since(modified).unwrap_or(Duration::ZERO))
                .map_or(false, |age| age >= min_age)
        })
        .filter(|e| std::fs::remove_dir_all(e.path()).is_ok())
        .count()
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}
